use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "carto",
    about = "Carto workspace inspector",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Root of the on-disk workspace
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Workspace configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List stored projects
    List(ListArgs),
    /// Show layer, feature and layout counts of a project
    Show(ProjectArgs),
    /// Print the manifest of a project as JSON
    Export(ExportArgs),
    /// Store a project document read from a JSON file
    Import(ImportArgs),
    /// Delete a project database
    Drop(ProjectArgs),
}

#[derive(Args)]
pub struct ListArgs {}

#[derive(Args)]
pub struct ProjectArgs {
    pub project: String,
}

#[derive(Args)]
pub struct ExportArgs {
    pub project: String,
    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ImportArgs {
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list() {
        let cli = Cli::try_parse_from(["carto", "--data-dir", "/tmp/w", "list"]).unwrap();
        assert!(matches!(cli.command, Command::List(_)));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/w")));
    }

    #[test]
    fn parse_show() {
        let cli = Cli::try_parse_from(["carto", "show", "p1"]).unwrap();
        if let Command::Show(args) = cli.command {
            assert_eq!(args.project, "p1");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_export_to_file() {
        let cli = Cli::try_parse_from(["carto", "export", "p1", "-o", "out.json"]).unwrap();
        if let Command::Export(args) = cli.command {
            assert_eq!(args.output, Some(PathBuf::from("out.json")));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_import() {
        let cli = Cli::try_parse_from(["carto", "import", "doc.json"]).unwrap();
        if let Command::Import(args) = cli.command {
            assert_eq!(args.file, PathBuf::from("doc.json"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_drop_requires_project() {
        assert!(Cli::try_parse_from(["carto", "drop"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["carto", "list", "--verbose", "--config", "c.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["carto", "--format", "json", "list"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
