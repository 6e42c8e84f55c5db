use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;

use carto_types::{ProjectDocument, ProjectId};
use carto_workspace::{Workspace, WorkspaceConfig};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let workspace = open_workspace(&cli)?;
    match cli.command {
        Command::List(_) => cmd_list(&workspace, &cli.format).await,
        Command::Show(args) => cmd_show(&workspace, args, &cli.format).await,
        Command::Export(args) => cmd_export(&workspace, args).await,
        Command::Import(args) => cmd_import(&workspace, args).await,
        Command::Drop(args) => cmd_drop(&workspace, args).await,
    }
}

fn open_workspace(cli: &Cli) -> anyhow::Result<Workspace> {
    let mut config = match &cli.config {
        Some(path) => WorkspaceConfig::load(path)?,
        None => WorkspaceConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if config.data_dir.is_none() {
        bail!("no data directory: pass --data-dir or set data_dir in the config");
    }
    Ok(Workspace::new(config)?)
}

fn parse_project(raw: &str) -> anyhow::Result<ProjectId> {
    ProjectId::parse(raw).with_context(|| format!("invalid project id {raw:?}"))
}

async fn manifest(workspace: &Workspace, raw: &str) -> anyhow::Result<ProjectDocument> {
    let id = parse_project(raw)?;
    match workspace.load_manifest(&id).await? {
        Some(document) => Ok(document),
        None => bail!("project {} not found", id),
    }
}

async fn cmd_list(workspace: &Workspace, format: &OutputFormat) -> anyhow::Result<()> {
    let ids = workspace.list_projects().await?;
    match format {
        OutputFormat::Json => {
            let ids: Vec<&str> = ids.iter().map(ProjectId::as_str).collect();
            println!("{}", serde_json::to_string_pretty(&ids)?);
        }
        OutputFormat::Text if ids.is_empty() => println!("No projects."),
        OutputFormat::Text => {
            for id in &ids {
                println!("{}", id.as_str().yellow());
            }
        }
    }
    Ok(())
}

async fn cmd_show(
    workspace: &Workspace,
    args: ProjectArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let document = manifest(workspace, &args.project).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary(&document))?),
        OutputFormat::Text => {
            let meta = &document.metadata;
            println!("{} {}", meta.name.bold(), format!("({})", meta.id).dimmed());
            println!("  Version: {}", meta.version.cyan());
            println!("  Public: {}", meta.public);
            println!("  Layers: {}", document.layers.len());
            for layer in &document.layers {
                let features = if layer.layer.is_vector() {
                    format!("{} features", layer.features.len())
                } else {
                    "-".to_string()
                };
                println!(
                    "    {} {} {}",
                    layer.layer.name.yellow(),
                    layer.layer.kind.to_string().cyan(),
                    features.dimmed()
                );
            }
            println!("  Features: {}", document.feature_count());
            println!("  Layouts: {}", document.layouts.len());
            println!("  Shared views: {}", document.shared_views.len());
        }
    }
    Ok(())
}

fn summary(document: &ProjectDocument) -> serde_json::Value {
    let layers: Vec<_> = document
        .layers
        .iter()
        .map(|l| {
            json!({
                "id": l.layer.id,
                "name": l.layer.name,
                "kind": l.layer.kind.to_string(),
                "features": l.features.len(),
            })
        })
        .collect();
    json!({
        "id": document.metadata.id,
        "name": document.metadata.name,
        "version": document.metadata.version,
        "layers": layers,
        "features": document.feature_count(),
        "layouts": document.layouts.len(),
        "shared_views": document.shared_views.len(),
    })
}

async fn cmd_export(workspace: &Workspace, args: ExportArgs) -> anyhow::Result<()> {
    let document = manifest(workspace, &args.project).await?;
    let raw = serde_json::to_string_pretty(&document)?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, raw)
                .with_context(|| format!("could not write {}", path.display()))?;
            println!("{} Exported {} to {}", "✓".green().bold(), document.metadata.id, path.display());
        }
        None => println!("{raw}"),
    }
    Ok(())
}

async fn cmd_import(workspace: &Workspace, args: ImportArgs) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("could not read {}", args.file.display()))?;
    let document: ProjectDocument = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a project document", args.file.display()))?;
    workspace.import_project(&document).await?;
    println!(
        "{} Imported {} ({} layers, {} features)",
        "✓".green().bold(),
        document.metadata.id.as_str().yellow(),
        document.layers.len(),
        document.feature_count()
    );
    Ok(())
}

async fn cmd_drop(workspace: &Workspace, args: ProjectArgs) -> anyhow::Result<()> {
    let id = parse_project(&args.project)?;
    if workspace.delete_project(&id).await? {
        println!("{} Dropped {}", "✓".green().bold(), id.as_str().yellow());
    } else {
        println!("Project {} does not exist.", id.as_str().yellow());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use carto_types::{Feature, Layer, LayerDocument};
    use clap::Parser;

    fn cli(dir: &std::path::Path, args: &[&str]) -> Cli {
        let root = dir.to_str().unwrap();
        let mut argv = vec!["carto", "--data-dir", root];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn document() -> ProjectDocument {
        let mut doc = ProjectDocument::new("Field survey");
        doc.metadata.id = ProjectId::parse("survey").unwrap();
        let point = Feature::new(json!({"type": "Point", "coordinates": [1.0, 2.0]}));
        doc.layers
            .push(LayerDocument::with_features(Layer::vector("Sites"), vec![point]));
        doc
    }

    #[test]
    fn a_data_directory_is_required() {
        let cli = Cli::try_parse_from(["carto", "list"]).unwrap();
        let err = open_workspace(&cli).unwrap_err();
        assert!(err.to_string().contains("no data directory"));
    }

    #[test]
    fn summary_counts_features_per_layer() {
        let value = summary(&document());
        assert_eq!(value["features"], 1);
        assert_eq!(value["layers"][0]["kind"], "Vector");
        assert_eq!(value["layers"][0]["features"], 1);
    }

    #[tokio::test]
    async fn import_then_export_and_drop() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("survey.json");
        std::fs::write(&file, serde_json::to_string(&document()).unwrap()).unwrap();
        let data = dir.path().join("data");

        let import = cli(&data, &["import", file.to_str().unwrap()]);
        run_command(import).await.unwrap();

        let ws = open_workspace(&cli(&data, &["list"])).unwrap();
        let stored = manifest(&ws, "survey").await.unwrap();
        assert_eq!(stored.layers[0].features.len(), 1);

        let out = dir.path().join("out.json");
        let export = cli(&data, &["export", "survey", "-o", out.to_str().unwrap()]);
        run_command(export).await.unwrap();
        let exported: ProjectDocument =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(exported.metadata.name, "Field survey");

        run_command(cli(&data, &["drop", "survey"])).await.unwrap();
        assert!(manifest(&ws, "survey").await.is_err());
    }
}
