use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Declares a string-backed identifier newtype.
///
/// Identifiers are opaque to storage: they are used verbatim as primary keys
/// and foreign keys. Fresh identifiers are UUID v7 strings so that ids minted
/// on the same device sort by creation time.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh time-ordered identifier (UUID v7).
            pub fn generate() -> Self {
                Self(uuid::Uuid::now_v7().to_string())
            }

            /// Wrap an existing identifier, rejecting empty strings.
            pub fn parse(raw: impl Into<String>) -> Result<Self, TypeError> {
                let raw = raw.into();
                if raw.is_empty() {
                    return Err(TypeError::EmptyId);
                }
                if raw.chars().any(char::is_control) {
                    return Err(TypeError::InvalidId {
                        id: raw,
                        reason: "contains control characters".into(),
                    });
                }
                Ok(Self(raw))
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Short representation (first 8 characters).
            pub fn short_id(&self) -> &str {
                let end = self
                    .0
                    .char_indices()
                    .nth(8)
                    .map(|(i, _)| i)
                    .unwrap_or(self.0.len());
                &self.0[..end]
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short_id())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a project. Immutable once the project is created.
    ProjectId
);

string_id!(
    /// Identifier of a layer within a project.
    LayerId
);

string_id!(
    /// Identifier of a feature. Stable once assigned, across undo/redo.
    FeatureId
);

string_id!(
    /// Identifier of an export layout.
    LayoutId
);

string_id!(
    /// Identifier of a shared view.
    SharedViewId
);
