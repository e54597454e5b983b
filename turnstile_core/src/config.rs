//! The dataset-permissions configuration document
//!
//! The document is human-edited YAML shaped like:
//!
//! ```yaml
//! "Dataset Permissions":
//!   "Sales":
//!     "group_permissions":
//!       "Read": ["b47b0f32-3c17-4b3f-a9a5-5c893a74cf2a"]
//! ```
//!
//! The whole document is parsed and validated up front so that every later
//! lookup works against a known-good, immutable mapping.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use yaml_peg::serde as yaml;

/// Error raised while loading or validating the permission configuration.
/// Any variant is fatal; the run aborts before any network call is made.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read at all.
    #[error("unable to read permission config {path}: {source}")]
    Unreadable {
        /// Path the loader was pointed at.
        path: PathBuf,
        /// Underlying io error.
        source: std::io::Error,
    },
    /// The document is not valid YAML or has the wrong shape.
    #[error("malformed permission config: {0}")]
    Parse(String),
    /// The top level has no "Dataset Permissions" section.
    #[error("permission config is missing the \"Dataset Permissions\" section")]
    MissingSection,
    /// A workspace was declared with an empty name.
    #[error("workspace names must be non-empty")]
    EmptyWorkspaceName,
    /// A permission level is not part of the service's enumeration.
    #[error("unsupported permission level {level:?} for workspace {workspace:?}")]
    UnknownPermissionLevel {
        /// Workspace the level was declared under.
        workspace: String,
        /// The offending level name.
        level: String,
    },
    /// A group identifier is not a well-formed GUID.
    #[error("group id {group:?} for workspace {workspace:?} is not a valid GUID")]
    InvalidGroupId {
        /// Workspace the group was declared under.
        workspace: String,
        /// The offending identifier.
        group: String,
    },
}

/// The dataset access rights the service accepts. Serialized exactly in the
/// service's spelling.
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum PermissionLevel {
    /// View reports built on the dataset.
    Read,
    /// Read plus explore (build new reports).
    ReadExplore,
    /// Read plus reshare.
    ReadReshare,
    /// Read, reshare, and explore.
    ReadReshareExplore,
    /// Read plus write.
    ReadWrite,
    /// Read, write, and explore.
    ReadWriteExplore,
    /// Read, write, and reshare.
    ReadWriteReshare,
    /// Every right the service defines.
    ReadWriteReshareExplore,
}

impl PermissionLevel {
    /// The service-side spelling of the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Read => "Read",
            PermissionLevel::ReadExplore => "ReadExplore",
            PermissionLevel::ReadReshare => "ReadReshare",
            PermissionLevel::ReadReshareExplore => "ReadReshareExplore",
            PermissionLevel::ReadWrite => "ReadWrite",
            PermissionLevel::ReadWriteExplore => "ReadWriteExplore",
            PermissionLevel::ReadWriteReshare => "ReadWriteReshare",
            PermissionLevel::ReadWriteReshareExplore => "ReadWriteReshareExplore",
        }
    }
}

impl Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Read" => Ok(PermissionLevel::Read),
            "ReadExplore" => Ok(PermissionLevel::ReadExplore),
            "ReadReshare" => Ok(PermissionLevel::ReadReshare),
            "ReadReshareExplore" => Ok(PermissionLevel::ReadReshareExplore),
            "ReadWrite" => Ok(PermissionLevel::ReadWrite),
            "ReadWriteExplore" => Ok(PermissionLevel::ReadWriteExplore),
            "ReadWriteReshare" => Ok(PermissionLevel::ReadWriteReshare),
            "ReadWriteReshareExplore" => Ok(PermissionLevel::ReadWriteReshareExplore),
            other => Err(other.to_owned()),
        }
    }
}

/// The group grants declared for one workspace.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkspaceGrants {
    /// Permission level to the group GUIDs that should hold it.
    pub group_permissions: BTreeMap<PermissionLevel, Vec<String>>,
}

/// The validated, immutable in-memory form of the configuration document.
#[derive(Clone, Debug, Default)]
pub struct PermissionConfig {
    workspaces: BTreeMap<String, WorkspaceGrants>,
}

/// Raw serde shape of the on-disk document; validated into
/// [`PermissionConfig`] before anything else sees it.
#[derive(Deserialize)]
struct RawDocument {
    #[serde(rename = "Dataset Permissions")]
    dataset_permissions: Option<HashMap<String, RawWorkspace>>,
}

#[derive(Deserialize)]
struct RawWorkspace {
    group_permissions: HashMap<String, Vec<String>>,
}

impl PermissionConfig {
    /// Read and validate the configuration document at `path`.
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
            path: path.as_ref().to_owned(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse and validate a configuration document from a YAML string.
    pub fn from_yaml(doc: &str) -> Result<Self, ConfigError> {
        let mut docs = yaml::from_str::<RawDocument>(doc)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        let raw = docs.pop().ok_or(ConfigError::MissingSection)?;
        let sections = raw.dataset_permissions.ok_or(ConfigError::MissingSection)?;

        let mut workspaces = BTreeMap::new();
        for (workspace, raw_grants) in sections {
            if workspace.trim().is_empty() {
                return Err(ConfigError::EmptyWorkspaceName);
            }
            let mut group_permissions = BTreeMap::new();
            for (level_name, groups) in raw_grants.group_permissions {
                let level = PermissionLevel::from_str(&level_name).map_err(|level| {
                    ConfigError::UnknownPermissionLevel {
                        workspace: workspace.to_owned(),
                        level,
                    }
                })?;
                for group in &groups {
                    Uuid::parse_str(group).map_err(|_| ConfigError::InvalidGroupId {
                        workspace: workspace.to_owned(),
                        group: group.to_owned(),
                    })?;
                }
                group_permissions.insert(level, groups);
            }
            workspaces.insert(workspace, WorkspaceGrants { group_permissions });
        }

        Ok(Self { workspaces })
    }

    /// The grants declared for a workspace, if it is configured.
    pub fn workspace(&self, name: &str) -> Option<&WorkspaceGrants> {
        self.workspaces.get(name)
    }

    /// Whether a workspace name appears in the document.
    pub fn contains_workspace(&self, name: &str) -> bool {
        self.workspaces.contains_key(name)
    }

    /// All configured workspace names, sorted.
    pub fn workspace_names(&self) -> impl Iterator<Item = &String> {
        self.workspaces.keys()
    }
}
