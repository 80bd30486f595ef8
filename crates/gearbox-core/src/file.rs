//! File objects stored in platform containers.

use crate::ids::{ContainerId, FileId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FileRef {
    pub id: FileId,
    pub name: String,
    /// Container the file is attached to.
    pub parent: ContainerId,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Email of the user who uploaded the file, when known.
    #[serde(default)]
    pub origin: Option<String>,
}

impl FileRef {
    /// File name without its final extension.
    pub fn stem(&self) -> &str {
        self.name
            .rsplit_once('.')
            .map_or(self.name.as_str(), |(stem, _)| stem)
    }
}

/// An error recorded against a file, visible to its uploader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FileError {
    /// Short machine-readable code, e.g. `missing-input`.
    pub code: String,
    pub message: String,
}

impl FileError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
