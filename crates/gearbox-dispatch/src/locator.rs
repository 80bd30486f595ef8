//! Resolution of a starting gear's inputs.

use gearbox_core::file::{FileError, FileRef};
use gearbox_core::ids::ContainerId;
use gearbox_core::pipeline::{FileLocator, InputSpec, MODULE_PLACEHOLDER};
use gearbox_core::ports::FileStore;
use gearbox_core::Result;
use std::collections::BTreeMap;
use thiserror::Error;

/// An input that could not be found. Reported on the triggering file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnresolvedInput {
    #[error("input {label} needs a module but none was detected for {file}")]
    NoModule { label: String, file: String },

    #[error("input {label}: file {name} not found in {container}")]
    NotFound {
        label: String,
        name: String,
        container: ContainerId,
    },

    #[error("input {label} has no file name configured")]
    NoFileName { label: String },
}

impl UnresolvedInput {
    pub fn to_file_error(&self) -> FileError {
        FileError::new("unresolved-input", self.to_string())
    }
}

/// Looks up the files a pipeline's starting gear consumes.
pub struct InputResolver<'a> {
    files: &'a dyn FileStore,
    resource_container: Option<&'a ContainerId>,
}

impl<'a> InputResolver<'a> {
    /// `resource_container` holds shared files (templates, rule sets); when
    /// unset, inputs are looked up next to the triggering file.
    pub fn new(files: &'a dyn FileStore, resource_container: Option<&'a ContainerId>) -> Self {
        Self {
            files,
            resource_container,
        }
    }

    /// Resolve every input. The outer `Result` carries platform failures; the
    /// inner one the first input that could not be found.
    pub async fn resolve(
        &self,
        specs: &[InputSpec],
        file: &FileRef,
        module: Option<&str>,
    ) -> Result<std::result::Result<BTreeMap<String, FileRef>, UnresolvedInput>> {
        let mut inputs = BTreeMap::new();
        for spec in specs {
            match self.resolve_one(spec, file, module).await? {
                Ok(found) => {
                    inputs.insert(spec.label.clone(), found);
                }
                Err(unresolved) => return Ok(Err(unresolved)),
            }
        }
        Ok(Ok(inputs))
    }

    async fn resolve_one(
        &self,
        spec: &InputSpec,
        file: &FileRef,
        module: Option<&str>,
    ) -> Result<std::result::Result<FileRef, UnresolvedInput>> {
        let name = match (spec.file_locator, spec.file_name.as_deref()) {
            (FileLocator::Matched, _) => return Ok(Ok(file.clone())),
            (_, None) => {
                return Ok(Err(UnresolvedInput::NoFileName {
                    label: spec.label.clone(),
                }));
            }
            (FileLocator::Fixed, Some(name)) => name.to_string(),
            (FileLocator::Module, Some(pattern)) => match module {
                Some(module) => pattern.replace(MODULE_PLACEHOLDER, module),
                None => {
                    return Ok(Err(UnresolvedInput::NoModule {
                        label: spec.label.clone(),
                        file: file.name.clone(),
                    }));
                }
            },
        };

        let container = self.resource_container.unwrap_or(&file.parent);
        Ok(self
            .files
            .find_file(container, &name)
            .await?
            .ok_or_else(|| UnresolvedInput::NotFound {
                label: spec.label.clone(),
                name,
                container: container.clone(),
            }))
    }
}
