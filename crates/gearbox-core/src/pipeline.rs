//! Submission pipeline routing configuration.
//!
//! A pipeline is matched against an arriving file by tags and extension and
//! names the gear that starts it. Adding a pipeline is a config change.

use crate::config::load_document;
use crate::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Placeholder replaced by the detected module in `module` locators.
pub const MODULE_PLACEHOLDER: &str = "${module}";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    /// Every gear any pipeline may start.
    pub gears: Vec<String>,
    pub pipelines: Vec<PipelineDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub modules: Vec<String>,
    /// Tags the file must carry, all of them.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Accepted file extensions, with or without the leading dot.
    pub extensions: Vec<String>,
    pub starting_gear: StartingGear,
    #[serde(default)]
    pub notify_user: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StartingGear {
    pub gear_name: String,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub configs: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InputSpec {
    pub label: String,
    pub file_locator: FileLocator,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileLocator {
    /// The file that triggered the pipeline.
    Matched,
    /// A file named from `file_name` with `${module}` replaced.
    Module,
    /// A literal file name at the resource location.
    Fixed,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: Self = load_document(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let gears: HashSet<&str> = self.gears.iter().map(String::as_str).collect();
        let mut names = HashSet::new();

        for pipeline in &self.pipelines {
            if !names.insert(pipeline.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "duplicate pipeline name: {}",
                    pipeline.name
                )));
            }
            if !gears.contains(pipeline.starting_gear.gear_name.as_str()) {
                return Err(Error::Configuration(format!(
                    "pipeline {} starts gear {} which is not listed in gears",
                    pipeline.name, pipeline.starting_gear.gear_name
                )));
            }
            if pipeline.extensions.is_empty() {
                return Err(Error::Configuration(format!(
                    "pipeline {} accepts no extensions",
                    pipeline.name
                )));
            }
            for input in &pipeline.starting_gear.inputs {
                validate_input(&pipeline.name, input)?;
            }
        }
        Ok(())
    }
}

fn validate_input(pipeline: &str, input: &InputSpec) -> Result<()> {
    match (input.file_locator, input.file_name.as_deref()) {
        (FileLocator::Matched, _) => Ok(()),
        (FileLocator::Fixed, Some(name)) if !name.is_empty() => Ok(()),
        (FileLocator::Module, Some(name)) if name.contains(MODULE_PLACEHOLDER) => Ok(()),
        (FileLocator::Module, Some(name)) => Err(Error::Configuration(format!(
            "pipeline {pipeline}: input {} file name {name} has no {MODULE_PLACEHOLDER}",
            input.label
        ))),
        (locator, _) => Err(Error::Configuration(format!(
            "pipeline {pipeline}: input {} uses {locator:?} locator without file_name",
            input.label
        ))),
    }
}

impl PipelineDefinition {
    /// Whether this pipeline accepts a file name's extension.
    pub fn accepts_extension(&self, file_name: &str) -> bool {
        let Some((_, ext)) = file_name.rsplit_once('.') else {
            return false;
        };
        self.extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }

    /// Whether every required tag is present.
    pub fn tags_match(&self, tags: &[String]) -> bool {
        self.tags.iter().all(|required| tags.contains(required))
    }
}
