//! Declarative pipeline routing.

use gearbox_core::file::FileRef;
use gearbox_core::pipeline::{PipelineConfig, PipelineDefinition};

/// A pipeline selected for a file, with the module detected for it.
#[derive(Debug, Clone, Copy)]
pub struct RouteMatch<'a> {
    pub pipeline: &'a PipelineDefinition,
    pub module: Option<&'a str>,
}

/// Ordered routing table built from the pipeline config.
pub struct PipelineRouter {
    pipelines: Vec<PipelineDefinition>,
}

impl PipelineRouter {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            pipelines: config.pipelines.clone(),
        }
    }

    /// First pipeline, in declaration order, whose required tags are all on
    /// the file and whose extensions include the file's.
    pub fn route(&self, file: &FileRef) -> Option<RouteMatch<'_>> {
        self.pipelines
            .iter()
            .find(|p| p.tags_match(&file.tags) && p.accepts_extension(&file.name))
            .map(|pipeline| RouteMatch {
                pipeline,
                module: detect_module(file, &pipeline.modules),
            })
    }
}

/// Detect a file's module: a tag naming one of `modules` wins, otherwise a
/// token of the file stem. Matching ignores case; the configured spelling is
/// returned.
pub fn detect_module<'a>(file: &FileRef, modules: &'a [String]) -> Option<&'a str> {
    let find = |candidate: &str| {
        modules
            .iter()
            .find(|m| m.eq_ignore_ascii_case(candidate))
            .map(String::as_str)
    };

    file.tags.iter().find_map(|t| find(t)).or_else(|| {
        file.stem()
            .split(['_', '-', '.', ' '])
            .find_map(|token| find(token))
    })
}
