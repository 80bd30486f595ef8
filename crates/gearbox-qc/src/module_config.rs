//! Static per-module settings.

use gearbox_core::config::load_document;
use gearbox_core::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ModuleConfig {
    /// Later visits depend on earlier ones and are evaluated in order.
    #[serde(default = "default_longitudinal")]
    pub longitudinal: bool,
}

fn default_longitudinal() -> bool {
    true
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            longitudinal: default_longitudinal(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ModuleConfigs {
    pub modules: BTreeMap<String, ModuleConfig>,
}

impl ModuleConfigs {
    pub fn from_file(path: &Path) -> Result<Self> {
        let configs: Self = load_document(path)?;
        if configs.modules.is_empty() {
            return Err(Error::Configuration(format!(
                "{}: no modules configured",
                path.display()
            )));
        }
        Ok(configs)
    }

    pub fn with(mut self, module: impl Into<String>, config: ModuleConfig) -> Self {
        self.modules.insert(module.into(), config);
        self
    }

    /// Settings for a module, matched ignoring case. Unknown modules are a
    /// configuration error: longitudinality is never guessed.
    pub fn get(&self, module: &str) -> Result<&ModuleConfig> {
        self.modules
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(module))
            .map(|(_, config)| config)
            .ok_or_else(|| Error::Configuration(format!("unknown module: {module}")))
    }
}
