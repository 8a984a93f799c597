//! Capability documentation feed
//!
//! Documentation is generated from each provider's operation table and fed
//! to the intent session when it primes the model.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CapabilityProvider;
use crate::{Error, Result};

/// Description of one capability as shown to the language model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDoc {
    pub name: String,
    pub description: String,
    pub operations: Vec<OperationDoc>,
}

/// Description of one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDoc {
    pub name: String,
    pub params: Vec<String>,
    pub usage: String,
}

impl CapabilityDoc {
    /// Generate documentation from a provider's operation table
    #[must_use]
    pub fn from_provider(provider: &dyn CapabilityProvider) -> Self {
        let operations = provider
            .operations()
            .iter()
            .map(|op| {
                let spec = op.spec();
                OperationDoc {
                    name: spec.name.clone(),
                    params: spec.params.iter().map(ToString::to_string).collect(),
                    usage: spec.usage.clone(),
                }
            })
            .collect();

        Self {
            name: provider.name().to_string(),
            description: provider.description().to_string(),
            operations,
        }
    }

    /// File name used when writing the feed to disk
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}_documentation.json", self.name)
    }

    /// Write the documentation as pretty JSON into `dir`
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be written
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        tracing::info!(path = %path.display(), capability = %self.name, "documentation written");
        Ok(path)
    }
}

/// Everything the intent session needs to know about one enabled capability
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityPriming {
    pub doc: CapabilityDoc,
    pub configuration: Value,
}

impl CapabilityPriming {
    /// Build priming data from a registered provider
    #[must_use]
    pub fn from_provider(provider: &dyn CapabilityProvider) -> Self {
        Self {
            doc: CapabilityDoc::from_provider(provider),
            configuration: provider.configuration().clone(),
        }
    }
}

/// Read a capability configuration blob
///
/// # Errors
///
/// Returns `Error::Priming` if the file is missing or is not valid JSON
pub fn load_configuration_blob(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::Priming(format!(
            "cannot read capability configuration {}: {e}",
            path.display()
        ))
    })?;

    serde_json::from_str(&raw).map_err(|e| {
        Error::Priming(format!(
            "invalid capability configuration {}: {e}",
            path.display()
        ))
    })
}
