//! Concrete capability providers
//!
//! Which providers run is decided by the `[capabilities.<name>]` tables of the
//! configuration file. Each provider reads its JSON configuration blob at
//! startup; a missing or invalid blob stops the process before it listens.

pub mod home_assistant;
pub mod hue;

use std::sync::Arc;

use crate::capability::{CapabilityDoc, CapabilityProvider, load_configuration_blob};
use crate::config::Config;
use crate::dispatch::CapabilityRegistry;
use crate::{Error, Result};

pub use home_assistant::HomeAssistantProvider;
pub use hue::HueProvider;

/// Names accepted under `[capabilities]`
pub const KNOWN: &[&str] = &[hue::NAME, home_assistant::NAME];

/// Whether `name` is a provider this build knows how to construct
#[must_use]
pub fn is_known(name: &str) -> bool {
    KNOWN.contains(&name)
}

/// Build the registry of every enabled capability
///
/// # Errors
///
/// Returns `Error::Priming` if a configuration blob is missing or invalid and
/// `Error::Config` if a provider's credentials are not set
pub fn build_registry(config: &Config) -> Result<CapabilityRegistry> {
    let registry = build(config, true)?;
    tracing::info!(capabilities = ?registry.names().collect::<Vec<_>>(), "capabilities loaded");
    Ok(registry)
}

/// Generate the documentation feed for every enabled capability
///
/// Credentials are not required.
///
/// # Errors
///
/// Returns `Error::Priming` if a configuration blob is missing or invalid
pub fn documentation(config: &Config) -> Result<Vec<CapabilityDoc>> {
    let registry = build(config, false)?;
    Ok(registry
        .iter()
        .map(|p| CapabilityDoc::from_provider(p.as_ref()))
        .collect())
}

fn build(config: &Config, require_credentials: bool) -> Result<CapabilityRegistry> {
    let keys = &config.api_keys;
    let mut builder = CapabilityRegistry::builder();

    for capability in &config.capabilities {
        let blob = load_configuration_blob(&capability.configuration_path)?;

        let provider: Arc<dyn CapabilityProvider> = match capability.name.as_str() {
            hue::NAME => {
                if require_credentials && keys.hue_username.is_none() {
                    return Err(Error::Config(
                        "hue capability requires HUE_USERNAME".to_string(),
                    ));
                }
                Arc::new(HueProvider::new(blob, keys.hue_username.clone())?)
            }
            home_assistant::NAME => {
                if require_credentials && keys.home_assistant.is_none() {
                    return Err(Error::Config(
                        "home_assistant capability requires HOME_ASSISTANT_TOKEN".to_string(),
                    ));
                }
                Arc::new(HomeAssistantProvider::new(
                    blob,
                    keys.home_assistant.clone(),
                )?)
            }
            other => {
                return Err(Error::Config(format!("unknown capability `{other}`")));
            }
        };

        builder = builder.register(provider);
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::config::file::HearthConfigFile;

    fn config(dir: &Path, env: &[(&str, &str)]) -> Config {
        std::fs::write(dir.join("hue.json"), r#"{"bridge_ip": "10.0.0.2", "hue_lights": []}"#)
            .unwrap();
        let file: HearthConfigFile = toml::from_str(
            "assistant_name = \"Jarvis\"\n[capabilities.hue]\nconfiguration = \"hue.json\"",
        )
        .unwrap();
        let env: Vec<(String, String)> = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_file(file, dir, &|key| {
            env.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    #[test]
    fn registry_holds_enabled_capabilities() {
        let dir = tempfile::tempdir().unwrap();
        let registry = build_registry(&config(dir.path(), &[("HUE_USERNAME", "abc")])).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["hue"]);
    }

    #[test]
    fn missing_credentials_are_fatal_but_docs_still_build() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &[]);
        assert!(matches!(build_registry(&config), Err(Error::Config(_))));

        let docs = documentation(&config).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name, "hue");
    }

    #[test]
    fn missing_blob_is_a_priming_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), &[("HUE_USERNAME", "abc")]);
        std::fs::remove_file(dir.path().join("hue.json")).unwrap();
        assert!(matches!(build_registry(&config), Err(Error::Priming(_))));
    }
}
