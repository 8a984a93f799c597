//! Home Assistant script runner over the REST API

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use crate::capability::{
    CapabilityError, CapabilityProvider, OperationOutput, OperationSpec, OperationTable, ParamKind,
};
use crate::{Error, Result};

/// Registered name
pub const NAME: &str = "home_assistant";

const DEFAULT_DESCRIPTION: &str =
    "Runs Home Assistant scripts (TV box power, media playback, ...).";

#[derive(Debug, Deserialize)]
struct HomeAssistantSettings {
    url: String,
    #[serde(default)]
    scripts: Vec<String>,
    manager_description: Option<String>,
}

struct HomeAssistantClient {
    client: Client,
    url: String,
    token: Option<SecretString>,
    scripts: Vec<String>,
}

impl HomeAssistantClient {
    async fn run_script(&self, script_name: &str) -> OperationOutput {
        if !self.scripts.iter().any(|s| s == script_name) {
            return Err(CapabilityError::Rejected(format!(
                "script `{script_name}` is not one of: {}",
                self.scripts.join(", ")
            )));
        }

        let token = self.token.as_ref().ok_or_else(|| {
            CapabilityError::Rejected("HOME_ASSISTANT_TOKEN is not set".to_string())
        })?;

        let url = format!("{}/api/services/script/{script_name}", self.url);
        tracing::info!(script = script_name, "running home assistant script");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| CapabilityError::Unreachable(format!("Home Assistant: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Rejected(format!(
                "Home Assistant API error: {status} - {body}"
            )));
        }

        Ok(None)
    }
}

/// Script-runner capability backed by a Home Assistant instance
pub struct HomeAssistantProvider {
    description: String,
    configuration: Value,
    operations: OperationTable,
}

impl HomeAssistantProvider {
    /// Build the provider from its configuration blob (`url`, `scripts`)
    ///
    /// # Errors
    ///
    /// Returns `Error::Priming` if the blob lacks `url` or allows no script
    pub fn new(configuration: Value, token: Option<SecretString>) -> Result<Self> {
        let settings: HomeAssistantSettings = serde_json::from_value(configuration.clone())
            .map_err(|e| Error::Priming(format!("invalid home_assistant configuration: {e}")))?;
        if settings.scripts.is_empty() {
            return Err(Error::Priming(
                "home_assistant configuration allows no scripts".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Capability(format!("failed to build HTTP client: {e}")))?;

        let ha = Arc::new(HomeAssistantClient {
            client,
            url: settings.url.trim_end_matches('/').to_string(),
            token,
            scripts: settings.scripts,
        });

        let usage = format!(
            "Run a Home Assistant script; script_name is one of: {}",
            ha.scripts.join(", ")
        );

        let operations = OperationTable::builder()
            .operation(
                OperationSpec::new("use_ha_script", usage).param("script_name", ParamKind::Text),
                move |params| {
                    let ha = Arc::clone(&ha);
                    async move {
                        let script = params[0].as_str().unwrap_or_default();
                        ha.run_script(script).await
                    }
                },
            )
            .build()?;

        Ok(Self {
            description: settings
                .manager_description
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            configuration,
            operations,
        })
    }
}

impl CapabilityProvider for HomeAssistantProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn operations(&self) -> &OperationTable {
        &self.operations
    }

    fn configuration(&self) -> &Value {
        &self.configuration
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn provider() -> HomeAssistantProvider {
        HomeAssistantProvider::new(
            json!({"url": "http://ha.local:8123/", "scripts": ["switch_on_tv_box", "android_tv_pause"]}),
            Some(SecretString::from("token".to_string())),
        )
        .unwrap()
    }

    #[test]
    fn usage_lists_allowed_scripts() {
        let ha = provider();
        let op = ha.operations().get("use_ha_script").unwrap();
        assert!(op.spec().usage.contains("android_tv_pause"));
        assert_eq!(op.spec().signature(), "use_ha_script(script_name: str)");
    }

    #[tokio::test]
    async fn unknown_script_is_rejected_before_any_request() {
        let ha = provider();
        let op = ha.operations().get("use_ha_script").unwrap();
        let err = op.call(vec![json!("open_garage")]).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Rejected(_)));
    }

    #[test]
    fn missing_url_is_a_priming_error() {
        assert!(matches!(
            HomeAssistantProvider::new(json!({"scripts": ["tv"]}), None),
            Err(Error::Priming(_))
        ));
    }

    #[test]
    fn empty_allow_list_is_a_priming_error() {
        for blob in [
            json!({"url": "http://ha.local:8123"}),
            json!({"url": "http://ha.local:8123", "scripts": []}),
        ] {
            assert!(matches!(
                HomeAssistantProvider::new(blob, None),
                Err(Error::Priming(_))
            ));
        }
    }
}
