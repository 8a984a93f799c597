//! Philips Hue lighting over the bridge's local REST API

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::capability::{
    CapabilityError, CapabilityProvider, OperationOutput, OperationSpec, OperationTable, ParamKind,
};
use crate::{Error, Result};

/// Registered name
pub const NAME: &str = "hue";

/// Highest brightness value the bridge accepts
const MAX_BRIGHTNESS: i64 = 254;

const DEFAULT_DESCRIPTION: &str = "Controls the lights of the house through the Hue bridge. \
     Lights are addressed by their integer index.";

/// Fields of the configuration blob the provider itself needs
#[derive(Debug, Deserialize)]
struct HueSettings {
    bridge_ip: String,
    manager_description: Option<String>,
}

/// Client for one Hue bridge
struct HueBridge {
    client: Client,
    bridge_ip: String,
    username: Option<SecretString>,
}

impl HueBridge {
    fn lights_url(&self) -> std::result::Result<String, CapabilityError> {
        let username = self.username.as_ref().ok_or_else(|| {
            CapabilityError::Rejected("HUE_USERNAME is not set".to_string())
        })?;
        Ok(format!(
            "http://{}/api/{}/lights",
            self.bridge_ip,
            username.expose_secret()
        ))
    }

    async fn get_lights(&self) -> OperationOutput {
        let response = self
            .client
            .get(self.lights_url()?)
            .send()
            .await
            .map_err(unreachable_bridge)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Rejected(format!(
                "Hue bridge error: {status} - {body}"
            )));
        }

        let lights: Value = response.json().await?;
        tracing::info!(count = lights.as_object().map_or(0, serde_json::Map::len), "hue lights listed");
        Ok(Some(lights))
    }

    async fn get_light(&self, index: u64) -> OperationOutput {
        let url = format!("{}/{index}", self.lights_url()?);
        let response = self.client.get(url).send().await.map_err(unreachable_bridge)?;
        let light: Value = response.json().await?;
        reject_bridge_errors(&light)?;
        Ok(Some(light))
    }

    /// Apply the same state change to every light in `indexes`
    async fn set_state(&self, indexes: &[u64], state: &Value) -> OperationOutput {
        let base = self.lights_url()?;

        for index in indexes {
            let response = self
                .client
                .put(format!("{base}/{index}/state"))
                .json(state)
                .send()
                .await
                .map_err(unreachable_bridge)?;

            let body: Value = response.json().await?;
            reject_bridge_errors(&body)?;
            tracing::debug!(light = index, state = %state, "hue light updated");
        }

        Ok(None)
    }
}

fn unreachable_bridge(e: reqwest::Error) -> CapabilityError {
    CapabilityError::Unreachable(format!("Hue bridge: {e}"))
}

/// The bridge answers 200 with a list of `{"success": ..}` / `{"error": ..}`
fn reject_bridge_errors(body: &Value) -> std::result::Result<(), CapabilityError> {
    let entries = body.as_array().map_or_else(|| vec![body], |a| a.iter().collect());
    let errors: Vec<&str> = entries
        .iter()
        .filter_map(|entry| entry.pointer("/error/description").and_then(Value::as_str))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(CapabilityError::Rejected(errors.join("; ")))
    }
}

/// Light indexes from a validated `int[]` parameter
fn light_indexes(value: &Value) -> std::result::Result<Vec<u64>, CapabilityError> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .map(|v| {
            v.as_u64()
                .ok_or_else(|| CapabilityError::Rejected(format!("invalid light index {v}")))
        })
        .collect()
}

fn integer(value: &Value) -> std::result::Result<i64, CapabilityError> {
    value
        .as_i64()
        .ok_or_else(|| CapabilityError::Rejected(format!("integer out of range: {value}")))
}

/// Convert a percentage into a brightness delta
fn percent_to_delta(percent: i64) -> std::result::Result<i64, CapabilityError> {
    if !(0..=100).contains(&percent) {
        return Err(CapabilityError::Rejected(format!(
            "percentage must be within 0..=100, got {percent}"
        )));
    }
    Ok(percent * MAX_BRIGHTNESS / 100)
}

/// Lighting capability backed by a Hue bridge
pub struct HueProvider {
    description: String,
    configuration: Value,
    operations: OperationTable,
}

impl HueProvider {
    /// Build the provider from its configuration blob
    ///
    /// `username` may be absent when the provider is only used to generate
    /// documentation; operations then fail with a rejection.
    ///
    /// # Errors
    ///
    /// Returns `Error::Priming` if the blob lacks `bridge_ip`
    pub fn new(configuration: Value, username: Option<SecretString>) -> Result<Self> {
        let settings: HueSettings = serde_json::from_value(configuration.clone())
            .map_err(|e| Error::Priming(format!("invalid hue configuration: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Capability(format!("failed to build HTTP client: {e}")))?;

        let bridge = Arc::new(HueBridge {
            client,
            bridge_ip: settings.bridge_ip,
            username,
        });

        Ok(Self {
            description: settings
                .manager_description
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            configuration,
            operations: operation_table(&bridge)?,
        })
    }
}

fn operation_table(bridge: &Arc<HueBridge>) -> Result<OperationTable> {
    let get_lights = Arc::clone(bridge);
    let get_light = Arc::clone(bridge);
    let turn_on = Arc::clone(bridge);
    let turn_off = Arc::clone(bridge);
    let set_brightness = Arc::clone(bridge);
    let increase = Arc::clone(bridge);
    let decrease = Arc::clone(bridge);

    OperationTable::builder()
        .operation(
            OperationSpec::new("get_lights", "List the lights connected to the bridge"),
            move |_| {
                let bridge = Arc::clone(&get_lights);
                async move { bridge.get_lights().await }
            },
        )
        .operation(
            OperationSpec::new("get_light", "Get one light by its index")
                .param("light_index", ParamKind::Integer),
            move |params| {
                let bridge = Arc::clone(&get_light);
                async move {
                    let index = params[0].as_u64().ok_or_else(|| {
                        CapabilityError::Rejected(format!("invalid light index {}", params[0]))
                    })?;
                    bridge.get_light(index).await
                }
            },
        )
        .operation(
            OperationSpec::new("turn_on_lights", "Turn on the lights with the given indexes")
                .param("lights_indexes", ParamKind::IntegerList),
            move |params| {
                let bridge = Arc::clone(&turn_on);
                async move {
                    let indexes = light_indexes(&params[0])?;
                    bridge.set_state(&indexes, &json!({ "on": true })).await
                }
            },
        )
        .operation(
            OperationSpec::new(
                "turn_off_lights",
                "Turn off the lights with the given indexes; to turn off every light, pass every index",
            )
            .param("lights_indexes", ParamKind::IntegerList),
            move |params| {
                let bridge = Arc::clone(&turn_off);
                async move {
                    let indexes = light_indexes(&params[0])?;
                    bridge.set_state(&indexes, &json!({ "on": false })).await
                }
            },
        )
        .operation(
            OperationSpec::new(
                "set_lights_brightness",
                "Set the brightness (0-254) of the lights with the given indexes",
            )
            .param("lights_indexes", ParamKind::IntegerList)
            .param("brightness", ParamKind::Integer),
            move |params| {
                let bridge = Arc::clone(&set_brightness);
                async move {
                    let indexes = light_indexes(&params[0])?;
                    let brightness = integer(&params[1])?;
                    if !(0..=MAX_BRIGHTNESS).contains(&brightness) {
                        return Err(CapabilityError::Rejected(format!(
                            "brightness must be within 0..={MAX_BRIGHTNESS}, got {brightness}"
                        )));
                    }
                    bridge.set_state(&indexes, &json!({ "bri": brightness })).await
                }
            },
        )
        .operation(
            OperationSpec::new(
                "increase_brightness",
                "Increase the brightness of the given lights by a percentage",
            )
            .param("lights_indexes", ParamKind::IntegerList)
            .param("increase_percentage", ParamKind::Integer),
            move |params| {
                let bridge = Arc::clone(&increase);
                async move {
                    let indexes = light_indexes(&params[0])?;
                    let delta = percent_to_delta(integer(&params[1])?)?;
                    bridge.set_state(&indexes, &json!({ "bri_inc": delta })).await
                }
            },
        )
        .operation(
            OperationSpec::new(
                "decrease_lights_brightness",
                "Decrease the brightness of the given lights by a percentage",
            )
            .param("lights_indexes", ParamKind::IntegerList)
            .param("decrease_percentage", ParamKind::Integer),
            move |params| {
                let bridge = Arc::clone(&decrease);
                async move {
                    let indexes = light_indexes(&params[0])?;
                    let delta = percent_to_delta(integer(&params[1])?)?;
                    bridge.set_state(&indexes, &json!({ "bri_inc": -delta })).await
                }
            },
        )
        .build()
}

impl CapabilityProvider for HueProvider {
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
