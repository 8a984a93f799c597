//! Command dispatch
//!
//! The [`CapabilityRegistry`] maps registered names to providers and is frozen
//! once built. The [`Dispatcher`] routes each [`Command`] to its provider's
//! operation table. Every failure is confined to the command that caused it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::capability::{CapabilityError, CapabilityProvider, shape_of};
use crate::intent::Command;
use crate::{Error, Result};

/// Default bound on a single operation
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Immutable name → provider mapping
#[derive(Default)]
pub struct CapabilityRegistry {
    providers: Vec<Arc<dyn CapabilityProvider>>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Look up a provider by registered name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn CapabilityProvider>> {
        self.index.get(name).map(|&i| &self.providers[i])
    }

    /// Providers in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn CapabilityProvider>> {
        self.providers.iter()
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|p| p.name())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Builder for [`CapabilityRegistry`]
#[derive(Default)]
pub struct RegistryBuilder {
    providers: Vec<Arc<dyn CapabilityProvider>>,
}

impl RegistryBuilder {
    /// Add a provider
    #[must_use]
    pub fn register(mut self, provider: Arc<dyn CapabilityProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Freeze the registry
    ///
    /// # Errors
    ///
    /// Returns `Error::Capability` if two providers share a name
    pub fn build(self) -> Result<CapabilityRegistry> {
        let mut index = HashMap::with_capacity(self.providers.len());
        for (i, provider) in self.providers.iter().enumerate() {
            if index.insert(provider.name().to_string(), i).is_some() {
                return Err(Error::Capability(format!(
                    "capability `{}` registered twice",
                    provider.name()
                )));
            }
            tracing::debug!(
                capability = provider.name(),
                operations = provider.operations().len(),
                "capability registered"
            );
        }

        Ok(CapabilityRegistry {
            providers: self.providers,
            index,
        })
    }
}

/// Why a single command did not take effect
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No provider is registered under the command's target
    #[error("unknown capability `{target}`")]
    UnknownTarget { target: String },

    /// The provider does not declare the requested operation
    #[error("capability `{target}` has no operation `{operation}`")]
    UnknownOperation { target: String, operation: String },

    /// The parameters do not fit the declared signature
    #[error("{target}.{operation}: {reason} (expected {expected}, got {got})")]
    ParamMismatch {
        target: String,
        operation: String,
        expected: String,
        got: String,
        reason: String,
    },

    /// The provider failed while performing the operation
    #[error("{target}.{operation} failed: {source}")]
    Provider {
        target: String,
        operation: String,
        #[source]
        source: CapabilityError,
    },

    /// The operation did not finish in time
    #[error("{target}.{operation} timed out after {}s", after.as_secs())]
    Timeout {
        target: String,
        operation: String,
        after: Duration,
    },
}

/// Result of one command in a batch
#[derive(Debug)]
pub struct CommandOutcome {
    pub command: Command,
    pub result: std::result::Result<Option<Value>, DispatchError>,
}

/// Results of a whole batch, in dispatch order
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<CommandOutcome>,
}

impl DispatchReport {
    /// Number of commands that took effect
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Commands that did not take effect
    pub fn failures(&self) -> impl Iterator<Item = (&Command, &DispatchError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.command, e)))
    }

    /// Whether every command took effect
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Routes commands to capability providers
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher with the default per-command timeout
    #[must_use]
    pub const fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Override the per-command timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Run one command
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] describing why the command did not take
    /// effect; nothing else is affected
    pub async fn dispatch(
        &self,
        command: &Command,
    ) -> std::result::Result<Option<Value>, DispatchError> {
        let target = command.target.as_str();
        let operation_name = command.operation.as_str();

        let provider = self
            .registry
            .get(target)
            .ok_or_else(|| DispatchError::UnknownTarget {
                target: target.to_string(),
            })?;

        let operation = provider.operations().get(operation_name).ok_or_else(|| {
            DispatchError::UnknownOperation {
                target: target.to_string(),
                operation: operation_name.to_string(),
            }
        })?;

        let params = operation
            .spec()
            .validate(command.params.clone())
            .map_err(|m| DispatchError::ParamMismatch {
                target: target.to_string(),
                operation: operation_name.to_string(),
                expected: m.expected,
                got: m.got,
                reason: m.reason,
            })?;

        tracing::debug!(capability = %target, operation = %operation_name, "invoking operation");

        match tokio::time::timeout(self.timeout, operation.call(params)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(DispatchError::Provider {
                target: target.to_string(),
                operation: operation_name.to_string(),
                source,
            }),
            Err(_) => Err(DispatchError::Timeout {
                target: target.to_string(),
                operation: operation_name.to_string(),
                after: self.timeout,
            }),
        }
    }

    /// Run a batch of commands sequentially, in order
    ///
    /// A failing command is logged and recorded; the rest of the batch still
    /// runs.
    pub async fn handle_request(&self, commands: &[Command]) -> DispatchReport {
        let mut report = DispatchReport {
            outcomes: Vec::with_capacity(commands.len()),
        };

        for command in commands {
            let result = self.dispatch(command).await;
            match &result {
                Ok(_) => tracing::info!(
                    capability = %command.target,
                    operation = %command.operation,
                    "command executed"
                ),
                Err(e) => tracing::warn!(
                    capability = %command.target,
                    operation = %command.operation,
                    params = %shape_of(&serde_json::Value::Array(command.params.clone())),
                    error = %e,
                    "command skipped"
                ),
            }
            report.outcomes.push(CommandOutcome {
                command: command.clone(),
                result,
            });
        }

        report
    }
}
