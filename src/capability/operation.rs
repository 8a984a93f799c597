//! Typed operation tables
//!
//! Each provider declares its operations up front: a name, positional
//! parameters with a [`ParamKind`], a one-line usage string and an async
//! handler. The table is validated once when it is built, and every call is
//! checked against the declared signature before the handler runs.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Outcome of a capability operation
pub type OperationOutput = std::result::Result<Option<Value>, CapabilityError>;

/// Type-erased async operation handler
pub type Handler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, OperationOutput> + Send + Sync>;

/// Domain failure raised by a provider while performing an operation
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    /// The device or service behind the provider could not be reached
    #[error("device unreachable: {0}")]
    Unreachable(String),

    /// The device or service refused the request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Kind of a positional parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    /// JSON integer; numeric strings are rejected
    #[serde(rename = "int")]
    Integer,
    /// Any JSON number
    #[serde(rename = "number")]
    Number,
    /// JSON string
    #[serde(rename = "str")]
    Text,
    /// JSON boolean
    #[serde(rename = "bool")]
    Bool,
    /// List of integers; a bare integer is widened to a one-element list
    #[serde(rename = "int[]")]
    IntegerList,
    /// List of strings
    #[serde(rename = "str[]")]
    TextList,
    /// Any JSON value
    #[serde(rename = "any")]
    Any,
}

impl ParamKind {
    /// Short type label used in signatures and documentation
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Integer => "int",
            Self::Number => "number",
            Self::Text => "str",
            Self::Bool => "bool",
            Self::IntegerList => "int[]",
            Self::TextList => "str[]",
            Self::Any => "any",
        }
    }

    /// Check a value against this kind, returning the normalized value
    #[must_use]
    pub fn accept(self, value: Value) -> Option<Value> {
        match self {
            Self::Integer => is_integer(&value).then_some(value),
            Self::Number => value.is_number().then_some(value),
            Self::Text => value.is_string().then_some(value),
            Self::Bool => value.is_boolean().then_some(value),
            Self::IntegerList => {
                if is_integer(&value) {
                    return Some(Value::Array(vec![value]));
                }
                let all_integers = value.as_array()?.iter().all(is_integer);
                all_integers.then_some(value)
            }
            Self::TextList => {
                let all_text = value.as_array()?.iter().all(Value::is_string);
                all_text.then_some(value)
            }
            Self::Any => Some(value),
        }
    }
}

fn is_integer(value: &Value) -> bool {
    value.is_i64() || value.is_u64()
}

/// Describe the shape of a value (`int`, `str`, `[int, int]`, ...)
#[must_use]
pub fn shape_of(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(n) if n.is_f64() => "number".to_string(),
        Value::Number(_) => "int".to_string(),
        Value::String(_) => "str".to_string(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(shape_of).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(_) => "object".to_string(),
    }
}

/// A declared positional parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
}

impl fmt::Display for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.required { "" } else { "?" };
        write!(f, "{}{marker}: {}", self.name, self.kind.label())
    }
}

/// Parameters did not match an operation's declared signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamMismatch {
    /// Declared signature, e.g. `turn_off_lights(lights_indexes: int[])`
    pub expected: String,
    /// Shape of what was supplied, e.g. `[str]`
    pub got: String,
    /// What exactly failed
    pub reason: String,
}

impl fmt::Display for ParamMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (expected {}, got {})",
            self.reason, self.expected, self.got
        )
    }
}

/// Declaration of one named operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSpec {
    pub name: String,
    pub usage: String,
    pub params: Vec<ParamSpec>,
}

impl OperationSpec {
    /// Declare an operation with no parameters yet
    pub fn new(name: impl Into<String>, usage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            usage: usage.into(),
            params: Vec::new(),
        }
    }

    /// Append a required parameter
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    /// Append an optional (trailing) parameter
    #[must_use]
    pub fn optional_param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    fn required_count(&self) -> usize {
        self.params.iter().filter(|p| p.required).count()
    }

    /// Human-readable signature
    #[must_use]
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        format!("{}({})", self.name, params.join(", "))
    }

    /// Check supplied parameters against the declaration
    ///
    /// # Errors
    ///
    /// Returns a [`ParamMismatch`] on arity or kind mismatch
    pub fn validate(&self, params: Vec<Value>) -> std::result::Result<Vec<Value>, ParamMismatch> {
        let got = shape_of(&Value::Array(params.clone()));
        let required = self.required_count();

        if params.len() < required || params.len() > self.params.len() {
            let reason = if required == self.params.len() {
                format!("expected {required} parameter(s), got {}", params.len())
            } else {
                format!(
                    "expected {required} to {} parameter(s), got {}",
                    self.params.len(),
                    params.len()
                )
            };
            return Err(ParamMismatch {
                expected: self.signature(),
                got,
                reason,
            });
        }

        params
            .into_iter()
            .zip(&self.params)
            .map(|(value, spec)| {
                let shape = shape_of(&value);
                spec.kind.accept(value).ok_or_else(|| ParamMismatch {
                    expected: self.signature(),
                    got: got.clone(),
                    reason: format!(
                        "parameter `{}` must be {}, got {shape}",
                        spec.name,
                        spec.kind.label()
                    ),
                })
            })
            .collect()
    }

    fn check_declaration(&self) -> std::result::Result<(), String> {
        let valid_name = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_name {
            return Err(format!("invalid operation name `{}`", self.name));
        }

        let mut seen_optional = false;
        for param in &self.params {
            if param.required && seen_optional {
                return Err(format!(
                    "{}: required parameter `{}` follows an optional one",
                    self.name, param.name
                ));
            }
            seen_optional |= !param.required;
        }

        Ok(())
    }
}

/// A declared operation together with its handler
pub struct Operation {
    spec: OperationSpec,
    handler: Handler,
}

impl Operation {
    /// Operation declaration
    #[must_use]
    pub const fn spec(&self) -> &OperationSpec {
        &self.spec
    }

    /// Run the handler with already-validated parameters
    #[must_use]
    pub fn call(&self, params: Vec<Value>) -> BoxFuture<'static, OperationOutput> {
        (self.handler)(params)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Immutable set of operations offered by one provider
#[derive(Debug, Default)]
pub struct OperationTable {
    operations: Vec<Operation>,
    index: HashMap<String, usize>,
}

impl OperationTable {
    /// Start declaring a table
    #[must_use]
    pub fn builder() -> OperationTableBuilder {
        OperationTableBuilder::default()
    }

    /// Look up an operation by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.index.get(name).map(|&i| &self.operations[i])
    }

    /// Operations in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    /// Number of operations
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the table declares nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Builder for [`OperationTable`]
#[derive(Default)]
pub struct OperationTableBuilder {
    operations: Vec<Operation>,
}

impl OperationTableBuilder {
    /// Declare an operation and its handler
    #[must_use]
    pub fn operation<F, Fut>(mut self, spec: OperationSpec, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationOutput> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |params| handler(params).boxed());
        self.operations.push(Operation { spec, handler });
        self
    }

    /// Validate declarations and freeze the table
    ///
    /// # Errors
    ///
    /// Returns `Error::Capability` for invalid or duplicate operation names
    /// and for required parameters declared after optional ones
    pub fn build(self) -> Result<OperationTable> {
        let mut index = HashMap::with_capacity(self.operations.len());

        for (i, operation) in self.operations.iter().enumerate() {
            operation.spec.check_declaration().map_err(Error::Capability)?;
            if index.insert(operation.spec.name.clone(), i).is_some() {
                return Err(Error::Capability(format!(
                    "duplicate operation `{}`",
                    operation.spec.name
                )));
            }
        }

        Ok(OperationTable {
            operations: self.operations,
            index,
        })
    }
}
