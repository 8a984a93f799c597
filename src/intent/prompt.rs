//! System instructions for the intent session

use std::fmt::Write as _;

use crate::capability::CapabilityPriming;
use crate::llm::Turn;
use crate::{Error, Result};

/// Default answer style when no persona is configured
pub const DEFAULT_PERSONA: &str =
    "Answer respectfully and naturally, in the manner of a discreet butler.";

/// Builder for the fixed part of every conversation
#[derive(Debug, Clone)]
pub struct Instructions {
    assistant_name: String,
    language: String,
    persona: Option<String>,
    primings: Vec<CapabilityPriming>,
}

impl Instructions {
    pub fn new(assistant_name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            assistant_name: assistant_name.into(),
            language: language.into(),
            persona: None,
            primings: Vec::new(),
        }
    }

    /// Override the answer style
    #[must_use]
    pub fn with_persona(mut self, persona: Option<String>) -> Self {
        self.persona = persona;
        self
    }

    /// Add one enabled capability
    #[must_use]
    pub fn with_capability(mut self, priming: CapabilityPriming) -> Self {
        self.primings.push(priming);
        self
    }

    /// Add every enabled capability
    #[must_use]
    pub fn with_capabilities(mut self, primings: impl IntoIterator<Item = CapabilityPriming>) -> Self {
        self.primings.extend(primings);
        self
    }

    /// Names of the capabilities the model is told about
    pub fn capability_names(&self) -> impl Iterator<Item = &str> {
        self.primings.iter().map(|p| p.doc.name.as_str())
    }

    /// Render the system turns that open every session
    ///
    /// The base rules come first, then two fragments per capability: its
    /// configuration data and its operation documentation.
    ///
    /// # Errors
    ///
    /// Returns `Error::Priming` if a fragment cannot be serialized
    pub fn render(&self) -> Result<Vec<Turn>> {
        let mut turns = Vec::with_capacity(1 + 2 * self.primings.len());
        turns.push(Turn::system(self.base_rules()));

        for priming in &self.primings {
            let name = &priming.doc.name;
            let configuration = serde_json::to_string_pretty(&priming.configuration)
                .map_err(|e| Error::Priming(format!("{name} configuration: {e}")))?;
            let doc = serde_json::to_string_pretty(&priming.doc)
                .map_err(|e| Error::Priming(format!("{name} documentation: {e}")))?;

            turns.push(Turn::system(format!(
                "Configuration of the `{name}` manager. Use it to find the rooms, \
                 devices and identifiers it knows about.\n{configuration}"
            )));
            turns.push(Turn::system(format!(
                "Operations offered by the `{name}` manager. Every documented \
                 operation can be used as a command_name for manager_name \
                 \"{name}\".\n{doc}"
            )));
        }

        Ok(turns)
    }

    fn base_rules(&self) -> String {
        let persona = self.persona.as_deref().unwrap_or(DEFAULT_PERSONA);
        let mut rules = String::new();

        let _ = writeln!(
            rules,
            "You are {}, a voice assistant controlling a home. You receive one \
             transcribed sentence and must recognize the commands it asks for.",
            self.assistant_name
        );
        rules.push_str(
            "You are given every available manager with its configuration and the \
             documentation of its operations.\n",
        );
        rules.push_str(
            "Reply with exactly one JSON object and no other text: \
             {\"answer\": ANSWER, \"commands\": [{\"manager_name\": MANAGER_NAME, \
             \"command_name\": COMMAND_NAME, \"params\": [PARAM_1, PARAM_2, ...]}]}\n",
        );
        rules.push_str(
            "params is always a list, possibly empty. A parameter that is itself a \
             list stays nested inside params.\n",
        );
        rules.push_str("Identifiers are integers, never strings.\n");
        rules.push_str("Issue only the minimum set of commands the request needs.\n");
        rules.push_str(
            "If nothing matches, reply {\"answer\": APOLOGY, \"commands\": []}.\n",
        );
        let _ = write!(
            rules,
            "ANSWER is a short confirmation spoken back to the user in {}. {persona}",
            self.language
        );

        rules
    }
}
