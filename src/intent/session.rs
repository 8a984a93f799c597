//! Intent session with time-bounded conversation reuse

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::prompt::Instructions;
use super::response::{IntentResponse, parse_intent};
use crate::llm::{LanguageModel, Turn};
use crate::{Error, Result};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One conversation: the system instructions plus the turns exchanged since
#[derive(Debug, Clone)]
pub struct ConversationSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    turns: Vec<Turn>,
    base_len: usize,
}

impl ConversationSession {
    fn new(base: &[Turn], created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at,
            turns: base.to_vec(),
            base_len: base.len(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Full history, system instructions first
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Whether the session is older than `ttl` at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.created_at > ttl
    }

    fn reset(&mut self) {
        self.turns.truncate(self.base_len);
    }
}

/// Turns utterances into intent responses, keeping conversational context
///
/// The session is exclusively borrowed for the whole of [`interpret`], so a
/// history can never see two interpretations in flight.
///
/// [`interpret`]: IntentSession::interpret
pub struct IntentSession<M> {
    model: M,
    instructions: Vec<Turn>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    session: Option<ConversationSession>,
}

impl<M: LanguageModel> IntentSession<M> {
    /// Create a session primed with `instructions`, using the wall clock
    ///
    /// # Errors
    ///
    /// Returns `Error::Priming` if the instructions cannot be rendered
    pub fn new(model: M, instructions: &Instructions, ttl: chrono::Duration) -> Result<Self> {
        Self::with_clock(model, instructions, ttl, Arc::new(SystemClock))
    }

    /// Create a session reading time from `clock`
    ///
    /// # Errors
    ///
    /// Returns `Error::Priming` if the instructions cannot be rendered
    pub fn with_clock(
        model: M,
        instructions: &Instructions,
        ttl: chrono::Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let rendered = instructions.render()?;
        tracing::info!(
            capabilities = ?instructions.capability_names().collect::<Vec<_>>(),
            system_turns = rendered.len(),
            ttl_hours = ttl.num_hours(),
            "intent session primed"
        );

        Ok(Self {
            model,
            instructions: rendered,
            clock,
            ttl,
            session: None,
        })
    }

    /// Interpret one utterance
    ///
    /// Starts a new conversation if there is none or the current one has
    /// expired. On success the user turn and the sanitized reply are kept in
    /// the history; on failure, or if the future is dropped before the reply
    /// arrives, the history is left as it was.
    ///
    /// # Errors
    ///
    /// Returns `Error::LanguageModel` if the service fails and
    /// `Error::Interpretation` if the reply is not a valid intent response
    pub async fn interpret(&mut self, utterance: &str) -> Result<IntentResponse> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(Error::Interpretation("empty utterance".to_string()));
        }

        let now = self.clock.now();
        let ttl = self.ttl;
        let expired = self
            .session
            .as_ref()
            .is_none_or(|s| s.is_expired(now, ttl));

        if expired && let Some(old) = self.session.take() {
            tracing::info!(session = %old.id, created_at = %old.created_at, "conversation expired");
        }

        let instructions = &self.instructions;
        let session = self.session.get_or_insert_with(|| {
            let session = ConversationSession::new(instructions, now);
            tracing::debug!(session = %session.id, "conversation started");
            session
        });

        let mut request = Vec::with_capacity(session.turns.len() + 1);
        request.extend_from_slice(&session.turns);
        request.push(Turn::user(utterance));

        let raw = self.model.complete(&request).await?;
        let response = parse_intent(&raw)?;
        let reply = serde_json::to_string(&response)?;

        session.turns.push(Turn::user(utterance));
        session.turns.push(Turn::assistant(reply));
        tracing::debug!(
            session = %session.id,
            history = session.turns.len(),
            commands = response.commands.len(),
            "utterance interpreted"
        );
        Ok(response)
    }

    /// Forget every exchanged turn, keeping only the system instructions
    pub fn reset_conversation(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.reset();
            tracing::info!(session = %session.id, "conversation reset");
        }
    }

    /// Current conversation, if one has started
    #[must_use]
    pub const fn session(&self) -> Option<&ConversationSession> {
        self.session.as_ref()
    }

    /// Number of turns in the current conversation
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.turns.len())
    }

    /// System turns every conversation starts with
    #[must_use]
    pub fn instructions(&self) -> &[Turn] {
        &self.instructions
    }
}
