//! Main control loop
//!
//! Waits for activation, obtains the utterance, interprets it, dispatches the
//! resulting commands in order and speaks the answer. One utterance is fully
//! handled before the next is listened for. Errors from activation,
//! transcription and interpretation end only the current iteration.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::activation::{ActivationDetector, NameMatch, NameMatcher};
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::intent::{IntentResponse, IntentSession};
use crate::llm::LanguageModel;
use crate::voice::{SpeechInput, SpeechOutput};
use crate::{Error, Result};

/// Pause after a failed iteration so a broken device cannot spin the loop
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Loop settings
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Name the assistant answers to
    pub assistant_name: String,
    /// Transcription language
    pub language: String,
    /// Wait for the follow-up command to start
    pub listen_timeout: Duration,
    /// Follow-up command length cap
    pub phrase_time_limit: Duration,
    /// Whole-turn retries after a language model service failure
    pub max_retries: u32,
}

impl OrchestratorSettings {
    #[must_use]
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            assistant_name: config.assistant_name.clone(),
            language: config.language.clone(),
            listen_timeout: config.voice.listen_timeout,
            phrase_time_limit: config.voice.phrase_time_limit,
            max_retries: config.llm.max_retries,
        }
    }
}

/// Everything that happened for one utterance
#[derive(Debug)]
pub struct HandledUtterance {
    pub response: IntentResponse,
    pub report: DispatchReport,
}

/// Ties activation, interpretation, dispatch and speech together
pub struct Orchestrator<M> {
    session: IntentSession<M>,
    dispatcher: Dispatcher,
    matcher: NameMatcher,
    settings: OrchestratorSettings,
}

impl<M: LanguageModel> Orchestrator<M> {
    /// Create an orchestrator over a primed session
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the assistant name is empty
    pub fn new(
        session: IntentSession<M>,
        dispatcher: Dispatcher,
        settings: OrchestratorSettings,
    ) -> Result<Self> {
        Ok(Self {
            matcher: NameMatcher::new(&settings.assistant_name)?,
            session,
            dispatcher,
            settings,
        })
    }

    /// Intent session, for inspection
    #[must_use]
    pub const fn session(&self) -> &IntentSession<M> {
        &self.session
    }

    /// Forget the conversation so far
    pub fn reset_conversation(&mut self) {
        self.session.reset_conversation();
    }

    /// Interpret one utterance, dispatch its commands, then speak the answer
    ///
    /// Failed commands are reported but never stop the answer from being
    /// spoken; a failure to speak is logged.
    ///
    /// # Errors
    ///
    /// Returns `Error::Interpretation` for malformed model output and
    /// `Error::LanguageModel` once retries are exhausted
    #[allow(clippy::future_not_send)]
    pub async fn handle_utterance(
        &mut self,
        text: &str,
        output: &dyn SpeechOutput,
    ) -> Result<HandledUtterance> {
        let response = self.interpret(text).await?;

        let report = if response.commands.is_empty() {
            DispatchReport::default()
        } else {
            tracing::info!(commands = response.commands.len(), "dispatching commands");
            self.dispatcher.handle_request(&response.commands).await
        };

        if !report.all_succeeded() {
            tracing::warn!(
                failed = report.len() - report.succeeded(),
                total = report.len(),
                "some commands did not take effect"
            );
        }

        if let Err(e) = output.say(&response.answer).await {
            tracing::error!(error = %e, "failed to speak answer");
        }

        Ok(HandledUtterance { response, report })
    }

    async fn interpret(&mut self, text: &str) -> Result<IntentResponse> {
        let mut attempt = 0;
        loop {
            match self.session.interpret(text).await {
                Err(Error::LanguageModel(e)) if attempt < self.settings.max_retries => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "language model failed, retrying turn");
                }
                other => return other,
            }
        }
    }

    /// Wait for activation and return the utterance to interpret
    ///
    /// A command delivered with the activation is re-prefixed with the name
    /// and kept only if something actionable remains besides the name. After
    /// a bare cue, the follow-up recording is accepted if it is not blank.
    /// Returns `None` when the utterance is discarded.
    ///
    /// # Errors
    ///
    /// Returns error if activation or the follow-up recording fails
    #[allow(clippy::future_not_send)]
    pub async fn next_utterance(
        &mut self,
        detector: &mut ActivationDetector,
        input: &mut dyn SpeechInput,
    ) -> Result<Option<String>> {
        let activation = detector.wait_for_activation(input).await?;
        let follow_up = activation.requires_follow_up();

        let heard = match activation.command_text {
            Some(command) => Ok(self.addressed(&command)),
            None => {
                input
                    .hear(
                        self.settings.listen_timeout,
                        self.settings.phrase_time_limit,
                        &self.settings.language,
                    )
                    .await
                    .map(|text| (!text.trim().is_empty()).then_some(text))
            }
        };
        detector.acknowledge();

        let text = heard?;
        if text.is_none() {
            tracing::debug!(follow_up, "utterance discarded before interpretation");
        }
        Ok(text)
    }

    /// `command` addressed to the assistant by name, if anything is left to
    /// act on once the name and separators are set aside
    fn addressed(&self, command: &str) -> Option<String> {
        let text = format!("{} {command}", self.matcher.name());
        matches!(self.matcher.strip(&text), NameMatch::WithCommand(_)).then_some(text)
    }

    /// Continuous voice mode, until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns only non-transient errors; everything else is logged and the
    /// loop resumes listening
    #[allow(clippy::future_not_send)]
    pub async fn run_continuous<F>(
        &mut self,
        detector: &mut ActivationDetector,
        input: &mut dyn SpeechInput,
        output: &dyn SpeechOutput,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(name = self.matcher.name(), "listening");

        loop {
            let outcome = tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    return Ok(());
                }
                outcome = self.voice_iteration(detector, input, output) => outcome,
            };

            if let Err(e) = outcome {
                recover(e).await?;
            }
        }
    }

    #[allow(clippy::future_not_send)]
    async fn voice_iteration(
        &mut self,
        detector: &mut ActivationDetector,
        input: &mut dyn SpeechInput,
        output: &dyn SpeechOutput,
    ) -> Result<()> {
        let Some(text) = self.next_utterance(detector, input).await? else {
            return Ok(());
        };
        tracing::info!(utterance = %text, "utterance received");
        self.handle_utterance(&text, output).await.map(|_| ())
    }

    /// Interactive text mode: one utterance per line, until EOF or `shutdown`
    ///
    /// No activation and no name check; handling is otherwise identical.
    ///
    /// # Errors
    ///
    /// Returns error if reading the input fails or a non-transient error occurs
    #[allow(clippy::future_not_send)]
    pub async fn run_interactive<R, F>(
        &mut self,
        lines: R,
        output: &dyn SpeechOutput,
        shutdown: F,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut lines = lines.lines();

        loop {
            let line = tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    return Ok(());
                }
                line = lines.next_line() => line?,
            };

            let Some(line) = line else {
                tracing::info!("end of input");
                return Ok(());
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Err(e) = self.handle_utterance(line, output).await {
                recover(e).await?;
            }
        }
    }
}

/// Decide whether an iteration error ends the loop
async fn recover(error: Error) -> Result<()> {
    match error {
        Error::Transcription(e) => {
            tracing::debug!(error = %e, "nothing usable heard");
            Ok(())
        }
        Error::Interpretation(e) => {
            tracing::warn!(error = %e, "turn dropped");
            Ok(())
        }
        e if e.is_transient() => {
            tracing::error!(error = %e, "iteration failed");
            tokio::time::sleep(ERROR_BACKOFF).await;
            Ok(())
        }
        e => Err(e),
    }
}
