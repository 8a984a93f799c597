//! Shared test doubles

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use hearth::capability::{
    CapabilityError, CapabilityProvider, OperationOutput, OperationSpec, OperationTable,
    ParamKind,
};
use hearth::error::TranscriptionError;
use hearth::intent::Clock;
use hearth::llm::{LanguageModel, Turn};
use hearth::voice::{AudioClip, SpeechInput, SpeechOutput};
use hearth::{Error, Result};

/// Ordered record of side effects (dispatched operations and spoken answers)
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Language model replaying canned replies, recording each request
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Arc<Mutex<Vec<Vec<Turn>>>>,
    latency: Duration,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item = Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Arc::default(),
            latency: Duration::ZERO,
        }
    }

    /// Answer each request only after `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Handle on every turn list sent to the model
    pub fn requests(&self) -> Arc<Mutex<Vec<Vec<Turn>>>> {
        Arc::clone(&self.requests)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, turns: &[Turn]) -> Result<String> {
        self.requests.lock().unwrap().push(turns.to_vec());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::LanguageModel("no scripted reply left".to_string())))
    }
}

/// A reply in the wire format
pub fn reply(answer: &str, commands: Value) -> Result<String> {
    Ok(json!({ "answer": answer, "commands": commands }).to_string())
}

/// Lighting provider that records every call in `log`
pub struct RecordingProvider {
    name: String,
    ops: OperationTable,
    config: Value,
}

impl RecordingProvider {
    pub fn lighting(log: &EventLog) -> Arc<dyn CapabilityProvider> {
        let record = |operation: &'static str, log: &EventLog| {
            let log = Arc::clone(log);
            move |params: Vec<Value>| {
                let log = Arc::clone(&log);
                async move {
                    log.lock()
                        .unwrap()
                        .push(format!("lighting.{operation} {}", Value::Array(params)));
                    let output: OperationOutput = Ok(None);
                    output
                }
            }
        };

        let ops = OperationTable::builder()
            .operation(
                OperationSpec::new("turn_on_lights", "Turn lights on")
                    .param("lights_indexes", ParamKind::IntegerList),
                record("turn_on_lights", log),
            )
            .operation(
                OperationSpec::new("turn_off_lights", "Turn lights off")
                    .param("lights_indexes", ParamKind::IntegerList),
                record("turn_off_lights", log),
            )
            .operation(
                OperationSpec::new("set_lights_brightness", "Set brightness (0-254)")
                    .param("lights_indexes", ParamKind::IntegerList)
                    .param("brightness", ParamKind::Integer),
                record("set_lights_brightness", log),
            )
            .operation(OperationSpec::new("get_lights", "Bridge is down"), |_| async {
                Err(CapabilityError::Unreachable("bridge offline".to_string()))
            })
            .build()
            .unwrap();

        Arc::new(Self {
            name: "lighting".to_string(),
            ops,
            config: json!({ "rooms": { "salon": [3] } }),
        })
    }
}

impl CapabilityProvider for RecordingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Controls the house lights"
    }

    fn operations(&self) -> &OperationTable {
        &self.ops
    }

    fn configuration(&self) -> &Value {
        &self.config
    }
}

/// Speech input yielding one scripted transcript per `hear`
///
/// Once the script is exhausted every call fails with `Error::Audio`.
pub struct ScriptedInput {
    transcripts: VecDeque<Result<String>>,
}

impl ScriptedInput {
    pub fn new<S: Into<String>>(transcripts: impl IntoIterator<Item = S>) -> Self {
        Self {
            transcripts: transcripts.into_iter().map(|t| Ok(t.into())).collect(),
        }
    }

    pub fn push_transcript(&mut self, text: impl Into<String>) {
        self.transcripts.push_back(Ok(text.into()));
    }

    pub fn push_error(&mut self, error: TranscriptionError) {
        self.transcripts.push_back(Err(error.into()));
    }
}

#[async_trait(?Send)]
impl SpeechInput for ScriptedInput {
    async fn listen(&mut self, _timeout: Duration, _limit: Duration) -> Result<AudioClip> {
        Ok(AudioClip::default())
    }

    async fn transcribe(&self, _audio: &AudioClip, _language: &str) -> Result<String> {
        Err(TranscriptionError::Unintelligible.into())
    }

    async fn hear(&mut self, _timeout: Duration, _limit: Duration, _language: &str) -> Result<String> {
        self.transcripts
            .pop_front()
            .unwrap_or_else(|| Err(Error::Audio("script exhausted".to_string())))
    }
}

/// Speech output appending `say <text>` to the event log
pub struct RecordingOutput(pub EventLog);

#[async_trait(?Send)]
impl SpeechOutput for RecordingOutput {
    async fn say(&self, text: &str) -> Result<()> {
        self.0.lock().unwrap().push(format!("say {text}"));
        Ok(())
    }
}

/// Clock moved by hand
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(now)))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}
