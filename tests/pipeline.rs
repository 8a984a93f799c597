//! End-to-end tests of the utterance pipeline
//!
//! Everything outside the process (model service, devices, audio) is replaced
//! by the doubles in `common`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use tokio_test::assert_ok;

use hearth::activation::{ActivationDetector, NameMatcher, PhraseStrategy, Strategy};
use hearth::capability::CapabilityPriming;
use hearth::dispatch::DispatchError;
use hearth::error::TranscriptionError;
use hearth::intent::{Instructions, parse_intent};
use hearth::llm::Role;
use hearth::{
    CapabilityRegistry, Dispatcher, Error, IntentSession, Orchestrator, OrchestratorSettings,
};

mod common;
use common::{
    EventLog, ManualClock, RecordingOutput, RecordingProvider, ScriptedInput, ScriptedModel,
    events, reply,
};

fn settings(name: &str) -> OrchestratorSettings {
    OrchestratorSettings {
        assistant_name: name.to_string(),
        language: "fr-FR".to_string(),
        listen_timeout: Duration::from_secs(5),
        phrase_time_limit: Duration::from_secs(10),
        max_retries: 0,
    }
}

fn build(model: ScriptedModel, log: &EventLog) -> Orchestrator<ScriptedModel> {
    let registry = CapabilityRegistry::builder()
        .register(RecordingProvider::lighting(log))
        .build()
        .unwrap();
    let instructions = Instructions::new("Jarvis", "fr-FR").with_capabilities(
        registry
            .iter()
            .map(|p| CapabilityPriming::from_provider(p.as_ref())),
    );
    let session = IntentSession::new(model, &instructions, chrono::Duration::hours(24)).unwrap();
    Orchestrator::new(session, Dispatcher::new(Arc::new(registry)), settings("Jarvis")).unwrap()
}

fn phrase_detector(name: &str) -> ActivationDetector {
    ActivationDetector::new(Strategy::Phrase(PhraseStrategy::new(
        NameMatcher::new(name).unwrap(),
        "fr-FR",
        Duration::from_secs(5),
        Duration::from_secs(3),
    )))
}

#[tokio::test]
async fn lamp_request_dispatches_once_then_speaks() {
    let log = EventLog::default();
    let model = ScriptedModel::new([reply(
        "D'accord.",
        json!([{ "manager_name": "lighting", "command_name": "turn_off_lights", "params": [[3]] }]),
    )]);
    let mut orchestrator = build(model, &log);

    let handled = assert_ok!(
        orchestrator
            .handle_utterance("Jarvis, éteins la lampe du salon", &RecordingOutput(Arc::clone(&log)))
            .await
    );

    assert_eq!(handled.response.answer, "D'accord.");
    assert_eq!(
        events(&log),
        vec!["lighting.turn_off_lights [[3]]", "say D'accord."]
    );
}

#[tokio::test]
async fn commands_run_in_reply_order() {
    let log = EventLog::default();
    let model = ScriptedModel::new([reply(
        "C'est fait.",
        json!([
            { "manager_name": "lighting", "command_name": "turn_on_lights", "params": [[1, 2]] },
            { "manager_name": "lighting", "command_name": "set_lights_brightness", "params": [[1, 2], 100] },
            { "manager_name": "lighting", "command_name": "turn_off_lights", "params": [[3]] },
        ]),
    )]);
    let mut orchestrator = build(model, &log);

    let handled = orchestrator
        .handle_utterance("ambiance lecture", &RecordingOutput(Arc::clone(&log)))
        .await
        .unwrap();

    assert_eq!(handled.report.len(), 3);
    assert!(handled.report.all_succeeded());
    assert_eq!(
        events(&log),
        vec![
            "lighting.turn_on_lights [[1,2]]",
            "lighting.set_lights_brightness [[1,2],100]",
            "lighting.turn_off_lights [[3]]",
            "say C'est fait.",
        ]
    );
}

#[tokio::test]
async fn failing_commands_do_not_abort_the_batch() {
    let log = EventLog::default();
    let model = ScriptedModel::new([reply(
        "Je m'en occupe.",
        json!([
            { "manager_name": "vacuum", "command_name": "start", "params": [] },
            { "manager_name": "lighting", "command_name": "get_lights", "params": [] },
            { "manager_name": "lighting", "command_name": "turn_on_lights", "params": ["three"] },
            { "manager_name": "lighting", "command_name": "turn_on_lights", "params": [[4]] },
        ]),
    )]);
    let mut orchestrator = build(model, &log);

    let handled = assert_ok!(
        orchestrator
            .handle_utterance("range et allume", &RecordingOutput(Arc::clone(&log)))
            .await
    );

    let failures: Vec<_> = handled.report.failures().map(|(_, e)| e).collect();
    assert_eq!(failures.len(), 3);
    assert!(matches!(failures[0], DispatchError::UnknownTarget { .. }));
    assert!(matches!(failures[1], DispatchError::Provider { .. }));
    assert!(matches!(failures[2], DispatchError::ParamMismatch { .. }));
    assert_eq!(
        events(&log),
        vec!["lighting.turn_on_lights [[4]]", "say Je m'en occupe."]
    );
}

#[tokio::test]
async fn empty_command_list_still_answers() {
    let log = EventLog::default();
    let model = ScriptedModel::new([reply("Désolé, je ne peux pas faire ça.", json!([]))]);
    let mut orchestrator = build(model, &log);

    let handled = orchestrator
        .handle_utterance("fais-moi un café", &RecordingOutput(Arc::clone(&log)))
        .await
        .unwrap();

    assert!(handled.report.is_empty());
    assert_eq!(events(&log), vec!["say Désolé, je ne peux pas faire ça."]);
}

#[tokio::test]
async fn conversation_is_reused_within_a_day_and_renewed_after() {
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
    let clock = ManualClock::starting_at(start);
    let model = ScriptedModel::new([
        reply("Bonjour.", json!([])),
        reply("Toujours là.", json!([])),
        reply("Nouvelle journée.", json!([])),
    ]);
    let requests = model.requests();

    let mut session = IntentSession::with_clock(
        model,
        &Instructions::new("Jarvis", "fr-FR"),
        chrono::Duration::hours(24),
        clock.clone(),
    )
    .unwrap();
    let base = session.instructions().len();

    session.interpret("bonjour").await.unwrap();
    let first = session.session().unwrap().id();

    clock.set(start + chrono::Duration::hours(23));
    session.interpret("tu es là ?").await.unwrap();
    assert_eq!(session.session().unwrap().id(), first);

    clock.set(start + chrono::Duration::hours(25));
    session.interpret("bonjour encore").await.unwrap();
    assert_ne!(session.session().unwrap().id(), first);

    let requests = requests.lock().unwrap();
    assert_eq!(requests[0].len(), base + 1);
    assert_eq!(requests[1].len(), base + 3);
    assert_eq!(requests[2].len(), base + 1);
    assert_eq!(requests[2].last().unwrap().content, "bonjour encore");
}

#[tokio::test]
async fn failed_turn_leaves_history_untouched() {
    let model = ScriptedModel::new([
        reply("Bonjour.", json!([])),
        Ok("Sure, turning it off now!".to_string()),
        Err(Error::LanguageModel("HTTP 503".to_string())),
    ]);
    let mut session = IntentSession::new(
        model,
        &Instructions::new("Jarvis", "fr-FR"),
        chrono::Duration::hours(24),
    )
    .unwrap();

    session.interpret("bonjour").await.unwrap();
    let before = session.history_len();

    assert!(matches!(
        session.interpret("éteins").await,
        Err(Error::Interpretation(_))
    ));
    assert!(matches!(
        session.interpret("éteins").await,
        Err(Error::LanguageModel(_))
    ));
    assert_eq!(session.history_len(), before);

    let turns = session.session().unwrap().turns();
    assert_eq!(turns[before - 1].role, Role::Assistant);
}

#[tokio::test]
async fn reset_is_idempotent() {
    let model = ScriptedModel::new([reply("Un.", json!([])), reply("Deux.", json!([]))]);
    let mut session = IntentSession::new(
        model,
        &Instructions::new("Jarvis", "fr-FR"),
        chrono::Duration::hours(24),
    )
    .unwrap();
    let base = session.instructions().len();

    session.reset_conversation();
    assert_eq!(session.history_len(), 0);

    session.interpret("un").await.unwrap();
    session.interpret("deux").await.unwrap();
    session.reset_conversation();
    let once = session.session().unwrap().turns().to_vec();
    session.reset_conversation();

    assert_eq!(once.len(), base);
    assert_eq!(session.session().unwrap().turns(), once.as_slice());
}

#[tokio::test]
async fn fallback_activation_extracts_the_command() {
    let mut detector = phrase_detector("Assistant");

    let mut input = ScriptedInput::new(["Assistant turn on the lights"]);
    let activation = detector.wait_for_activation(&mut input).await.unwrap();
    assert_eq!(activation.command_text.as_deref(), Some("turn on the lights"));

    let mut input = ScriptedInput::new(["Assistant"]);
    let activation = detector.wait_for_activation(&mut input).await.unwrap();
    assert_eq!(activation.command_text, None);
}

#[tokio::test]
async fn fallback_activation_skips_unrelated_and_failed_rounds() {
    let mut detector = phrase_detector("Jarvis");
    let mut input = ScriptedInput::new(["what a nice day"]);
    input.push_error(TranscriptionError::NoSpeech);
    input.push_error(TranscriptionError::Unintelligible);
    input.push_error(TranscriptionError::Unreachable("timeout".to_string()));
    input.push_transcript("JARVIS, dim the lights");

    let activation = detector.wait_for_activation(&mut input).await.unwrap();
    assert_eq!(activation.command_text.as_deref(), Some("dim the lights"));
}

#[tokio::test]
async fn audio_failure_ends_fallback_activation() {
    let mut detector = phrase_detector("Jarvis");
    let mut input = ScriptedInput::new(["hello"]);

    assert!(matches!(
        detector.wait_for_activation(&mut input).await,
        Err(Error::Audio(_))
    ));
}

#[tokio::test]
async fn voice_turn_from_name_to_answer() {
    let log = EventLog::default();
    let model = ScriptedModel::new([reply(
        "D'accord.",
        json!([{ "manager_name": "lighting", "command_name": "turn_off_lights", "params": [[3]] }]),
    )]);
    let requests = model.requests();
    let mut orchestrator = build(model, &log);
    let mut detector = phrase_detector("Jarvis");
    let mut input = ScriptedInput::new(["Jarvis", "éteins la lampe du salon"]);

    let text = orchestrator
        .next_utterance(&mut detector, &mut input)
        .await
        .unwrap()
        .unwrap();
    orchestrator
        .handle_utterance(&text, &RecordingOutput(Arc::clone(&log)))
        .await
        .unwrap();

    assert_eq!(
        events(&log),
        vec!["lighting.turn_off_lights [[3]]", "say D'accord."]
    );
    let requests = requests.lock().unwrap();
    assert_eq!(
        requests[0].last().unwrap().content,
        "éteins la lampe du salon"
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_interpretation_keeps_history_consistent() {
    let log = EventLog::default();
    let model = ScriptedModel::new([reply("D'accord.", json!([]))])
        .with_latency(Duration::from_secs(60));
    let requests = model.requests();
    let mut orchestrator = build(model, &log);
    let base = orchestrator.session().instructions().len();
    let mut input = ScriptedInput::new(["Jarvis allume la lampe"]);

    orchestrator
        .run_continuous(
            &mut phrase_detector("Jarvis"),
            &mut input,
            &RecordingOutput(Arc::clone(&log)),
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await
        .unwrap();

    assert_eq!(orchestrator.session().history_len(), base);
    assert!(events(&log).is_empty());

    let handled = orchestrator
        .handle_utterance("éteins la lampe", &RecordingOutput(Arc::clone(&log)))
        .await
        .unwrap();
    assert_eq!(handled.response.answer, "D'accord.");

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].len(), base + 1);
    assert_eq!(requests[1].last().unwrap().content, "éteins la lampe");
}

#[test]
fn fenced_and_bare_replies_parse_the_same() {
    let bare = r#"{"answer":"OK","commands":[{"manager_name":"lighting","command_name":"turn_on_lights","params":[[1]]}]}"#;
    let expected = parse_intent(bare).unwrap();

    for wrapped in [
        format!("```json\n{bare}\n```"),
        format!("```\n{bare}\n```"),
        format!("  ```json{bare}```  "),
        format!("```json\n{bare}"),
        format!("{bare}\n```"),
    ] {
        assert_eq!(parse_intent(&wrapped).unwrap(), expected, "{wrapped}");
    }
}
