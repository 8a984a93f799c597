//! Hearth - Voice-driven home automation assistant
//!
//! This library provides the core of the Hearth assistant:
//! - Activation detection (keyword spotting, with a name-matching fallback)
//! - Intent interpretation through a chat language model
//! - Capability dispatch to home devices (Hue lights, Home Assistant scripts)
//! - Voice I/O (capture, STT, TTS, playback)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Orchestrator                       │
//! │  activation → utterance → intent → dispatch → say   │
//! └──────┬──────────────┬───────────────┬───────────────┘
//!        │              │               │
//! ┌──────▼──────┐ ┌─────▼──────┐ ┌──────▼──────────────┐
//! │ Activation  │ │  Intent    │ │  Dispatcher         │
//! │ keyword /   │ │  session   │ │  registry of        │
//! │ phrase      │ │  + LLM     │ │  capability         │
//! └──────┬──────┘ └────────────┘ │  providers          │
//!        │                       └─────────────────────┘
//! ┌──────▼──────────────────────────────────────────────┐
//! │            Voice (cpal, STT, TTS)                    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod activation;
pub mod capabilities;
pub mod capability;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod intent;
pub mod llm;
pub mod orchestrator;
pub mod voice;

pub use config::Config;
pub use dispatch::{CapabilityRegistry, DispatchReport, Dispatcher};
pub use error::{Error, Result};
pub use intent::{Command, IntentResponse, IntentSession};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
