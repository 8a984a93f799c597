//! Intent interpretation
//!
//! An [`IntentSession`] turns one utterance into an [`IntentResponse`]:
//! `{answer, commands}`. The session owns the conversation history and its
//! expiry policy; the model only ever sees the system instructions built by
//! [`Instructions`] plus the turns of the current conversation.

mod prompt;
mod response;
mod session;

pub use prompt::{DEFAULT_PERSONA, Instructions};
pub use response::{Command, IntentResponse, parse_intent, strip_code_fence};
pub use session::{Clock, ConversationSession, IntentSession, SystemClock};
