// ABOUTME: Platform-agnostic session and credential lifecycle for chat bots
// ABOUTME: Provides token renewal, channel tracking, chat session control and speech synthesis

pub mod backoff;
pub mod channels;
pub mod config;
pub mod credentials;
pub mod paths;
pub mod session;
pub mod speech;
pub mod traits;

// Re-export core types for convenient access
pub use channels::ChannelSet;
pub use credentials::{CredentialManager, Credentials, RefreshCredentials, RenewalOutcome, RenewalTask};
pub use session::{ActionId, ActionOutcome, ChatAction, ChatSession, SessionState};
pub use speech::{SpeechSynthesizer, SynthesisArtifact, TtsFlag};
pub use traits::{ChatEvent, ChatMessage, ChatTransport, SpeechBackend, SpeechRequest};
