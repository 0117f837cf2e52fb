// ABOUTME: Capability traits for the external chat transport and speech API
// ABOUTME: Defines ChatTransport, SpeechBackend and the events a transport emits

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::broadcast;

// =============================================================================
// Chat Events
// =============================================================================

/// A chat line received from the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Channel name without the leading '#'
    pub channel: String,
    /// Login name of the sender
    pub sender: String,
    /// Display name, when the network supplies one
    pub display_name: Option<String>,
    /// Message body
    pub text: String,
    /// Raw message tags (badges, color, user-id, ...)
    pub tags: HashMap<String, String>,
    /// Sent as a `/me` action
    pub is_action: bool,
    /// Sent by this bot's own account
    pub is_self: bool,
}

impl ChatMessage {
    pub fn new(channel: impl Into<String>, sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            sender: sender.into(),
            display_name: None,
            text: text.into(),
            tags: HashMap::new(),
            is_action: false,
            is_self: false,
        }
    }
}

/// Events emitted by a chat transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Inbound chat message
    Message(ChatMessage),
    /// Login completed (initially or after a transport reconnect)
    Connected { address: String },
    /// Connection closed, requested or not
    Disconnected { reason: String },
}

// =============================================================================
// Chat Transport
// =============================================================================

/// Connection and messaging primitives of a chat network client.
///
/// Every operation resolves once the network action is accepted or rejected.
/// Implementations own their own reconnect policy and report it through
/// `ChatEvent::Connected` / `ChatEvent::Disconnected`.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open the connection and log in
    async fn connect(&self) -> Result<()>;

    /// Close the connection
    async fn disconnect(&self) -> Result<()>;

    /// Join a channel (name without '#')
    async fn join(&self, channel: &str) -> Result<()>;

    async fn say(&self, channel: &str, text: &str) -> Result<()>;

    async fn whisper(&self, user: &str, text: &str) -> Result<()>;

    async fn ban(&self, channel: &str, user: &str, reason: Option<&str>) -> Result<()>;

    async fn unban(&self, channel: &str, user: &str) -> Result<()>;

    /// Clear the chat history of a channel
    async fn clear(&self, channel: &str) -> Result<()>;

    /// Change the bot's name color
    async fn color(&self, channel: &str, color: &str) -> Result<()>;

    /// Run a commercial break of the given length
    async fn commercial(&self, channel: &str, seconds: u32) -> Result<()>;

    /// Subscribe to inbound events. Each call returns an independent receiver.
    fn events(&self) -> broadcast::Receiver<ChatEvent>;
}

// =============================================================================
// Speech Backend
// =============================================================================

/// Parameters for one text-to-speech request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub model: String,
    pub voice: String,
    /// Audio container requested from the API (e.g., "mp3")
    pub format: String,
    pub input: String,
}

/// Hosted speech model that turns text into an encoded audio payload
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>>;
}
