// ABOUTME: Chat session lifecycle, inbound event hooks and fire-and-forget outbound actions
// ABOUTME: Tracks connection state from transport events and reports every action outcome

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::channels::{normalize_channel, ChannelSet};
use crate::traits::{ChatEvent, ChatMessage, ChatTransport};

/// Identifies one fire-and-forget action in the outcome stream
pub type ActionId = Uuid;

const OUTCOME_CAPACITY: usize = 256;

// =============================================================================
// Session State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Actions and Outcomes
// =============================================================================

/// A network action issued through the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    Connect,
    Disconnect,
    Join { channel: String },
    Say { channel: String, text: String },
    Whisper { user: String, text: String },
    Ban { channel: String, user: String, reason: Option<String> },
    Unban { channel: String, user: String },
    Clear { channel: String },
    Color { channel: String, color: String },
    Commercial { channel: String, seconds: u32 },
}

impl ChatAction {
    pub fn name(&self) -> &'static str {
        match self {
            ChatAction::Connect => "connect",
            ChatAction::Disconnect => "disconnect",
            ChatAction::Join { .. } => "join",
            ChatAction::Say { .. } => "say",
            ChatAction::Whisper { .. } => "whisper",
            ChatAction::Ban { .. } => "ban",
            ChatAction::Unban { .. } => "unban",
            ChatAction::Clear { .. } => "clear",
            ChatAction::Color { .. } => "color",
            ChatAction::Commercial { .. } => "commercial",
        }
    }
}

// Message bodies are left out so they don't end up in logs
impl fmt::Display for ChatAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatAction::Connect | ChatAction::Disconnect => f.write_str(self.name()),
            ChatAction::Join { channel }
            | ChatAction::Say { channel, .. }
            | ChatAction::Clear { channel }
            | ChatAction::Color { channel, .. }
            | ChatAction::Commercial { channel, .. } => write!(f, "{} #{}", self.name(), channel),
            ChatAction::Whisper { user, .. } => write!(f, "{} {}", self.name(), user),
            ChatAction::Ban { channel, user, .. } | ChatAction::Unban { channel, user } => {
                write!(f, "{} #{} {}", self.name(), channel, user)
            }
        }
    }
}

/// Completion report for a fire-and-forget action
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub id: ActionId,
    pub action: ChatAction,
    /// None when the transport accepted the action
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

async fn perform(transport: &dyn ChatTransport, action: &ChatAction) -> anyhow::Result<()> {
    match action {
        ChatAction::Connect => transport.connect().await,
        ChatAction::Disconnect => transport.disconnect().await,
        ChatAction::Join { channel } => transport.join(channel).await,
        ChatAction::Say { channel, text } => transport.say(channel, text).await,
        ChatAction::Whisper { user, text } => transport.whisper(user, text).await,
        ChatAction::Ban {
            channel,
            user,
            reason,
        } => transport.ban(channel, user, reason.as_deref()).await,
        ChatAction::Unban { channel, user } => transport.unban(channel, user).await,
        ChatAction::Clear { channel } => transport.clear(channel).await,
        ChatAction::Color { channel, color } => transport.color(channel, color).await,
        ChatAction::Commercial { channel, seconds } => {
            transport.commercial(channel, *seconds).await
        }
    }
}

/// Log the result of an action and publish it to outcome subscribers
fn report(
    outcomes: &broadcast::Sender<ActionOutcome>,
    id: ActionId,
    action: ChatAction,
    result: anyhow::Result<()>,
) {
    let error = match result {
        Ok(()) => {
            tracing::debug!(action_id = %id, action = %action, "Chat action completed");
            None
        }
        Err(e) => {
            let error = format!("{e:#}");
            tracing::error!(action_id = %id, action = %action, error = %error, "Chat action failed");
            Some(error)
        }
    };

    // No subscribers is the normal case
    let _ = outcomes.send(ActionOutcome {
        id,
        action,
        error,
        completed_at: Utc::now(),
    });
}

fn channel_arg(channel: &str) -> String {
    normalize_channel(channel).unwrap_or_else(|| channel.to_string())
}

// =============================================================================
// Chat Session
// =============================================================================

/// Wraps a chat transport with lifecycle control, event hooks and
/// uniformly shaped outbound actions.
///
/// Must be created inside a Tokio runtime: state tracking, hooks and
/// actions all run as spawned tasks.
pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    channels: Arc<ChannelSet>,
    state: Arc<watch::Sender<SessionState>>,
    outcomes: broadcast::Sender<ActionOutcome>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn ChatTransport>, channels: Arc<ChannelSet>) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let state = Arc::new(state);
        let (outcomes, _) = broadcast::channel(OUTCOME_CAPACITY);

        let tracker = spawn_state_tracker(transport.events(), Arc::clone(&state));

        Self {
            transport,
            channels,
            state,
            outcomes,
            tasks: Mutex::new(vec![tracker]),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions (e.g. to await Connected)
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Subscribe to the outcome of every action issued after this call
    pub fn outcomes(&self) -> broadcast::Receiver<ActionOutcome> {
        self.outcomes.subscribe()
    }

    pub fn channels(&self) -> Vec<String> {
        self.channels.names()
    }

    pub fn transport(&self) -> &Arc<dyn ChatTransport> {
        &self.transport
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Start connecting without waiting for the result.
    /// Returns None when the session is not disconnected.
    pub fn connect(&self) -> Option<ActionId> {
        let started = self.state.send_if_modified(|state| {
            if *state == SessionState::Disconnected {
                *state = SessionState::Connecting;
                true
            } else {
                false
            }
        });
        if !started {
            tracing::debug!(state = %self.state(), "Ignoring connect, session is not disconnected");
            return None;
        }

        let id = Uuid::new_v4();
        let transport = Arc::clone(&self.transport);
        let state = Arc::clone(&self.state);
        let outcomes = self.outcomes.clone();
        tokio::spawn(async move {
            let result = transport.connect().await;
            if result.is_err() {
                // A disconnect issued mid-login leaves the state at Disconnecting,
                // and its own revert would restore a Connecting that no longer exists
                state.send_if_modified(|s| match *s {
                    SessionState::Connecting | SessionState::Disconnecting => {
                        *s = SessionState::Disconnected;
                        true
                    }
                    _ => false,
                });
            }
            report(&outcomes, id, ChatAction::Connect, result);
        });
        Some(id)
    }

    /// Start disconnecting without waiting for the result.
    /// Returns None when there is no connection to close.
    pub fn disconnect(&self) -> Option<ActionId> {
        let mut previous = SessionState::Disconnected;
        let started = self.state.send_if_modified(|state| match *state {
            SessionState::Connected | SessionState::Connecting => {
                previous = *state;
                *state = SessionState::Disconnecting;
                true
            }
            _ => false,
        });
        if !started {
            tracing::debug!(state = %self.state(), "Ignoring disconnect, session is not connected");
            return None;
        }

        let id = Uuid::new_v4();
        let transport = Arc::clone(&self.transport);
        let state = Arc::clone(&self.state);
        let outcomes = self.outcomes.clone();
        tokio::spawn(async move {
            let result = transport.disconnect().await;
            if result.is_err() {
                state.send_if_modified(|s| revert(s, SessionState::Disconnecting, previous));
            }
            report(&outcomes, id, ChatAction::Disconnect, result);
        });
        Some(id)
    }

    // ─── Channels ───────────────────────────────────────────────────

    /// Add a channel and join it. A channel that is already a member is a
    /// complete no-op and returns None.
    pub fn add_channel(&self, name: &str) -> Option<ActionId> {
        match self.channels.insert(name) {
            Some(channel) => Some(self.dispatch(ChatAction::Join { channel })),
            None => {
                tracing::debug!(channel = %name, "Channel already joined or invalid, skipping");
                None
            }
        }
    }

    // ─── Event hooks ────────────────────────────────────────────────

    /// Register a callback for inbound chat messages. Registrations add up.
    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(ChatMessage) + Send + Sync + 'static,
    {
        self.listen(move |event| {
            if let ChatEvent::Message(message) = event {
                callback(message);
            }
        });
    }

    /// Register a callback invoked with the server address after each login
    pub fn on_connected<F>(&self, callback: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.listen(move |event| {
            if let ChatEvent::Connected { address } = event {
                callback(address);
            }
        });
    }

    /// Register a callback invoked with the reason whenever the connection closes
    pub fn on_disconnected<F>(&self, callback: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.listen(move |event| {
            if let ChatEvent::Disconnected { reason } = event {
                callback(reason);
            }
        });
    }

    fn listen<F>(&self, handler: F)
    where
        F: Fn(ChatEvent) + Send + Sync + 'static,
    {
        // Subscribe before spawning so no event after registration is missed
        let mut rx = self.transport.events();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handler(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Chat event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.track(handle);
    }

    // ─── Outbound actions ───────────────────────────────────────────

    pub fn say(&self, channel: &str, text: &str) -> ActionId {
        self.dispatch(ChatAction::Say {
            channel: channel_arg(channel),
            text: text.to_string(),
        })
    }

    pub fn whisper(&self, user: &str, text: &str) -> ActionId {
        self.dispatch(ChatAction::Whisper {
            user: user.to_string(),
            text: text.to_string(),
        })
    }

    pub fn ban(&self, channel: &str, user: &str, reason: Option<&str>) -> ActionId {
        self.dispatch(ChatAction::Ban {
            channel: channel_arg(channel),
            user: user.to_string(),
            reason: reason.map(str::to_string),
        })
    }

    pub fn unban(&self, channel: &str, user: &str) -> ActionId {
        self.dispatch(ChatAction::Unban {
            channel: channel_arg(channel),
            user: user.to_string(),
        })
    }

    pub fn clear(&self, channel: &str) -> ActionId {
        self.dispatch(ChatAction::Clear {
            channel: channel_arg(channel),
        })
    }

    pub fn color(&self, channel: &str, color: &str) -> ActionId {
        self.dispatch(ChatAction::Color {
            channel: channel_arg(channel),
            color: color.to_string(),
        })
    }

    pub fn commercial(&self, channel: &str, seconds: u32) -> ActionId {
        self.dispatch(ChatAction::Commercial {
            channel: channel_arg(channel),
            seconds,
        })
    }

    /// Run an action on the transport in the background. Failures are logged
    /// and published as outcomes; they never reach the caller.
    fn dispatch(&self, action: ChatAction) -> ActionId {
        let id = Uuid::new_v4();
        let transport = Arc::clone(&self.transport);
        let outcomes = self.outcomes.clone();
        tokio::spawn(async move {
            let result = perform(transport.as_ref(), &action).await;
            report(&outcomes, id, action, result);
        });
        id
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|p| p.into_inner());
        for handle in tasks.drain(..) {
            handle.abort();
        }
    }
}

/// Undo a pending transition unless a transport event already moved the state on
fn revert(state: &mut SessionState, expected: SessionState, fallback: SessionState) -> bool {
    if *state == expected {
        *state = fallback;
        true
    } else {
        false
    }
}

/// Follow transport events to drive the Connected / Disconnected transitions
fn spawn_state_tracker(
    mut rx: broadcast::Receiver<ChatEvent>,
    state: Arc<watch::Sender<SessionState>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ChatEvent::Connected { address }) => {
                    tracing::info!(address = %address, "Chat session connected");
                    state.send_replace(SessionState::Connected);
                }
                Ok(ChatEvent::Disconnected { reason }) => {
                    tracing::info!(reason = %reason, "Chat session disconnected");
                    state.send_replace(SessionState::Disconnected);
                }
                Ok(ChatEvent::Message(_)) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Session state tracker lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
