// ABOUTME: Shared test doubles for herald-core integration tests
// ABOUTME: Recording chat transport, scripted speech backend and in-memory log capture
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use herald_core::session::ChatAction;
use herald_core::traits::{ChatEvent, ChatTransport, SpeechBackend, SpeechRequest};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub const WAIT: Duration = Duration::from_secs(2);

// =============================================================================
// Mock transport
// =============================================================================

/// Transport that records every call and can be told to fail specific actions
pub struct MockTransport {
    calls: Mutex<Vec<ChatAction>>,
    failing: Mutex<HashSet<&'static str>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    events: broadcast::Sender<ChatEvent>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            delays: Mutex::new(HashMap::new()),
            events,
        })
    }

    /// Make every action with this name fail (e.g. "say", "connect")
    pub fn fail_on(&self, action: &'static str) {
        self.failing.lock().unwrap().insert(action);
    }

    /// Make connect or disconnect take this long before resolving
    pub fn delay_on(&self, action: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(action, delay);
    }

    async fn pause(&self, action: &'static str) {
        let delay = self.delays.lock().unwrap().get(action).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn fail_everything(&self) {
        for name in [
            "connect", "disconnect", "join", "say", "whisper", "ban", "unban", "clear", "color",
            "commercial",
        ] {
            self.fail_on(name);
        }
    }

    pub fn calls(&self) -> Vec<ChatAction> {
        self.calls.lock().unwrap().clone()
    }

    pub fn joins(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ChatAction::Join { channel } => Some(channel),
                _ => None,
            })
            .collect()
    }

    /// Push an event as if it came from the network
    pub fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    fn record(&self, action: ChatAction) -> Result<()> {
        let name = action.name();
        self.calls.lock().unwrap().push(action);
        if self.failing.lock().unwrap().contains(name) {
            anyhow::bail!("simulated {} failure", name);
        }
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn connect(&self) -> Result<()> {
        self.pause("connect").await;
        self.record(ChatAction::Connect)?;
        self.emit(ChatEvent::Connected {
            address: "mock:443".to_string(),
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.pause("disconnect").await;
        self.record(ChatAction::Disconnect)?;
        self.emit(ChatEvent::Disconnected {
            reason: "requested".to_string(),
        });
        Ok(())
    }

    async fn join(&self, channel: &str) -> Result<()> {
        self.record(ChatAction::Join {
            channel: channel.to_string(),
        })
    }

    async fn say(&self, channel: &str, text: &str) -> Result<()> {
        self.record(ChatAction::Say {
            channel: channel.to_string(),
            text: text.to_string(),
        })
    }

    async fn whisper(&self, user: &str, text: &str) -> Result<()> {
        self.record(ChatAction::Whisper {
            user: user.to_string(),
            text: text.to_string(),
        })
    }

    async fn ban(&self, channel: &str, user: &str, reason: Option<&str>) -> Result<()> {
        self.record(ChatAction::Ban {
            channel: channel.to_string(),
            user: user.to_string(),
            reason: reason.map(str::to_string),
        })
    }

    async fn unban(&self, channel: &str, user: &str) -> Result<()> {
        self.record(ChatAction::Unban {
            channel: channel.to_string(),
            user: user.to_string(),
        })
    }

    async fn clear(&self, channel: &str) -> Result<()> {
        self.record(ChatAction::Clear {
            channel: channel.to_string(),
        })
    }

    async fn color(&self, channel: &str, color: &str) -> Result<()> {
        self.record(ChatAction::Color {
            channel: channel.to_string(),
            color: color.to_string(),
        })
    }

    async fn commercial(&self, channel: &str, seconds: u32) -> Result<()> {
        self.record(ChatAction::Commercial {
            channel: channel.to_string(),
            seconds,
        })
    }

    fn events(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }
}

// =============================================================================
// Mock speech backend
// =============================================================================

/// Speech backend that returns "audio:<input>" or fails on demand
pub struct MockSpeech {
    requests: Mutex<Vec<SpeechRequest>>,
    fail: bool,
}

impl MockSpeech {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn requests(&self) -> Vec<SpeechRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechBackend for MockSpeech {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            anyhow::bail!("speech service unavailable");
        }
        Ok(format!("audio:{}", request.input).into_bytes())
    }
}

// =============================================================================
// Log capture
// =============================================================================

/// Shared in-memory sink for a test-local tracing subscriber
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Route this thread's logs into a buffer for the lifetime of the guard.
/// Works with `#[tokio::test]` because its runtime is single-threaded.
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}
