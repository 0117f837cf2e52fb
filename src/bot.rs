// ABOUTME: Herald facade composing credentials, chat session and speech synthesis
// ABOUTME: One handle the operator's automation logic drives for the bot's whole lifetime

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};

use herald_core::config::Config;
use herald_core::credentials::{CredentialManager, Credentials, RefreshCredentials, RenewalOutcome, RenewalTask};
use herald_core::session::{ActionId, ActionOutcome, ChatSession, SessionState};
use herald_core::speech::{SpeechSynthesizer, SynthesisArtifact};
use herald_core::traits::{ChatMessage, ChatTransport, SpeechBackend};
use herald_core::ChannelSet;

use crate::openai::OpenAiSpeech;
use crate::twitch::TwitchTransport;

/// How long shutdown waits for the connection to report it has closed
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Herald {
    credentials: Arc<CredentialManager>,
    session: ChatSession,
    speech: SpeechSynthesizer,
    renewal: Mutex<Option<RenewalTask>>,
}

impl Herald {
    /// Wire up the Twitch transport and OpenAI speech backend from configuration
    pub fn from_config(config: &Config) -> Self {
        let refresh = config.auth.as_ref().map(|auth| RefreshCredentials {
            refresh_token: auth.refresh_token.clone(),
            client_id: auth.client_id.clone(),
            client_secret: auth.client_secret.clone(),
        });
        let credentials = Arc::new(Credentials::new(&config.bot.access_token, refresh));

        let (token_url, interval) = match &config.auth {
            Some(auth) => (auth.token_url.clone(), auth.refresh_interval()),
            None => (
                herald_core::config::DEFAULT_TOKEN_URL.to_string(),
                Duration::from_secs(herald_core::config::DEFAULT_REFRESH_INTERVAL_SECS),
            ),
        };
        let manager = Arc::new(CredentialManager::new(Arc::clone(&credentials), token_url, interval));

        let transport: Arc<dyn ChatTransport> = Arc::new(TwitchTransport::from_config(
            &config.bot,
            &config.transport,
            credentials,
        ));

        // A disabled synthesizer never calls its backend, so an empty key is fine there
        let backend: Arc<dyn SpeechBackend> = Arc::new(
            OpenAiSpeech::from_config(&config.tts)
                .unwrap_or_else(|| OpenAiSpeech::new("", config.tts.base_url.clone())),
        );
        let speech = SpeechSynthesizer::from_config(&config.tts, backend);

        Self::with_parts(manager, transport, &config.bot.channels, speech)
    }

    /// Compose from explicit parts. Initial channels go through the normal
    /// add-channel path so each produces one join.
    pub fn with_parts(
        credentials: Arc<CredentialManager>,
        transport: Arc<dyn ChatTransport>,
        channels: &[String],
        speech: SpeechSynthesizer,
    ) -> Self {
        let session = ChatSession::new(transport, Arc::new(ChannelSet::new()));
        for channel in channels {
            session.add_channel(channel);
        }

        Self {
            credentials,
            session,
            speech,
            renewal: Mutex::new(None),
        }
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Start token renewal (when refresh material is configured) and connect
    pub async fn start(&self) -> Option<ActionId> {
        if self.credentials.credentials().refresh().is_some() {
            let mut renewal = self.renewal.lock().await;
            if renewal.is_none() {
                tracing::info!(
                    interval_secs = self.credentials.interval().as_secs(),
                    "Starting automatic token renewal"
                );
                *renewal = Some(self.credentials.start_auto_renew());
            }
        }
        self.session.connect()
    }

    /// Stop renewal and close the connection, waiting briefly for it to close
    pub async fn shutdown(&self) {
        if let Some(task) = self.renewal.lock().await.take() {
            task.shutdown().await;
        }

        let mut changes = self.session.state_changes();
        if self.session.disconnect().is_none() {
            return;
        }
        let closed = tokio::time::timeout(
            SHUTDOWN_GRACE,
            changes.wait_for(|s| *s == SessionState::Disconnected),
        )
        .await
        .is_ok();
        if !closed {
            tracing::warn!("Timed out waiting for chat connection to close");
        }
    }

    pub fn connect(&self) -> Option<ActionId> {
        self.session.connect()
    }

    pub fn disconnect(&self) -> Option<ActionId> {
        self.session.disconnect()
    }

    /// Renew the access token now, outside the schedule
    pub async fn renew_token(&self) -> RenewalOutcome {
        self.credentials.renew().await
    }

    // ─── Channels ───────────────────────────────────────────────────

    pub fn add_channel(&self, name: &str) -> Option<ActionId> {
        self.session.add_channel(name)
    }

    pub fn channels(&self) -> Vec<String> {
        self.session.channels()
    }

    // ─── Event hooks ────────────────────────────────────────────────

    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(ChatMessage) + Send + Sync + 'static,
    {
        self.session.on_message(callback);
    }

    pub fn on_connected<F>(&self, callback: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.session.on_connected(callback);
    }

    pub fn on_disconnected<F>(&self, callback: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.session.on_disconnected(callback);
    }

    // ─── Outbound actions ───────────────────────────────────────────

    pub fn say(&self, channel: &str, text: &str) -> ActionId {
        self.session.say(channel, text)
    }

    pub fn whisper(&self, user: &str, text: &str) -> ActionId {
        self.session.whisper(user, text)
    }

    pub fn ban(&self, channel: &str, user: &str, reason: Option<&str>) -> ActionId {
        self.session.ban(channel, user, reason)
    }

    pub fn unban(&self, channel: &str, user: &str) -> ActionId {
        self.session.unban(channel, user)
    }

    pub fn clear(&self, channel: &str) -> ActionId {
        self.session.clear(channel)
    }

    pub fn color(&self, channel: &str, color: &str) -> ActionId {
        self.session.color(channel, color)
    }

    pub fn commercial(&self, channel: &str, seconds: u32) -> ActionId {
        self.session.commercial(channel, seconds)
    }

    // ─── Speech ─────────────────────────────────────────────────────

    /// Synthesize text to the artifact path. None when disabled or on failure.
    pub async fn speak(&self, text: &str) -> Option<SynthesisArtifact> {
        self.speech.synthesize(text).await
    }

    pub fn tts_enabled(&self) -> bool {
        self.speech.is_enabled()
    }

    // ─── Observation ────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.session.state_changes()
    }

    pub fn outcomes(&self) -> broadcast::Receiver<ActionOutcome> {
        self.session.outcomes()
    }

    pub fn renewals(&self) -> broadcast::Receiver<RenewalOutcome> {
        self.credentials.outcomes()
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }
}
