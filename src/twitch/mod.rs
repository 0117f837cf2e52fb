// ABOUTME: Twitch chat transport over the IRC websocket endpoint
// ABOUTME: Handles login, channel joins, keepalive and backoff reconnects behind ChatTransport

pub mod irc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use herald_core::backoff::{Backoff, ReconnectPolicy};
use herald_core::channels::normalize_channel;
use herald_core::config::{BotConfig, TransportConfig};
use herald_core::credentials::Credentials;
use herald_core::traits::{ChatEvent, ChatMessage, ChatTransport};

use irc::IrcMessage;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);
/// Twitch pings roughly every five minutes; silence past this means a dead link
const IDLE_TIMEOUT: Duration = Duration::from_secs(6 * 60);
const EVENT_CAPACITY: usize = 256;

/// Connection settings shared with the background connection task
#[derive(Clone)]
struct Endpoint {
    url: String,
    username: String,
    credentials: Arc<Credentials>,
    reconnect: Option<ReconnectPolicy>,
    channels: Arc<Mutex<Vec<String>>>,
    events: broadcast::Sender<ChatEvent>,
    connected: Arc<AtomicBool>,
}

impl Endpoint {
    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// A live connection task
struct Link {
    outbound: mpsc::UnboundedSender<String>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// ChatTransport implementation for Twitch IRC over websocket.
///
/// The access token is read from the shared credentials every time a login
/// happens, so renewals take effect on the next (re)connect only.
pub struct TwitchTransport {
    endpoint: Endpoint,
    /// Serializes logins; `link` itself is only held briefly
    login: Mutex<()>,
    link: Mutex<Option<Link>>,
}

impl TwitchTransport {
    pub fn new(url: impl Into<String>, username: impl Into<String>, credentials: Arc<Credentials>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            endpoint: Endpoint {
                url: url.into(),
                username: username.into().to_lowercase(),
                credentials,
                reconnect: Some(ReconnectPolicy::default()),
                channels: Arc::new(Mutex::new(Vec::new())),
                events,
                connected: Arc::new(AtomicBool::new(false)),
            },
            login: Mutex::new(()),
            link: Mutex::new(None),
        }
    }

    pub fn from_config(bot: &BotConfig, transport: &TransportConfig, credentials: Arc<Credentials>) -> Self {
        let reconnect = transport.reconnect.then(|| transport.reconnect_policy());
        Self::new(transport.url.clone(), bot.username.clone(), credentials).with_reconnect(reconnect)
    }

    /// Set the reconnect policy; None disables automatic reconnects
    pub fn with_reconnect(mut self, policy: Option<ReconnectPolicy>) -> Self {
        self.endpoint.reconnect = policy;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.endpoint.connected.load(Ordering::SeqCst)
    }

    /// Channels this transport joins on every login
    pub async fn joined_channels(&self) -> Vec<String> {
        self.endpoint.channels.lock().await.clone()
    }

    async fn send_line(&self, line: String) -> Result<()> {
        if !self.is_connected() {
            anyhow::bail!("Not connected to server");
        }
        let link = self.link.lock().await;
        let link = link.as_ref().context("Not connected to server")?;
        link.outbound
            .send(line)
            .map_err(|_| anyhow::anyhow!("Connection task has stopped"))
    }

    /// Run a slash command in a channel the way chat clients do
    async fn command(&self, channel: &str, command: String) -> Result<()> {
        self.send_line(irc::privmsg(channel, &command)).await
    }
}

impl Drop for TwitchTransport {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.task.abort();
        }
    }
}

#[async_trait]
impl ChatTransport for TwitchTransport {
    async fn connect(&self) -> Result<()> {
        let _login = self.login.lock().await;
        if self.is_connected() {
            tracing::debug!("Twitch transport already connected");
            return Ok(());
        }
        // A task still backing off after a drop is replaced by a fresh login
        let stale = self.link.lock().await.take();
        if let Some(stale) = stale {
            let _ = stale.cancel.send(true);
            if let Err(e) = stale.task.await {
                tracing::warn!(error = %e, "Twitch connection task ended abnormally");
            }
        }

        // The handshake runs without `link` held, so a disconnect during login
        // finds no socket and fails at once instead of queueing behind it
        let (mut socket, joined) = open_session(&self.endpoint).await?;

        let mut link = self.link.lock().await;
        go_live(&self.endpoint, &mut socket, &joined).await?;
        tracing::info!(url = %self.endpoint.url, channels = joined.len(), "Connected to Twitch chat");
        self.endpoint.emit(ChatEvent::Connected {
            address: self.endpoint.url.clone(),
        });

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run_connection(
            self.endpoint.clone(),
            socket,
            outbound_rx,
            cancel_rx,
        ));

        *link = Some(Link {
            outbound,
            cancel,
            task,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let link = self.link.lock().await.take();
        let Some(link) = link.filter(|l| !l.task.is_finished()) else {
            anyhow::bail!("Cannot disconnect from server, socket is not open");
        };

        let _ = link.cancel.send(true);
        if let Err(e) = link.task.await {
            tracing::warn!(error = %e, "Twitch connection task ended abnormally");
        }
        Ok(())
    }

    async fn join(&self, channel: &str) -> Result<()> {
        let channel = normalize_channel(channel).context("Channel name is empty")?;
        {
            let mut channels = self.endpoint.channels.lock().await;
            if !channels.contains(&channel) {
                channels.push(channel.clone());
            }
        }

        if self.is_connected() {
            self.send_line(irc::join(&channel)).await
        } else {
            tracing::debug!(channel = %channel, "Not connected, channel will be joined on connect");
            Ok(())
        }
    }

    async fn say(&self, channel: &str, text: &str) -> Result<()> {
        self.send_line(irc::privmsg(channel, text)).await
    }

    async fn whisper(&self, user: &str, text: &str) -> Result<()> {
        let username = self.endpoint.username.clone();
        self.command(&username, format!("/w {} {}", user, text)).await
    }

    async fn ban(&self, channel: &str, user: &str, reason: Option<&str>) -> Result<()> {
        let command = match reason.filter(|r| !r.trim().is_empty()) {
            Some(reason) => format!("/ban {} {}", user, reason),
            None => format!("/ban {}", user),
        };
        self.command(channel, command).await
    }

    async fn unban(&self, channel: &str, user: &str) -> Result<()> {
        self.command(channel, format!("/unban {}", user)).await
    }

    async fn clear(&self, channel: &str) -> Result<()> {
        self.command(channel, "/clear".to_string()).await
    }

    async fn color(&self, channel: &str, color: &str) -> Result<()> {
        self.command(channel, format!("/color {}", color)).await
    }

    async fn commercial(&self, channel: &str, seconds: u32) -> Result<()> {
        self.command(channel, format!("/commercial {}", seconds)).await
    }

    fn events(&self) -> broadcast::Receiver<ChatEvent> {
        self.endpoint.events.subscribe()
    }
}

// =============================================================================
// Connection handling
// =============================================================================

/// Why a connection stopped
#[derive(Debug, PartialEq, Eq)]
enum Closed {
    Requested,
    Dropped(String),
}

/// What to do with one inbound IRC line
#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    Event(ChatEvent),
    Reply(String),
    Reconnect,
    Ignore,
}

fn interpret(line: &str, username: &str) -> Inbound {
    let Some(msg) = IrcMessage::parse(line) else {
        return Inbound::Ignore;
    };

    match msg.command.as_str() {
        "PING" => Inbound::Reply(irc::pong(msg.param(0))),
        "RECONNECT" => Inbound::Reconnect,
        "PRIVMSG" => {
            let (Some(target), Some(body)) = (msg.param(0), msg.param(1)) else {
                return Inbound::Ignore;
            };
            let sender = msg
                .nick()
                .map(str::to_string)
                .or_else(|| msg.tag("login").map(str::to_string))
                .unwrap_or_default();
            let (text, is_action) = match irc::strip_action(body) {
                Some(text) => (text, true),
                None => (body, false),
            };
            Inbound::Event(ChatEvent::Message(ChatMessage {
                channel: target.trim_start_matches('#').to_string(),
                is_self: sender.eq_ignore_ascii_case(username),
                sender,
                display_name: msg.tag("display-name").map(str::to_string),
                text: text.to_string(),
                tags: msg.tags.clone(),
                is_action,
            }))
        }
        "NOTICE" => {
            tracing::info!(
                channel = msg.param(0).unwrap_or_default(),
                notice = msg.param(1).unwrap_or_default(),
                "Twitch notice"
            );
            Inbound::Ignore
        }
        _ => Inbound::Ignore,
    }
}

fn is_login_failure(msg: &IrcMessage) -> bool {
    msg.command == "NOTICE"
        && msg
            .param(1)
            .map(|text| {
                text.contains("Login authentication failed") || text.contains("Improperly formatted auth")
            })
            .unwrap_or(false)
}

/// Open the websocket, log in and join the channels known at this point
async fn open_session(endpoint: &Endpoint) -> Result<(WsStream, Vec<String>)> {
    let channels = endpoint.channels.lock().await.clone();
    let (mut socket, _) = tokio::time::timeout(LOGIN_TIMEOUT, tokio_tungstenite::connect_async(endpoint.url.as_str()))
        .await
        .context("Timed out connecting to Twitch chat")?
        .with_context(|| format!("Failed to connect to {}", endpoint.url))?;

    for line in [
        irc::cap_request(),
        irc::pass(&endpoint.credentials.access_token()),
        irc::nick(&endpoint.username),
    ] {
        socket
            .send(Message::Text(line))
            .await
            .context("Failed to send login")?;
    }

    tokio::time::timeout(LOGIN_TIMEOUT, await_welcome(&mut socket))
        .await
        .context("Timed out waiting for Twitch login")??;

    for channel in &channels {
        socket
            .send(Message::Text(irc::join(channel)))
            .await
            .with_context(|| format!("Failed to join #{}", channel))?;
    }

    Ok((socket, channels))
}

/// Mark the link connected and join channels added while logging in.
///
/// Holding the channel lock while flipping the flag means a concurrent
/// `join` either lands in the list seen here or sees the link as connected.
async fn go_live(endpoint: &Endpoint, socket: &mut WsStream, joined: &[String]) -> Result<()> {
    let late: Vec<String> = {
        let channels = endpoint.channels.lock().await;
        endpoint.connected.store(true, Ordering::SeqCst);
        channels
            .iter()
            .filter(|c| !joined.contains(c))
            .cloned()
            .collect()
    };

    for channel in &late {
        if let Err(e) = socket.send(Message::Text(irc::join(channel))).await {
            endpoint.connected.store(false, Ordering::SeqCst);
            return Err(e).with_context(|| format!("Failed to join #{}", channel));
        }
    }
    Ok(())
}

async fn await_welcome(socket: &mut WsStream) -> Result<()> {
    while let Some(frame) = socket.next().await {
        let text = match frame.context("Connection error during login")? {
            Message::Text(text) => text,
            Message::Close(_) => anyhow::bail!("Connection closed during login"),
            _ => continue,
        };
        for line in text.lines() {
            let Some(msg) = IrcMessage::parse(line) else {
                continue;
            };
            if msg.command == "001" {
                return Ok(());
            }
            if is_login_failure(&msg) {
                anyhow::bail!("Login authentication failed");
            }
            if msg.command == "PING" {
                socket.send(Message::Text(irc::pong(msg.param(0)))).await?;
            }
        }
    }
    anyhow::bail!("Connection closed during login")
}

/// Drive one socket until it closes or shutdown is requested
async fn pump(
    endpoint: &Endpoint,
    socket: &mut WsStream,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Closed {
    let idle = tokio::time::sleep(IDLE_TIMEOUT);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            changed = cancel_rx.changed() => {
                if changed.is_err() || *cancel_rx.borrow() {
                    return Closed::Requested;
                }
            }
            line = outbound_rx.recv() => {
                let Some(line) = line else {
                    return Closed::Requested;
                };
                if let Err(e) = socket.send(Message::Text(line)).await {
                    return Closed::Dropped(format!("write failed: {e}"));
                }
            }
            _ = &mut idle => {
                return Closed::Dropped("keepalive timeout".to_string());
            }
            frame = socket.next() => {
                idle.as_mut().reset(tokio::time::Instant::now() + IDLE_TIMEOUT);
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) => return Closed::Dropped("closed by server".to_string()),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Closed::Dropped(e.to_string()),
                    None => return Closed::Dropped("connection closed".to_string()),
                };
                for line in text.lines() {
                    match interpret(line, &endpoint.username) {
                        Inbound::Event(event) => endpoint.emit(event),
                        Inbound::Reply(reply) => {
                            if let Err(e) = socket.send(Message::Text(reply)).await {
                                return Closed::Dropped(format!("write failed: {e}"));
                            }
                        }
                        Inbound::Reconnect => {
                            return Closed::Dropped("server requested reconnect".to_string());
                        }
                        Inbound::Ignore => {}
                    }
                }
            }
        }
    }
}

/// Connection task: pump the socket, reconnect with backoff after drops
async fn run_connection(
    endpoint: Endpoint,
    mut socket: WsStream,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    loop {
        let closed = pump(&endpoint, &mut socket, &mut outbound_rx, &mut cancel_rx).await;
        endpoint.connected.store(false, Ordering::SeqCst);

        let reason = match closed {
            Closed::Requested => {
                let _ = socket.close(None).await;
                tracing::info!("Disconnected from Twitch chat");
                endpoint.emit(ChatEvent::Disconnected {
                    reason: "requested".to_string(),
                });
                return;
            }
            Closed::Dropped(reason) => reason,
        };

        tracing::warn!(reason = %reason, "Twitch chat connection dropped");
        endpoint.emit(ChatEvent::Disconnected { reason });
        // Lines queued before the drop was noticed belong to the dead session
        while outbound_rx.try_recv().is_ok() {}

        let Some(policy) = endpoint.reconnect else {
            return;
        };
        match reconnect(&endpoint, policy, &mut cancel_rx).await {
            Some(next) => {
                socket = next;
                tracing::info!("Reconnected to Twitch chat");
                endpoint.emit(ChatEvent::Connected {
                    address: endpoint.url.clone(),
                });
            }
            None => return,
        }
    }
}

/// Retry login with backoff. None when cancelled or attempts are exhausted.
async fn reconnect(
    endpoint: &Endpoint,
    policy: ReconnectPolicy,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Option<WsStream> {
    let mut backoff = Backoff::new(policy);
    loop {
        let Some(delay) = backoff.next_delay() else {
            tracing::error!(attempts = backoff.attempts() - 1, "Giving up reconnecting to Twitch chat");
            return None;
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = cancel_rx.changed() => {
                if changed.is_err() || *cancel_rx.borrow() {
                    return None;
                }
            }
        }

        let attempt = async {
            let (mut socket, joined) = open_session(endpoint).await?;
            go_live(endpoint, &mut socket, &joined).await?;
            anyhow::Ok(socket)
        };
        match attempt.await {
            Ok(socket) => return Some(socket),
            Err(e) => {
                tracing::warn!(
                    attempt = backoff.attempts(),
                    error = %format!("{e:#}"),
                    "Reconnect attempt failed"
                );
            }
        }
    }
}
