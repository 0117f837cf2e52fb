// ABOUTME: Shared fixtures for herald integration tests
// ABOUTME: A fake Twitch IRC websocket server and a scripted speech backend
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use herald_core::traits::{ChatEvent, SpeechBackend, SpeechRequest};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;

pub const WAIT: Duration = Duration::from_secs(5);

pub const WELCOME: &str = ":tmi.twitch.tv 001 herald_bot :Welcome, GLHF!";
pub const LOGIN_FAILED: &str = ":tmi.twitch.tv NOTICE * :Login authentication failed";

// =============================================================================
// Fake chat server
// =============================================================================

#[derive(Debug, Clone)]
enum ServerCmd {
    Send(String),
    Drop,
}

/// Websocket server speaking just enough Twitch IRC to log clients in.
/// Every line a client sends is recorded in arrival order.
pub struct FakeTmi {
    pub url: String,
    lines: mpsc::UnboundedReceiver<String>,
    control: broadcast::Sender<ServerCmd>,
}

impl FakeTmi {
    pub async fn start() -> Self {
        Self::start_with(Some(WELCOME)).await
    }

    /// Server that answers every login with an authentication failure
    pub async fn rejecting() -> Self {
        Self::start_with(Some(LOGIN_FAILED)).await
    }

    /// Server that records the login but never answers it
    pub async fn silent() -> Self {
        Self::start_with(None).await
    }

    async fn start_with(login_reply: Option<&'static str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (line_tx, lines) = mpsc::unbounded_channel();
        let (control, _) = broadcast::channel(64);

        let accept_control = control.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(
                    stream,
                    line_tx.clone(),
                    accept_control.subscribe(),
                    login_reply,
                ));
            }
        });

        Self {
            url,
            lines,
            control,
        }
    }

    /// Next line received from any client
    pub async fn next_line(&mut self) -> String {
        tokio::time::timeout(WAIT, self.lines.recv())
            .await
            .expect("timed out waiting for a client line")
            .expect("server stopped")
    }

    /// Skip lines until one matches
    pub async fn expect_line(&mut self, predicate: impl Fn(&str) -> bool) -> String {
        loop {
            let line = self.next_line().await;
            if predicate(&line) {
                return line;
            }
        }
    }

    /// Push a raw IRC line to every connected client
    pub fn send(&self, line: &str) {
        let _ = self.control.send(ServerCmd::Send(line.to_string()));
    }

    /// Close every client socket without a close frame
    pub fn drop_connections(&self) {
        let _ = self.control.send(ServerCmd::Drop);
    }
}

async fn serve(
    stream: TcpStream,
    lines: mpsc::UnboundedSender<String>,
    mut control: broadcast::Receiver<ServerCmd>,
    login_reply: Option<&'static str>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };

    loop {
        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    for line in text.lines() {
                        let _ = lines.send(line.to_string());
                        let Some(reply) = login_reply.filter(|_| line.starts_with("NICK ")) else {
                            continue;
                        };
                        if ws.send(Message::Text(reply.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(_)) => {}
                _ => return,
            },
            cmd = control.recv() => match cmd {
                Ok(ServerCmd::Send(line)) => {
                    if ws.send(Message::Text(line)).await.is_err() {
                        return;
                    }
                }
                Ok(ServerCmd::Drop) | Err(_) => return,
            },
        }
    }
}

/// Wait for the next transport event
pub async fn next_event(rx: &mut broadcast::Receiver<ChatEvent>) -> ChatEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a chat event")
        .expect("event channel closed")
}

// =============================================================================
// Mock speech backend
// =============================================================================

pub struct MockSpeech {
    requests: Mutex<Vec<SpeechRequest>>,
}

impl MockSpeech {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
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
        Ok(format!("audio:{}", request.input).into_bytes())
    }
}
