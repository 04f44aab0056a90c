//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use lumen_assistant::audio::{AudioOutput, OutputContext, OutputHandle};
use lumen_assistant::config::file::LumenConfigFile;
use lumen_assistant::{AudioSettings, Config, Error, Microphone, Playback, Result, StateUpdate};

pub const TEST_KEY: &str = "test-key";

/// Build a config pointing at local test servers
#[must_use]
pub fn config(api_base: &str, live_url: &str, api_key: Option<&str>) -> Config {
    let mut vars: HashMap<&str, String> = HashMap::new();
    vars.insert("LUMEN_API_BASE", api_base.to_string());
    vars.insert("LUMEN_LIVE_URL", live_url.to_string());
    vars.insert("LUMEN_CHAT_MODEL", "chat-test".to_string());
    vars.insert("LUMEN_TTS_MODEL", "tts-test".to_string());
    vars.insert("LUMEN_LIVE_MODEL", "live-test".to_string());
    if let Some(key) = api_key {
        vars.insert("GEMINI_API_KEY", key.to_string());
    }

    Config::from_sources(move |name| vars.get(name).cloned(), LumenConfigFile::default())
        .expect("failed to build test config")
}

/// Playback on an offline output whose clock only moves when rendered
#[must_use]
pub fn offline_playback() -> (Playback, OutputHandle) {
    let ctx = OutputContext::offline(24_000);
    let handle = ctx.handle();
    let output: Box<dyn AudioOutput> = Box::new(ctx);
    (Playback::with_output(output, AudioSettings::default()), handle)
}

/// A microphone that delivers a fixed set of frames
#[derive(Debug, Default)]
pub struct ScriptedMicrophone {
    frames: Vec<Vec<f32>>,
    sender: Option<mpsc::Sender<Vec<f32>>>,
    pub closed: Arc<AtomicBool>,
}

impl ScriptedMicrophone {
    #[must_use]
    pub fn new(frames: Vec<Vec<f32>>) -> Self {
        Self {
            frames,
            sender: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl Microphone for ScriptedMicrophone {
    fn open(&mut self) -> Result<mpsc::Receiver<Vec<f32>>> {
        let (tx, rx) = mpsc::channel(self.frames.len() + 1);
        for frame in self.frames.drain(..) {
            tx.try_send(frame).expect("frame queue sized for script");
        }
        // Held open until close so the session keeps its pump running
        self.sender = Some(tx);
        Ok(rx)
    }

    fn close(&mut self) {
        self.sender = None;
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A microphone whose permission is always refused
#[derive(Debug, Default)]
pub struct DeniedMicrophone;

impl Microphone for DeniedMicrophone {
    fn open(&mut self) -> Result<mpsc::Receiver<Vec<f32>>> {
        Err(Error::MicAccessDenied("permission denied".to_string()))
    }

    fn close(&mut self) {}
}

pub type ServerSocket = WebSocketStream<TcpStream>;

/// Run a one-connection WebSocket server; returns its URL and the script's result
pub async fn serve<F, Fut>(script: F) -> (String, JoinHandle<Fut::Output>)
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test server");
    let addr = listener.local_addr().expect("no local addr");

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept failed");
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("websocket handshake failed");
        script(ws).await
    });

    (format!("ws://{addr}"), handle)
}

/// Next JSON message from the client, skipping control frames
pub async fn recv_json(ws: &mut ServerSocket) -> Option<Value> {
    while let Some(msg) = ws.next().await {
        match msg.ok()? {
            Message::Text(text) => return serde_json::from_str(&text).ok(),
            Message::Binary(bytes) => return serde_json::from_slice(&bytes).ok(),
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

/// Next client message carrying `key`, skipping others
pub async fn recv_with(ws: &mut ServerSocket, key: &str) -> Option<Value> {
    loop {
        let msg = recv_json(ws).await?;
        if msg.get(key).is_some() {
            return Some(msg);
        }
    }
}

pub async fn send_json(ws: &mut ServerSocket, value: Value) {
    ws.send(Message::Text(value.to_string()))
        .await
        .expect("server send failed");
}

/// Read until the client closes the connection
pub async fn drain(ws: &mut ServerSocket) {
    while recv_json(ws).await.is_some() {}
}

/// Next update other than a running transcription
pub async fn next_update(updates: &mut mpsc::UnboundedReceiver<StateUpdate>) -> StateUpdate {
    loop {
        let update = tokio::time::timeout(Duration::from_secs(5), updates.recv())
            .await
            .expect("timed out waiting for a state update")
            .expect("update channel closed");
        if !matches!(update, StateUpdate::Transcription { .. }) {
            return update;
        }
    }
}
