//! Bidirectional live voice session
//!
//! Microphone frames stream up over a WebSocket while the server streams
//! back audio, transcriptions, turn markers and function calls. Inbound
//! messages are dispatched strictly in arrival order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::types::{
    Blob, ClientMessage, Content, Enabled, FunctionCall, FunctionResponse, GenerationConfig,
    RealtimeInput, ServerMessage, Setup, Tool, ToolResponse,
};
use crate::audio::pcm::{INPUT_MIME_TYPE, decode_base64, encode_frame};
use crate::audio::{Microphone, Playback};
use crate::chat::ChatMessage;
use crate::config::Config;
use crate::prompt::build_system_instruction;
use crate::tools::{ToolCall, function_declarations};
use crate::{Error, Persona, Result};

/// Maximum wait for the connection and setup acknowledgement
pub const SETUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound messages buffered ahead of the socket writer
const OUTBOUND_QUEUE: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveState {
    Idle,
    Connecting,
    Open,
    Closed,
    Error,
}

/// Which side of the conversation a transcription belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// What the user said
    Input,
    /// What the model said
    Output,
}

/// A decoded server event
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    SetupComplete,
    ToolCall(Vec<FunctionCall>),
    AudioChunk(Vec<u8>),
    Transcription { direction: Direction, text: String },
    TurnComplete,
    Interrupted,
    Error(String),
    Closed,
}

/// Receives session callbacks
///
/// Callbacks run on the dispatch task, one at a time and in event order.
#[async_trait]
pub trait LiveHandler: Send + Sync {
    /// Apply a validated function call; `None` reports a plain "OK"
    async fn on_tool_call(&self, call: &ToolCall) -> Option<String>;

    /// Running transcription of the current turn
    fn on_transcription(&self, _input: &str, _output: &str) {}

    /// The model finished a turn; both transcripts are reset afterwards
    fn on_turn_complete(&self, input: &str, output: &str);

    /// The session failed and has been torn down
    fn on_error(&self, message: &str);

    /// The server closed the session
    fn on_close(&self) {}
}

/// Decode a server message into events, in the order they must be handled
#[must_use]
pub fn parse_server_message(text: &str) -> Vec<LiveEvent> {
    let msg: ServerMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring unparseable server message");
            return Vec::new();
        }
    };

    let mut events = Vec::new();

    if msg.setup_complete.is_some() {
        events.push(LiveEvent::SetupComplete);
    }

    if let Some(tool_call) = msg.tool_call
        && !tool_call.function_calls.is_empty()
    {
        events.push(LiveEvent::ToolCall(tool_call.function_calls));
    }

    if let Some(content) = msg.server_content {
        if content.interrupted {
            events.push(LiveEvent::Interrupted);
        }

        let parts = content.model_turn.map(|turn| turn.parts).unwrap_or_default();
        for blob in parts.into_iter().filter_map(|p| p.inline_data) {
            match decode_base64(&blob.data) {
                Ok(audio) => events.push(LiveEvent::AudioChunk(audio)),
                Err(e) => tracing::warn!(error = %e, "dropping undecodable audio part"),
            }
        }

        for (direction, transcription) in [
            (Direction::Input, content.input_transcription),
            (Direction::Output, content.output_transcription),
        ] {
            if let Some(text) = transcription.and_then(|t| t.text)
                && !text.is_empty()
            {
                events.push(LiveEvent::Transcription { direction, text });
            }
        }

        if content.turn_complete {
            events.push(LiveEvent::TurnComplete);
        }
    }

    if let Some(go_away) = msg.go_away {
        tracing::debug!(time_left = ?go_away.time_left, "server will close the session soon");
    }

    events
}

impl ClientMessage {
    /// Setup message for a persona with prior history
    #[must_use]
    pub fn setup(model: &str, persona: Persona, history: &[ChatMessage]) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };

        Self::Setup(Setup {
            model,
            generation_config: GenerationConfig::audio(persona.voice()),
            system_instruction: Content::text(None, build_system_instruction(persona, history)),
            tools: vec![Tool::functions(function_declarations())],
            input_audio_transcription: Enabled {},
            output_audio_transcription: Enabled {},
        })
    }

    /// One microphone frame
    #[must_use]
    pub fn audio(frame: &[f32]) -> Self {
        Self::RealtimeInput(RealtimeInput {
            audio: Blob {
                mime_type: INPUT_MIME_TYPE.to_string(),
                data: encode_frame(frame),
            },
        })
    }

    /// Result of a function call, correlated by call id
    #[must_use]
    pub fn tool_result(call: &FunctionCall, result: &str) -> Self {
        Self::ToolResponse(ToolResponse {
            function_responses: vec![FunctionResponse {
                id: call.id.clone(),
                name: call.name.clone(),
                response: json!({ "result": result }),
            }],
        })
    }
}

/// Outbound path to the socket writer
///
/// Severing it makes every later send a no-op, so nothing reaches the
/// socket once teardown has begun.
#[derive(Debug, Clone, Default)]
struct SessionLink {
    outbound: Arc<Mutex<Option<mpsc::Sender<Message>>>>,
}

impl SessionLink {
    fn attach(&self, sender: mpsc::Sender<Message>) {
        *self.lock() = Some(sender);
    }

    /// Returns whether the link was live
    fn sever(&self) -> bool {
        self.lock().take().is_some()
    }

    fn is_live(&self) -> bool {
        self.lock().is_some()
    }

    fn sender(&self) -> Option<mpsc::Sender<Message>> {
        self.lock().clone()
    }

    async fn send(&self, msg: &ClientMessage) -> bool {
        let Some(sender) = self.sender() else {
            return false;
        };
        let json = match serde_json::to_string(msg) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode client message");
                return false;
            }
        };
        sender.send(Message::Text(json)).await.is_ok()
    }

    fn lock(&self) -> MutexGuard<'_, Option<mpsc::Sender<Message>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type MicrophoneSlot = Arc<Mutex<Option<Box<dyn Microphone>>>>;

/// Resources released on every teardown path
#[derive(Clone)]
struct Teardown {
    link: SessionLink,
    microphone: MicrophoneSlot,
    playback: Playback,
    claimed: Arc<AtomicBool>,
    state: Arc<Mutex<LiveState>>,
}

impl Teardown {
    /// Release everything; safe to run more than once
    fn release(&self) {
        self.link.sever();
        let microphone = self
            .microphone
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut microphone) = microphone {
            microphone.close();
        }
        self.playback.stop_all();
        if self.claimed.swap(false, Ordering::SeqCst) {
            self.playback.release_live();
        }
    }

    fn state(&self) -> LiveState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LiveState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Move to `next` only from an active state; returns whether it moved
    fn finish(&self, next: LiveState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, LiveState::Connecting | LiveState::Open) {
            *state = next;
            true
        } else {
            false
        }
    }
}

/// A live voice session
pub struct LiveSession {
    api_key: Option<SecretString>,
    live_url: String,
    model: String,
    teardown: Teardown,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("live_url", &self.live_url)
            .field("model", &self.model)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl LiveSession {
    /// Create an idle session playing audio through `playback`
    #[must_use]
    pub fn new(config: &Config, playback: Playback) -> Self {
        Self {
            api_key: config
                .api_key
                .as_ref()
                .map(|key| SecretString::from(key.expose_secret().to_owned())),
            live_url: config.endpoints.live_url.clone(),
            model: config.models.live.clone(),
            teardown: Teardown {
                link: SessionLink::default(),
                microphone: Arc::new(Mutex::new(None)),
                playback,
                claimed: Arc::new(AtomicBool::new(false)),
                state: Arc::new(Mutex::new(LiveState::Idle)),
            },
            tasks: Vec::new(),
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> LiveState {
        self.teardown.state()
    }

    /// Open the microphone, connect, and wait for the setup acknowledgement
    ///
    /// On success the session is `Open` and microphone frames are streaming.
    ///
    /// # Errors
    ///
    /// - `Config` if no API key is available
    /// - `Session` if a session is already active on this handle or the
    ///   playback sequencer, or if connection or setup fails or times out
    /// - `MicAccessDenied` if the microphone cannot be opened
    pub async fn start(
        &mut self,
        persona: Persona,
        history: &[ChatMessage],
        microphone: Box<dyn Microphone>,
        handler: Arc<dyn LiveHandler>,
    ) -> Result<()> {
        if matches!(self.state(), LiveState::Connecting | LiveState::Open) {
            return Err(Error::Session("session already active".to_string()));
        }

        let api_key = self
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().to_owned())
            .ok_or_else(|| Error::Config("API key missing: set GEMINI_API_KEY or API_KEY".to_string()))?;
        let url = session_url(&self.live_url, &api_key)?;

        self.teardown.playback.claim_live()?;
        self.teardown.claimed.store(true, Ordering::SeqCst);
        self.teardown.set_state(LiveState::Connecting);

        tracing::info!(persona = %persona, model = %self.model, "starting live session");

        match self.open(&url, persona, history, microphone, handler).await {
            Ok(()) => {
                tracing::info!("live session open");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "live session failed to start");
                self.abort_tasks();
                self.teardown.release();
                self.teardown.set_state(LiveState::Error);
                Err(e)
            }
        }
    }

    async fn open(
        &mut self,
        url: &Url,
        persona: Persona,
        history: &[ChatMessage],
        mut microphone: Box<dyn Microphone>,
        handler: Arc<dyn LiveHandler>,
    ) -> Result<()> {
        let frames = microphone.open()?;
        *self
            .teardown
            .microphone
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(microphone);

        let setup = ClientMessage::setup(&self.model, persona, history);

        let (sink, stream) = tokio::time::timeout(SETUP_TIMEOUT, handshake(url, &setup))
            .await
            .map_err(|_| Error::Session("timed out waiting for session setup".to_string()))??;

        self.teardown.set_state(LiveState::Open);

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        self.teardown.link.attach(outbound_tx);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        // Finishes on its own once the link is severed, closing the socket
        tokio::spawn(run_writer(sink, outbound_rx, self.teardown.link.clone()));

        self.tasks.push(tokio::spawn(run_reader(stream, events_tx)));
        self.tasks.push(tokio::spawn(pump_microphone(
            frames,
            self.teardown.link.clone(),
        )));

        let dispatcher = Dispatcher {
            handler,
            teardown: self.teardown.clone(),
            input: String::new(),
            output: String::new(),
        };
        self.tasks.push(tokio::spawn(dispatcher.run(events_rx)));

        Ok(())
    }

    /// Tear the session down from any state
    ///
    /// Closes the microphone, halts playback and releases the sequencer.
    /// Safe to call repeatedly; callbacks are not invoked.
    pub fn stop(&mut self) {
        let was_live = self.teardown.link.is_live();
        self.abort_tasks();
        self.teardown.release();
        self.teardown.finish(LiveState::Closed);
        if was_live {
            tracing::info!("live session stopped");
        }
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Append the API key to the live endpoint as a query parameter
fn session_url(live_url: &str, api_key: &str) -> Result<Url> {
    let mut url = Url::parse(live_url)
        .map_err(|e| Error::Config(format!("invalid live URL '{live_url}': {e}")))?;
    url.query_pairs_mut().append_pair("key", api_key);
    Ok(url)
}

/// Connect, send setup, and wait for `setupComplete`
async fn handshake(url: &Url, setup: &ClientMessage) -> Result<(WsSink, WsSource)> {
    let (ws, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| Error::Session(format!("connection failed: {e}")))?;
    let (mut sink, mut stream) = ws.split();

    sink.send(Message::Text(serde_json::to_string(setup)?)).await?;

    while let Some(frame) = stream.next().await {
        match read_frame(frame?) {
            Frame::Text(text) => {
                if parse_server_message(&text).contains(&LiveEvent::SetupComplete) {
                    return Ok((sink, stream));
                }
            }
            Frame::Close(reason) => {
                return Err(Error::Session(format!(
                    "session closed during setup: {}",
                    reason.unwrap_or_default()
                )));
            }
            Frame::Skip => {}
        }
    }

    Err(Error::Session("connection ended during setup".to_string()))
}

enum Frame {
    Text(String),
    /// Close frame; carries a reason when the close was abnormal
    Close(Option<String>),
    Skip,
}

fn read_frame(msg: Message) -> Frame {
    match msg {
        Message::Text(text) => Frame::Text(text),
        // The server sends JSON in binary frames as well
        Message::Binary(bytes) => String::from_utf8(bytes).map_or(Frame::Skip, Frame::Text),
        Message::Close(frame) => Frame::Close(frame.and_then(|f| {
            (f.code != CloseCode::Normal).then(|| format!("{} ({})", f.reason, u16::from(f.code)))
        })),
        _ => Frame::Skip,
    }
}

/// Forward queued messages to the socket until the link is severed
///
/// Messages still queued at sever time are dropped, not flushed.
async fn run_writer<S>(mut sink: S, mut outbound: mpsc::Receiver<Message>, link: SessionLink)
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(msg) = outbound.recv().await {
        if !link.is_live() {
            tracing::debug!("link severed, discarding queued messages");
            break;
        }
        if let Err(e) = sink.send(msg).await {
            tracing::debug!(error = %e, "live send failed");
            break;
        }
    }
    let _ = sink.close().await;
    tracing::debug!("live writer finished");
}

async fn run_reader(mut stream: WsSource, events: mpsc::UnboundedSender<LiveEvent>) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(msg) => match read_frame(msg) {
                Frame::Text(text) => text,
                Frame::Close(Some(reason)) => {
                    let _ = events.send(LiveEvent::Error(format!("session closed: {reason}")));
                    return;
                }
                Frame::Close(None) => break,
                Frame::Skip => continue,
            },
            Err(e) => {
                let _ = events.send(LiveEvent::Error(e.to_string()));
                return;
            }
        };

        for event in parse_server_message(&text) {
            if events.send(event).is_err() {
                return;
            }
        }
    }
    let _ = events.send(LiveEvent::Closed);
}

async fn pump_microphone(mut frames: mpsc::Receiver<Vec<f32>>, link: SessionLink) {
    while let Some(frame) = frames.recv().await {
        if !link.send(&ClientMessage::audio(&frame)).await {
            tracing::trace!("dropping microphone frame, session not live");
        }
    }
}

/// Handles inbound events one at a time
struct Dispatcher {
    handler: Arc<dyn LiveHandler>,
    teardown: Teardown,
    input: String,
    output: String,
}

impl Dispatcher {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<LiveEvent>) {
        while let Some(event) = events.recv().await {
            if !self.handle(event).await {
                break;
            }
        }
    }

    /// Returns false once the session has ended
    async fn handle(&mut self, event: LiveEvent) -> bool {
        match event {
            LiveEvent::SetupComplete => {}
            LiveEvent::ToolCall(calls) => {
                for call in calls {
                    self.answer(call).await;
                }
            }
            LiveEvent::AudioChunk(bytes) => {
                if let Err(e) = self.teardown.playback.enqueue_chunk(&bytes) {
                    tracing::warn!(error = %e, "failed to schedule live audio");
                }
            }
            LiveEvent::Transcription { direction, text } => {
                match direction {
                    Direction::Input => self.input.push_str(&text),
                    Direction::Output => self.output.push_str(&text),
                }
                self.handler.on_transcription(&self.input, &self.output);
            }
            LiveEvent::TurnComplete => {
                let input = std::mem::take(&mut self.input);
                let output = std::mem::take(&mut self.output);
                self.handler.on_turn_complete(&input, &output);
            }
            LiveEvent::Interrupted => {
                tracing::debug!("model interrupted, halting playback");
                self.teardown.playback.stop_all();
            }
            LiveEvent::Error(message) => {
                tracing::error!(error = %message, "live session error");
                self.teardown.release();
                if self.teardown.finish(LiveState::Error) {
                    self.handler.on_error(&message);
                }
                return false;
            }
            LiveEvent::Closed => {
                tracing::info!("live session closed by server");
                self.teardown.release();
                if self.teardown.finish(LiveState::Closed) {
                    self.handler.on_close();
                }
                return false;
            }
        }
        true
    }

    async fn answer(&self, call: FunctionCall) {
        let result = match ToolCall::parse(&call.name, &call.args) {
            Ok(tool) => {
                tracing::debug!(function = tool.name(), "applying tool call");
                self.handler
                    .on_tool_call(&tool)
                    .await
                    .unwrap_or_else(|| "OK".to_string())
            }
            Err(e) => {
                tracing::warn!(function = %call.name, error = %e, "rejecting tool call");
                format!("error: {e}")
            }
        };

        if !self.teardown.link.send(&ClientMessage::tool_result(&call, &result)).await {
            tracing::debug!(function = %call.name, "session ended before tool response");
        }
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as B64;

    use super::*;

    #[test]
    fn test_parse_event_order() {
        let audio = B64.encode([1u8, 0, 2, 0]);
        let text = json!({
            "serverContent": {
                "interrupted": true,
                "modelTurn": {"parts": [{"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": audio}}]},
                "inputTranscription": {"text": "hi"},
                "outputTranscription": {"text": "hello"},
                "turnComplete": true
            }
        })
        .to_string();

        let events = parse_server_message(&text);

        assert_eq!(
            events,
            vec![
                LiveEvent::Interrupted,
                LiveEvent::AudioChunk(vec![1, 0, 2, 0]),
                LiveEvent::Transcription {
                    direction: Direction::Input,
                    text: "hi".to_string()
                },
                LiveEvent::Transcription {
                    direction: Direction::Output,
                    text: "hello".to_string()
                },
                LiveEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn test_parse_tool_call_and_setup() {
        let events = parse_server_message(r#"{"setupComplete": {}}"#);
        assert_eq!(events, vec![LiveEvent::SetupComplete]);

        let events = parse_server_message(
            r#"{"toolCall": {"functionCalls": [{"id": "c1", "name": "set_volume", "args": {"level": 50}}]}}"#,
        );
        let [LiveEvent::ToolCall(calls)] = events.as_slice() else {
            panic!("expected tool calls, got {events:?}");
        };
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].args["level"], 50);
    }

    #[test]
    fn test_parse_ignores_garbage() {
        assert!(parse_server_message("not json").is_empty());
        assert!(parse_server_message(r#"{"goAway": {"timeLeft": "5s"}}"#).is_empty());
        assert!(parse_server_message(r#"{"serverContent": {"outputTranscription": {"text": ""}}}"#).is_empty());
    }

    #[test]
    fn test_setup_message() {
        let msg = ClientMessage::setup("gemini-live", Persona::Atlas, &[ChatMessage::user("earlier")]);
        let value = serde_json::to_value(&msg).unwrap();
        let setup = &value["setup"];

        assert_eq!(setup["model"], "models/gemini-live");
        assert_eq!(setup["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Charon"
        );
        assert!(
            setup["systemInstruction"]["parts"][0]["text"]
                .as_str()
                .unwrap()
                .contains("earlier")
        );
        assert_eq!(setup["tools"][0]["functionDeclarations"].as_array().unwrap().len(), 3);
        assert!(setup["inputAudioTranscription"].is_object());
        assert!(setup["outputAudioTranscription"].is_object());
    }

    #[test]
    fn test_audio_message() {
        let value = serde_json::to_value(ClientMessage::audio(&[0.0, 0.5])).unwrap();

        assert_eq!(value["realtimeInput"]["audio"]["mimeType"], INPUT_MIME_TYPE);
        let data = B64
            .decode(value["realtimeInput"]["audio"]["data"].as_str().unwrap())
            .unwrap();
        assert_eq!(data.len(), 4);
    }

    #[tokio::test]
    async fn test_severed_link_drops_sends() {
        let link = SessionLink::default();
        let (tx, mut rx) = mpsc::channel(4);
        link.attach(tx);

        assert!(link.send(&ClientMessage::audio(&[0.0])).await);
        assert!(link.sever());
        assert!(!link.sever());
        assert!(!link.send(&ClientMessage::audio(&[0.0])).await);

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_session_url_without_path() {
        let url = session_url("ws://127.0.0.1:9000", "abc").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:9000/?key=abc");
    }

    #[test]
    fn test_session_url_keeps_existing_query() {
        let url = session_url("wss://example.com/ws/live?alt=json", "a b&c").unwrap();
        assert_eq!(url.as_str(), "wss://example.com/ws/live?alt=json&key=a+b%26c");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[1], ("key".to_string(), "a b&c".to_string()));
    }

    #[test]
    fn test_session_url_rejects_garbage() {
        assert!(matches!(session_url("not a url", "abc"), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_writer_forwards_until_severed() {
        let link = SessionLink::default();
        let (tx, rx) = mpsc::channel(4);
        link.attach(tx);
        let (sink, mut socket) = futures::channel::mpsc::unbounded::<Message>();
        let writer = tokio::spawn(run_writer(sink, rx, link.clone()));

        assert!(link.send(&ClientMessage::audio(&[0.0])).await);
        assert!(matches!(socket.next().await, Some(Message::Text(_))));

        link.sever();
        writer.await.unwrap();
        assert!(socket.next().await.is_none());
    }

    #[tokio::test]
    async fn test_writer_discards_queue_after_sever() {
        let link = SessionLink::default();
        let (tx, rx) = mpsc::channel(4);
        link.attach(tx);
        for _ in 0..3 {
            assert!(link.send(&ClientMessage::audio(&[0.0])).await);
        }
        link.sever();

        let (sink, socket) = futures::channel::mpsc::unbounded::<Message>();
        run_writer(sink, rx, link).await;

        let written: Vec<Message> = socket.collect().await;
        assert!(written.is_empty());
    }
}
