use crate::audio::TransportBlob;
use crate::error::{Result, VoiceError};
use crate::events::{ClientMessage, LiveEvent, parse_server_message};
use crate::session::{LiveSession, SessionSetup};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, tungstenite::Message};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures::stream::SplitSink<WsStream, Message>;
type WsSource = futures::stream::SplitStream<WsStream>;

/// Inbound half: the socket plus events parsed but not yet handed out.
struct Inbound {
    source: WsSource,
    pending: VecDeque<LiveEvent>,
}

/// Gemini Live session.
///
/// Manages a WebSocket connection to Google's Gemini Live API.
pub struct GeminiLiveSession {
    session_id: String,
    connected: Arc<AtomicBool>,
    sender: Arc<Mutex<WsSink>>,
    receiver: Arc<Mutex<Inbound>>,
}

impl GeminiLiveSession {
    /// Connect, send `setup` and wait for `setupComplete`.
    ///
    /// `timeout` bounds the WebSocket handshake and the setup acknowledgement
    /// together.
    pub async fn connect(
        endpoint: &str,
        api_key: &SecretString,
        setup: SessionSetup,
        timeout: Duration,
    ) -> Result<Self> {
        // Several providers may race to install; the first one wins.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let url = url::Url::parse_with_params(endpoint, [("key", api_key.expose_secret())])
            .map_err(|e| VoiceError::config(format!("Invalid endpoint URL: {}", e)))?;
        let request = url.as_str().into_client_request().map_err(|e| {
            VoiceError::transport(format!("Failed to create client request: {}", e))
        })?;

        let handshake = async {
            let (stream, _response) = connect_async(request)
                .await
                .map_err(|e| VoiceError::transport(format!("WebSocket connect error: {}", e)))?;
            let (sink, source) = stream.split();

            let session = Self {
                session_id: uuid::Uuid::new_v4().to_string(),
                connected: Arc::new(AtomicBool::new(true)),
                sender: Arc::new(Mutex::new(sink)),
                receiver: Arc::new(Mutex::new(Inbound { source, pending: VecDeque::new() })),
            };

            tracing::info!(model_id = %setup.model, voice = %setup.voice, "Sending setup message");
            session.send_raw(&ClientMessage::setup(&setup)).await?;
            session.await_setup_complete().await?;
            Ok::<_, VoiceError>(session)
        };

        let session = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| VoiceError::Timeout(format!("no setupComplete within {:?}", timeout)))??;

        tracing::info!(session_id = %session.session_id, "Gemini Live session ready");
        Ok(session)
    }

    async fn await_setup_complete(&self) -> Result<()> {
        let mut inbound = self.receiver.lock().await;
        loop {
            let events = match self.receive_batch(&mut inbound.source).await {
                Some(events) => events?,
                None => {
                    return Err(VoiceError::transport("Connection closed before setup completed"));
                }
            };
            let mut ready = false;
            for event in events {
                match event {
                    LiveEvent::SetupComplete => ready = true,
                    LiveEvent::Error { code, message } => {
                        return Err(VoiceError::transport(format!(
                            "Setup rejected ({}): {}",
                            code.map(|c| c.to_string()).unwrap_or_else(|| "no code".into()),
                            message
                        )));
                    }
                    other => inbound.pending.push_back(other),
                }
            }
            if ready {
                return Ok(());
            }
        }
    }

    /// Send a raw message.
    async fn send_raw(&self, message: &ClientMessage) -> Result<()> {
        let text = message.to_json()?;
        let mut sender = self.sender.lock().await;
        sender
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| VoiceError::transport(format!("Send error: {}", e)))?;
        Ok(())
    }

    /// Read frames until one parses into events. `None` when the socket closed.
    async fn receive_batch(&self, source: &mut WsSource) -> Option<Result<Vec<LiveEvent>>> {
        loop {
            match source.next().await {
                Some(Ok(Message::Text(text))) => return Some(parse_server_message(&text)),
                Some(Ok(Message::Binary(bytes))) => {
                    // Gemini sends JSON in binary frames too.
                    return Some(match std::str::from_utf8(&bytes) {
                        Ok(text) => parse_server_message(text),
                        Err(e) => Err(VoiceError::protocol(format!(
                            "Invalid UTF-8 in binary message: {}",
                            e
                        ))),
                    });
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(session_id = %self.session_id, ?frame, "Server closed the session");
                    self.connected.store(false, Ordering::SeqCst);
                    return None;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Some(Err(VoiceError::transport(format!("Receive error: {}", e))));
                }
                None => {
                    self.connected.store(false, Ordering::SeqCst);
                    return None;
                }
            }
        }
    }
}

#[async_trait]
impl LiveSession for GeminiLiveSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_media(&self, blob: &TransportBlob) -> Result<()> {
        if !self.is_connected() {
            return Err(VoiceError::SessionClosed);
        }
        self.send_raw(&ClientMessage::media(blob)).await
    }

    async fn next_event(&self) -> Option<Result<LiveEvent>> {
        let mut inbound = self.receiver.lock().await;
        loop {
            if let Some(event) = inbound.pending.pop_front() {
                return Some(Ok(event));
            }
            match self.receive_batch(&mut inbound.source).await? {
                Ok(events) => inbound.pending.extend(events),
                Err(e) => return Some(Err(e)),
            }
        }
    }

    async fn close(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let mut sender = self.sender.lock().await;
        sender
            .send(Message::Close(None))
            .await
            .map_err(|e| VoiceError::transport(format!("Close error: {}", e)))?;
        Ok(())
    }
}

impl std::fmt::Debug for GeminiLiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiLiveSession")
            .field("session_id", &self.session_id)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish()
    }
}
