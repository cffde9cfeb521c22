use super::GEMINI_LIVE_URL;
use super::session::GeminiLiveSession;
use crate::error::Result;
use crate::session::{BoxedSession, LiveConnector, SessionSetup};
use async_trait::async_trait;
use secrecy::SecretString;
use std::time::Duration;
use tracing::Instrument;

/// Opens Gemini Live sessions with an API key.
///
/// # Example
///
/// ```rust,ignore
/// use fala_realtime::gemini::GeminiConnector;
///
/// let connector = GeminiConnector::new(api_key).with_connect_timeout(Duration::from_secs(5));
/// let session = connector.connect(setup).await?;
/// ```
#[derive(Debug, Clone)]
pub struct GeminiConnector {
    api_key: SecretString,
    endpoint: String,
    connect_timeout: Duration,
}

impl GeminiConnector {
    pub fn new(api_key: impl Into<SecretString>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: GEMINI_LIVE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Point at a different WebSocket endpoint (proxies, regional hosts).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LiveConnector for GeminiConnector {
    fn provider(&self) -> &str {
        "gemini"
    }

    async fn connect(&self, setup: SessionSetup) -> Result<BoxedSession> {
        let span = fala_telemetry::transport_span(self.provider(), &setup.model);
        let session =
            GeminiLiveSession::connect(&self.endpoint, &self.api_key, setup, self.connect_timeout)
                .instrument(span)
                .await?;
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let connector = GeminiConnector::new("key".to_string());
        assert_eq!(connector.endpoint(), GEMINI_LIVE_URL);
        assert_eq!(connector.provider(), "gemini");
        assert!(!format!("{:?}", connector).contains("\"key\""));
    }

    #[test]
    fn test_builders() {
        let connector = GeminiConnector::new("key".to_string())
            .with_endpoint("wss://localhost:9000/live")
            .with_connect_timeout(Duration::from_secs(2));
        assert_eq!(connector.endpoint(), "wss://localhost:9000/live");
        assert_eq!(connector.connect_timeout, Duration::from_secs(2));
    }
}
