//! Span helpers for voice lesson operations
//!
//! Pre-configured spans so every crate names the same things the same way.

use tracing::Span;

/// Create the root span for one voice lesson.
///
/// `session_id` is left empty and filled with [`record_session_id`] once the
/// endpoint assigns one.
///
/// # Example
/// ```
/// use fala_telemetry::voice_session_span;
/// let span = voice_session_span("a1/cafe/order", "Lucas", "Puck");
/// let _enter = span.enter();
/// ```
pub fn voice_session_span(lesson_key: &str, coach: &str, voice: &str) -> Span {
    tracing::info_span!(
        "voice_session",
        lesson = lesson_key,
        coach = coach,
        voice = voice,
        session_id = tracing::field::Empty,
    )
}

/// Create a span around opening a live transport.
pub fn transport_span(provider: &str, model: &str) -> Span {
    tracing::info_span!("transport.connect", provider = provider, model = model)
}

/// Create a span for one completed conversation turn.
pub fn turn_span(turn: u32) -> Span {
    tracing::debug_span!("turn", turn = turn)
}

/// Record the endpoint-assigned session id on the current session span.
pub fn record_session_id(session_id: &str) {
    Span::current().record("session_id", session_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Instrument;

    #[test]
    fn test_spans_can_be_entered() {
        let span = voice_session_span("a1/cafe/order", "Lucas", "Puck");
        let _enter = span.enter();
        record_session_id("abc");
        let _turn = turn_span(3).entered();
    }

    #[tokio::test]
    async fn test_transport_span_instruments_future() {
        let value = async { 7 }.instrument(transport_span("gemini", "models/test")).await;
        assert_eq!(value, 7);
    }
}
