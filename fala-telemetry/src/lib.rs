//! # fala-telemetry
//!
//! Structured logging for fala voice lessons, built on `tracing`.
//!
//! ## Features
//! - Console logging with targets, thread ids and line numbers
//! - JSON logging for log shippers
//! - `RUST_LOG` filtering with a sensible default
//! - Span helpers for sessions, transports and conversation turns
//!
//! ## Usage
//!
//! ```rust
//! use fala_telemetry::{init_telemetry, info, voice_session_span};
//!
//! fn main() -> Result<(), fala_telemetry::TelemetryError> {
//!     init_telemetry("fala")?;
//!
//!     let span = voice_session_span("a1/cafe/order", "Lucas", "Puck");
//!     let _enter = span.enter();
//!     info!("Lesson started");
//!     Ok(())
//! }
//! ```

pub mod init;
pub mod spans;

// Re-export tracing macros for convenience
pub use tracing::{Span, debug, error, info, instrument, trace, warn};

pub use init::{LogFormat, TelemetryError, init_telemetry, init_with_format};
pub use spans::*;
