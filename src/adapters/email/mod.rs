//! Email adapters for the Notifier port.
//!
//! - `ResendNotifier` - Delivers through the Resend HTTP API
//! - `LoggingNotifier` - Logs instead of sending, used when no API key is set

mod logging;
mod resend;

pub use logging::LoggingNotifier;
pub use resend::ResendNotifier;
