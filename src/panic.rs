//! Formatting of panic payloads raised by call handlers.
//!
//! Handlers run on blocking worker threads. A panic there unwinds through
//! the reactor's `catch_unwind`, which logs the payload with
//! [`format_panic`] and keeps serving the connection.

use std::{any::Any, fmt};

/// Wrapper that renders a panic payload when logged or displayed.
///
/// `String` and `&'static str` payloads are printed verbatim. Anything else
/// is printed with `Debug`, which only names the payload type.
///
/// ```
/// use callframe::panic::format_panic;
///
/// assert_eq!(format_panic(Box::new("handler blew up")).to_string(), "handler blew up");
/// assert_eq!(
///     format_panic(Box::new(format!("call {} failed", 7))).to_string(),
///     "call 7 failed"
/// );
/// assert!(format_panic(Box::new(5_u32)).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl PanicMessage {
    /// The message, when the payload is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.0
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| self.0.downcast_ref::<&'static str>().copied())
    }
}

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(message) => f.write_str(message),
            None => write!(f, "{:?}", self.0),
        }
    }
}

/// Create a [`PanicMessage`] for the given payload.
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }
