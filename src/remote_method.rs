//! Routing identity of an inbound call.

use std::fmt;

use bincode::{Decode, Encode};
use serde::Serialize;

/// Service and method pair a call is addressed to.
///
/// Set once while the request header is parsed and never changed afterwards.
///
/// # Examples
///
/// ```
/// use callframe::remote_method::RemoteMethod;
///
/// let method = RemoteMethod::new("Echo", "echo");
/// assert_eq!(method.to_string(), "Echo.echo");
/// assert_eq!(method, RemoteMethod::new("Echo", "echo"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Encode, Decode, Serialize)]
pub struct RemoteMethod {
    service_name: String,
    method_name: String,
}

impl RemoteMethod {
    /// Create a new identity.
    #[must_use]
    pub fn new(service_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            method_name: method_name.into(),
        }
    }

    #[must_use]
    pub fn service_name(&self) -> &str { &self.service_name }

    #[must_use]
    pub fn method_name(&self) -> &str { &self.method_name }
}

impl fmt::Display for RemoteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service_name, self.method_name)
    }
}
