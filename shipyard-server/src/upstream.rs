//! Upstream registry
//!
//! Holds the address of the live release. The release workflow switches
//! it at cutover; the proxy reads it on every request.

use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("no upstream service registered")]
    ServiceNotFound,
}

pub trait Upstream: Send + Sync {
    /// Makes `addr` (`host:port`) the target of all proxied traffic
    fn set_default(&self, addr: String);

    fn get_default(&self) -> Result<String, UpstreamError>;
}

#[derive(Debug, Default)]
pub struct DefaultUpstream {
    current: Mutex<Option<String>>,
}

impl DefaultUpstream {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Upstream for DefaultUpstream {
    fn set_default(&self, addr: String) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(addr);
    }

    fn get_default(&self) -> Result<String, UpstreamError> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(UpstreamError::ServiceNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_upstream() {
        let upstream = DefaultUpstream::new();
        assert_eq!(upstream.get_default(), Err(UpstreamError::ServiceNotFound));

        upstream.set_default("localhost:8090".to_string());
        assert_eq!(upstream.get_default(), Ok("localhost:8090".to_string()));

        upstream.set_default("localhost:8091".to_string());
        assert_eq!(upstream.get_default(), Ok("localhost:8091".to_string()));
    }
}
