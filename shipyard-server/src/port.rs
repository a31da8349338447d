//! Port allocation for released processes

use thiserror::Error;

const LOWEST_PORT: u16 = 1024;
const HIGHEST_PORT: u16 = 65534;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("invalid port range {min}-{max}")]
    InvalidPortRange { min: u16, max: u16 },

    #[error("no port available")]
    NoPortAvailable,
}

/// Checks `1024 <= min <= max <= 65534`
pub fn check_range(min: u16, max: u16) -> Result<(), PortError> {
    if min < LOWEST_PORT || min > max || max > HIGHEST_PORT {
        return Err(PortError::InvalidPortRange { min, max });
    }
    Ok(())
}

/// Free ports of a range
///
/// Fresh ports are handed out low to high; released ports are reused first.
#[derive(Debug, Clone)]
pub struct PortPool {
    available: Vec<u16>,
}

impl PortPool {
    pub fn new(min: u16, max: u16) -> Result<Self, PortError> {
        check_range(min, max)?;
        Ok(Self {
            available: (min..=max).rev().collect(),
        })
    }

    pub fn get_port(&mut self) -> Result<u16, PortError> {
        self.available.pop().ok_or(PortError::NoPortAvailable)
    }

    /// Returns a leased port; callers must not release twice
    pub fn release_port(&mut self, port: u16) {
        self.available.push(port);
    }

    pub fn available(&self) -> usize {
        self.available.len()
    }
}
