use std::time::Duration;

use civ_protocol::protocol::{ADDR_CONTROLLER, ADDR_IC705, parse_address};
use civ_protocol::transport::serial::BAUD_RATE;

use crate::error::{Error, Result};

/// Environment variable overriding the radio's CI-V address (hex).
pub const RADIO_ADDR_VAR: &str = "CIV_RADIO_ADDR";
/// Environment variable overriding the controller's CI-V address (hex).
pub const CONTROLLER_ADDR_VAR: &str = "CIV_CONTROLLER_ADDR";

/// How long the poll task waits between queue checks.
///
/// Drains a backlog quickly, then backs off while the radio is quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait after a chunk was processed.
    pub busy: Duration,
    /// Wait after finding the queue empty.
    pub idle: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            busy: Duration::from_millis(1),
            idle: Duration::from_secs(1),
        }
    }
}

impl PollPolicy {
    pub fn delay(&self, processed: bool) -> Duration {
        if processed { self.busy } else { self.idle }
    }
}

/// Configuration for one serial session.
#[derive(Debug, Clone)]
pub struct CivConfig {
    /// Serial port name. `None` searches for an IC-705 by USB product string.
    pub port: Option<String>,
    /// Serial baud rate.
    pub baud_rate: u32,
    /// CI-V address of the radio.
    pub radio_addr: u8,
    /// CI-V address of the controller (this PC).
    pub controller_addr: u8,
    /// Chunks the ingest queue holds before the reader starts dropping.
    pub queue_capacity: usize,
    pub poll: PollPolicy,
    /// Blocking read timeout of the serial reader thread.
    pub read_timeout: Duration,
}

impl Default for CivConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: BAUD_RATE,
            radio_addr: ADDR_IC705,
            controller_addr: ADDR_CONTROLLER,
            queue_capacity: 64,
            poll: PollPolicy::default(),
            read_timeout: Duration::from_millis(100),
        }
    }
}

impl CivConfig {
    /// Defaults with `port` and the address overrides from the process environment.
    pub fn from_env(port: Option<String>) -> Result<Self> {
        Self::with_lookup(port, |var| std::env::var(var).ok())
    }

    /// Like [`CivConfig::from_env`] with a custom variable lookup.
    pub fn with_lookup<F>(port: Option<String>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            port: port.filter(|p| !p.is_empty()),
            ..Self::default()
        };
        if let Some(addr) = address_from(&lookup, RADIO_ADDR_VAR)? {
            config.radio_addr = addr;
        }
        if let Some(addr) = address_from(&lookup, CONTROLLER_ADDR_VAR)? {
            config.controller_addr = addr;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::ZeroQueueCapacity);
        }
        Ok(())
    }
}

fn address_from<F>(lookup: &F, var: &'static str) -> Result<Option<u8>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|text| parse_address(&text).map_err(|source| Error::Config { var, source }))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CivConfig::default();
        assert_eq!(config.port, None);
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.radio_addr, 0xA4);
        assert_eq!(config.controller_addr, 0xE0);
        assert_eq!(config.poll.busy, Duration::from_millis(1));
        assert_eq!(config.poll.idle, Duration::from_secs(1));
    }

    #[test]
    fn test_poll_delay() {
        let policy = PollPolicy::default();
        assert_eq!(policy.delay(true), Duration::from_millis(1));
        assert_eq!(policy.delay(false), Duration::from_secs(1));
    }

    #[test]
    fn test_env_overrides() {
        let config = CivConfig::with_lookup(Some("/dev/ttyACM0".into()), |var| match var {
            RADIO_ADDR_VAR => Some("0x94".into()),
            CONTROLLER_ADDR_VAR => Some("E1".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.radio_addr, 0x94);
        assert_eq!(config.controller_addr, 0xE1);
    }

    #[test]
    fn test_empty_port_means_discover() {
        let config = CivConfig::with_lookup(Some(String::new()), |_| None).unwrap();
        assert_eq!(config.port, None);
    }

    #[test]
    fn test_bad_address() {
        let err = CivConfig::with_lookup(None, |var| {
            (var == RADIO_ADDR_VAR).then(|| "radio".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config { var: RADIO_ADDR_VAR, .. }));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = CivConfig {
            queue_capacity: 0,
            ..CivConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::ZeroQueueCapacity)));
    }
}
