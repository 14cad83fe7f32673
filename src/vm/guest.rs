// file: src/vm/guest.rs
// version: 1.0.0
// guid: 48c2e7a0-9b56-4d13-a7f8-03d61b92e5c4

//! Guest-property polling
//!
//! The hypervisor exposes guest facts as `key: value` text; the orchestrator
//! parses the value after the first colon and accepts only a syntactically
//! valid IPv4 literal. Poll exhaustion is a deliberately soft failure: the
//! operator intervenes, the process does not abort.

use crate::{process, Result};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Guest property the assigned address is read from
const GUEST_IP_PROPERTY: &str = "/VirtualBox/GuestInfo/Net/0/V4/IP";

/// One query against the guest's reported properties
#[async_trait]
pub trait GuestQuery: Send + Sync {
    async fn ip_property(&self) -> Result<String>;
}

/// Live query through `VBoxManage guestproperty get`
pub struct VBoxGuestQuery {
    uuid: String,
}

impl VBoxGuestQuery {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self { uuid: uuid.into() }
    }
}

#[async_trait]
impl GuestQuery for VBoxGuestQuery {
    async fn ip_property(&self) -> Result<String> {
        process::run_checked(
            "VBoxManage",
            &["guestproperty", "get", &self.uuid, GUEST_IP_PROPERTY],
        )
        .await
    }
}

/// Bounded retry parameters for the readiness poll
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            delay: Duration::from_secs(10),
        }
    }
}

/// Result of the readiness poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Guest reported a usable address on some attempt
    Ready(Ipv4Addr),
    /// All attempts consumed without a valid address
    Exhausted { attempts: u32 },
}

/// Extract the value after the first colon of a `key: value` line
pub fn parse_property_value(output: &str) -> Option<&str> {
    output
        .split_once(':')
        .map(|(_, value)| value.trim())
        .filter(|v| !v.is_empty())
}

/// Poll until the guest reports a valid IPv4 address or attempts run out
///
/// Each failed attempt sleeps the configured delay before the next query.
/// Exhaustion is reported, never raised as an error.
pub async fn poll_guest_ip(query: &dyn GuestQuery, config: &PollConfig) -> Result<PollOutcome> {
    for attempt in 1..=config.max_attempts {
        debug!("Guest IP poll attempt {}/{}", attempt, config.max_attempts);

        match query.ip_property().await {
            Ok(output) => {
                if let Some(value) = parse_property_value(&output) {
                    if let Ok(ip) = Ipv4Addr::from_str(value) {
                        info!("Guest reported IP {} on attempt {}", ip, attempt);
                        return Ok(PollOutcome::Ready(ip));
                    }
                    debug!("Guest property not a valid IP yet: {}", value);
                }
            }
            Err(e) => debug!("Guest property query failed: {}", e),
        }

        if attempt < config.max_attempts {
            tokio::time::sleep(config.delay).await;
        }
    }

    warn!(
        "Guest never reported a usable IP after {} attempts",
        config.max_attempts
    );
    Ok(PollOutcome::Exhausted {
        attempts: config.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubQuery {
        calls: AtomicU32,
        ready_on: Option<u32>,
    }

    impl StubQuery {
        fn ready_on(n: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                ready_on: Some(n),
            }
        }

        fn never_ready() -> Self {
            Self {
                calls: AtomicU32::new(0),
                ready_on: None,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GuestQuery for StubQuery {
        async fn ip_property(&self) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.ready_on {
                Some(ready) if n >= ready => Ok("Value: 192.168.56.101".to_string()),
                _ => Ok("No value set!".to_string()),
            }
        }
    }

    fn fast_config(max_attempts: u32) -> PollConfig {
        PollConfig {
            max_attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_parse_property_value() {
        assert_eq!(parse_property_value("Value: 10.0.2.15"), Some("10.0.2.15"));
        assert_eq!(parse_property_value("Value:    spaced   "), Some("spaced"));
        assert_eq!(parse_property_value("No value set!"), None);
        assert_eq!(parse_property_value("Value:"), None);
    }

    #[tokio::test]
    async fn test_poll_succeeds_on_attempt_n_with_exactly_n_queries() {
        let stub = StubQuery::ready_on(3);
        let outcome = poll_guest_ip(&stub, &fast_config(5)).await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Ready("192.168.56.101".parse().unwrap())
        );
        assert_eq!(stub.calls(), 3);
    }

    #[tokio::test]
    async fn test_poll_exhaustion_is_soft() {
        let stub = StubQuery::never_ready();
        let outcome = poll_guest_ip(&stub, &fast_config(4)).await.unwrap();
        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 4 });
        assert_eq!(stub.calls(), 4);
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let stub = StubQuery::ready_on(1);
        let outcome = poll_guest_ip(&stub, &fast_config(5)).await.unwrap();
        assert!(matches!(outcome, PollOutcome::Ready(_)));
        assert_eq!(stub.calls(), 1);
    }
}
