//! ICMP Echo Adapter
//!
//! Implements the `EchoProber` port with `surge-ping` sockets.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, SurgeError, ICMP};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::ports::{EchoProber, PingOutcome};

/// Echo prober over ICMP sockets.
///
/// One client per address family. A family whose socket could not be opened
/// (missing privileges, no IPv6 stack) reports [`PingOutcome::Error`] for
/// every target of that family instead of failing startup.
pub struct IcmpProber {
    v4: Option<Client>,
    v6: Option<Client>,
    identifier: u16,
    sequence: AtomicU16,
}

impl IcmpProber {
    /// Open the ICMP sockets. Must be called inside a tokio runtime.
    pub fn new() -> Self {
        let v4 = Client::new(&Config::default())
            .map_err(|e| warn!("ICMPv4 socket unavailable, pings will fail: {}", e))
            .ok();
        let v6 = Client::new(&Config::builder().kind(ICMP::V6).build())
            .map_err(|e| debug!("ICMPv6 socket unavailable: {}", e))
            .ok();

        Self {
            v4,
            v6,
            identifier: rand::random(),
            sequence: AtomicU16::new(0),
        }
    }

    async fn resolve(target: &str) -> Option<IpAddr> {
        if let Ok(ip) = target.parse::<IpAddr>() {
            return Some(ip);
        }

        match tokio::net::lookup_host((target, 0)).await {
            Ok(mut addrs) => addrs.next().map(|addr| addr.ip()),
            Err(e) => {
                debug!(target, "Name resolution failed: {}", e);
                None
            }
        }
    }
}

impl Default for IcmpProber {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IcmpProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcmpProber")
            .field("v4", &self.v4.is_some())
            .field("v6", &self.v6.is_some())
            .field("identifier", &self.identifier)
            .finish()
    }
}

/// Time left before `deadline`, or `None` once it has passed.
fn remaining_budget(deadline: Instant, now: Instant) -> Option<Duration> {
    deadline.checked_duration_since(now).filter(|left| !left.is_zero())
}

#[async_trait]
impl EchoProber for IcmpProber {
    async fn echo(&self, target: &str, payload: &[u8], timeout: Duration) -> PingOutcome {
        let deadline = Instant::now() + timeout;
        let ip = match tokio::time::timeout_at(deadline, Self::resolve(target)).await {
            Ok(Some(ip)) => ip,
            Ok(None) => return PingOutcome::Unreachable,
            Err(_) => return PingOutcome::Timeout,
        };
        let Some(remaining) = remaining_budget(deadline, Instant::now()) else {
            return PingOutcome::Timeout;
        };

        let client = match ip {
            IpAddr::V4(_) => self.v4.as_ref(),
            IpAddr::V6(_) => self.v6.as_ref(),
        };
        let Some(client) = client else {
            return PingOutcome::Error;
        };

        let mut pinger = client.pinger(ip, PingIdentifier(self.identifier)).await;
        pinger.timeout(remaining);

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        match pinger.ping(PingSequence(seq), payload).await {
            Ok((_, rtt)) => PingOutcome::Success(rtt),
            Err(SurgeError::Timeout { .. }) => PingOutcome::Timeout,
            Err(e) => {
                debug!(target, %ip, "Echo request failed: {}", e);
                PingOutcome::Unreachable
            }
        }
    }
}
