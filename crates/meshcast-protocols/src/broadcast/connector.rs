//! Connection Establisher: one peer, bounded retries.

use std::sync::Arc;
use std::time::Duration;

use meshcast_tree::NodeIdentity;
use tracing::{debug, trace};

use crate::config::BroadcastConfig;
use crate::transport::{Connection, DialError, Dialer};

/// Outcome of [`ConnectionEstablisher::connect`].
#[derive(Debug)]
pub enum ConnectionResult {
    /// A dial succeeded after `attempts` tries.
    Connected {
        link: Box<dyn Connection>,
        attempts: u32,
    },
    /// All `attempts` tries failed; `error` is the last failure.
    Failed { attempts: u32, error: DialError },
}

impl ConnectionResult {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Connected { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Dials peers with a fixed attempt budget and a fixed pause between
/// attempts. Cheap to clone; one clone per concurrent dial.
#[derive(Clone)]
pub struct ConnectionEstablisher {
    dialer: Arc<dyn Dialer>,
    retry_max: u32,
    retry_wait: Duration,
}

impl ConnectionEstablisher {
    pub fn new(dialer: Arc<dyn Dialer>, config: &BroadcastConfig) -> Self {
        Self {
            dialer,
            retry_max: config.retry_max.max(1),
            retry_wait: config.retry_wait,
        }
    }

    /// Try to connect `me` to `peer`.
    ///
    /// Makes at most `retry_max` attempts and sleeps `retry_wait` between
    /// two consecutive ones, never after the last. Dropping the returned
    /// future abandons the remaining attempts.
    pub async fn connect(&self, me: &NodeIdentity, peer: &NodeIdentity) -> ConnectionResult {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.dialer.dial(me, peer).await {
                Ok(link) => {
                    trace!(from = %me.id, to = %peer.id, attempt, "connected");
                    return ConnectionResult::Connected {
                        link,
                        attempts: attempt,
                    };
                }
                Err(error) if attempt >= self.retry_max => {
                    debug!(
                        from = %me.id,
                        to = %peer.id,
                        attempts = attempt,
                        %error,
                        "giving up on peer"
                    );
                    return ConnectionResult::Failed {
                        attempts: attempt,
                        error,
                    };
                }
                Err(error) => {
                    trace!(from = %me.id, to = %peer.id, attempt, %error, "dial failed, retrying");
                    tokio::time::sleep(self.retry_wait).await;
                }
            }
        }
    }
}
