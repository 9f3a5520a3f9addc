//! Meshcast Local - In-Process Rounds
//!
//! Runs every node of a tree inside one tokio runtime so protocols can be
//! exercised end to end without sockets.
//!
//! - [`LocalNetwork`]: dialer and message router shared by all nodes, with
//!   fault injection (unreachable nodes, blocked links, flaky peers, latency)
//! - [`LocalTest`] / [`LocalRound`]: instantiate a registered protocol on
//!   every node, start them together and wait for completion
//! - [`SimConfig`]: environment-driven settings for the `meshcast-sim` binary
//!
//! # Example
//!
//! ```no_run
//! use meshcast_local::LocalTest;
//! use meshcast_protocols::{Broadcast, BroadcastConfig};
//!
//! # async fn demo() -> meshcast_protocols::Result<()> {
//! let mut test = LocalTest::new(BroadcastConfig::default())?;
//! let tree = test.gen_tree(10, 2)?;
//! let mut round = test.create_round(Broadcast::NAME, tree)?;
//! let report = round.run().await?;
//! println!("{} nodes meshed in {:?}", report.nodes, report.elapsed);
//! round.close_all().await;
//! # Ok(())
//! # }
//! ```

mod network;
mod sim;

pub use local_test::{LocalRound, LocalTest, RoundReport, DEFAULT_BASE_PORT};
pub use network::{LocalConnection, LocalNetwork, RoundDialer};
pub use sim::{SimConfig, DEFAULT_NODES, ENV_BRANCHING, ENV_NODES, ENV_UNREACHABLE};
