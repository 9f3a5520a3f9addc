//! Meshcast simulator
//!
//! Runs one Broadcast round over an in-process network and prints a JSON
//! report. Shape and faults come from `MESHCAST_*` environment variables.

use meshcast_local::{LocalTest, SimConfig};
use meshcast_protocols::Broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshcast_sim=info,meshcast_local=info,meshcast_protocols=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SimConfig::from_env()?;
    tracing::info!(
        nodes = config.nodes,
        branching = config.branching,
        unreachable = ?config.unreachable,
        policy = %config.broadcast.policy,
        "Starting simulation"
    );

    let mut test = LocalTest::new(config.broadcast.clone())?;
    let tree = test.gen_tree(config.nodes, config.branching)?;
    for &pos in &config.unreachable {
        test.network().set_unreachable(tree.identity(pos).id, true);
    }

    let mut round = test.create_round(Broadcast::NAME, tree)?;
    let outcome = round.run().await;
    round.close_all().await;

    let report = outcome?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
