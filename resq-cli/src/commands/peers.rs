//! Listen briefly and list devices seen.

use anyhow::Result;
use resq_types::{now_millis, Peer};
use std::time::Duration;

use super::{short_id, Node, NodeOptions};

/// Run the peers command.
///
/// Peers are only learned from inbound traffic, so the node listens for
/// `listen` before reporting. Records received meanwhile are merged.
pub async fn run(options: &NodeOptions, listen: Duration) -> Result<Vec<Peer>> {
    let mut node = Node::open(options).await?;
    if node.engine.orchestrator().provider_count() == 0 {
        println!("No transport configured; no peers can be seen.");
        return Ok(Vec::new());
    }

    let inbound = node.spawn_inbound();
    tokio::time::sleep(listen).await;
    let peers = node.engine.orchestrator().peers(now_millis());

    if let Some(handle) = inbound {
        handle.abort();
    }
    node.shutdown().await;

    if peers.is_empty() {
        println!("No peers seen in {} ms.", listen.as_millis());
    } else {
        println!("ID        ROLE         LAST SEEN      CONNECTED");
        for peer in &peers {
            println!(
                "{}  {:<11}  {:<13}  {}",
                short_id(peer.id.as_str()),
                peer.role.map_or("-", |r| r.label()),
                peer.last_seen,
                if peer.is_connected { "yes" } else { "no" }
            );
        }
    }

    Ok(peers)
}
