//! Delete every request.

use anyhow::{bail, Result};

use super::{Node, NodeOptions};

/// Run the clear command. Identity and role are kept.
pub async fn run(options: &NodeOptions, yes: bool) -> Result<u64> {
    if !yes {
        bail!("This deletes every request on this device. Re-run with --yes to confirm.");
    }

    let node = Node::open(options).await?;
    let removed = node.engine.clear_all().await?;
    node.shutdown().await;

    println!("Deleted {} requests.", removed);
    Ok(removed)
}
