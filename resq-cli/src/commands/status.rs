//! Show identity, request counts and transports.

use anyhow::Result;
use resq_core::StatusSummary;

use super::{Node, NodeOptions};

/// Run the status command.
pub async fn run(options: &NodeOptions) -> Result<StatusSummary> {
    let node = Node::open(options).await?;
    let summary = node.engine.summary().await?;
    let providers = node.engine.orchestrator().provider_status();
    node.shutdown().await;

    println!("resq status");
    println!("===========");
    println!();
    println!("Device:");
    println!("  ID:   {}", node.identity.id);
    println!(
        "  Role: {}",
        node.identity.role.map_or("(none)", |r| r.label())
    );
    println!();
    println!("Requests:");
    println!("  Total:        {}", summary.total);
    println!("  Created:      {}", summary.created);
    println!("  Forwarded:    {}", summary.forwarded);
    println!("  Received:     {}", summary.received);
    println!("  Acknowledged: {}", summary.acknowledged);
    println!("  Resolved:     {}", summary.resolved);
    println!("  Open:         {}", summary.open());
    println!();
    println!("Transports:");
    if providers.is_empty() {
        println!("  (none configured, pass --drop-dir or set [drop_dir] in resq.toml)");
    }
    for provider in &providers {
        println!(
            "  {:<10} {}",
            provider.name,
            if provider.available {
                "available"
            } else {
                "unavailable"
            }
        );
    }
    if let Some(dir) = &node.config.drop_dir.directory {
        println!("  Drop directory: {}", dir.display());
    }

    Ok(summary)
}
