//! Run the node until Ctrl+C.

use anyhow::Result;
use resq_core::StatusSummary;
use resq_types::now_millis;
use std::future::Future;
use std::time::Duration;

use super::{Node, NodeOptions};

/// How often transport health is logged.
const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// Run the serve command.
pub async fn run(options: &NodeOptions, rebroadcast: bool) -> Result<()> {
    let node = Node::open(options).await?;
    run_until(node, rebroadcast, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    })
    .await
}

/// Merge inbound records and report changes until `shutdown` resolves.
pub async fn run_until<F>(mut node: Node, rebroadcast: bool, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    println!("resq node {} serving", node.identity.id);
    for provider in node.engine.orchestrator().provider_status() {
        println!("  transport: {}", provider.name);
    }
    if node.engine.orchestrator().provider_count() == 0 {
        println!("  (no transports; only local changes will be seen)");
    }
    println!("Press Ctrl+C to stop.");

    let mut updates = node.engine.subscribe();
    let inbound = node.spawn_inbound();

    if rebroadcast {
        let count = node.engine.rebroadcast_open().await?;
        println!("Re-broadcasting {} open requests.", count);
    }

    let mut health = tokio::time::interval(HEALTH_INTERVAL);
    health.tick().await;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let summary = StatusSummary::from_requests(updates.borrow_and_update().iter());
                println!(
                    "requests: {} total, {} open, {} resolved",
                    summary.total,
                    summary.open(),
                    summary.resolved
                );
            }
            _ = health.tick() => {
                let orchestrator = node.engine.orchestrator();
                for status in orchestrator.provider_status() {
                    tracing::info!(
                        provider = %status.name,
                        available = status.available,
                        ok = status.broadcasts_ok,
                        failed = status.broadcasts_failed,
                        deliveries = status.deliveries,
                        "Transport health"
                    );
                }
                tracing::info!(
                    connected = orchestrator.connected_peers(now_millis()),
                    "Peers"
                );
            }
        }
    }

    if let Some(handle) = inbound {
        handle.abort();
    }
    node.shutdown().await;
    println!("Stopped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{create, list};
    use tempfile::tempdir;

    fn drop_files(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".resq"))
            .count()
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let node = Node::open(&NodeOptions::local(dir.path())).await.unwrap();

        run_until(node, false, async {}).await.unwrap();
    }

    #[tokio::test]
    async fn serve_merges_from_drop_dir() {
        let shared = tempdir().unwrap();
        let sender_dir = tempdir().unwrap();
        let handler_dir = tempdir().unwrap();
        let sender = NodeOptions::shared(sender_dir.path(), shared.path());
        let handler = NodeOptions::shared(handler_dir.path(), shared.path());

        let request = create::run(&sender, "supplies", "Water for 30 people", None)
            .await
            .unwrap();

        let node = Node::open(&handler).await.unwrap();
        run_until(
            node,
            false,
            tokio::time::sleep(Duration::from_millis(500)),
        )
        .await
        .unwrap();

        let merged = list::run(&handler, false).await.unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, request.id);
        assert_eq!(merged[0].status_history, request.status_history);
    }

    #[tokio::test]
    async fn serve_rebroadcasts_offline_requests() {
        let dir = tempdir().unwrap();
        let shared = tempdir().unwrap();

        // Created while no transport was configured.
        create::run(&NodeOptions::local(dir.path()), "rescue", "Family on the roof", None)
            .await
            .unwrap();
        assert_eq!(drop_files(shared.path()), 0);

        let node = Node::open(&NodeOptions::shared(dir.path(), shared.path()))
            .await
            .unwrap();
        run_until(node, true, async {}).await.unwrap();

        assert_eq!(drop_files(shared.path()), 1);
    }
}
