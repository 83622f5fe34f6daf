//! Append a status change to a request.

use anyhow::{Context, Result};
use resq_core::{can_transition, role_actions};
use resq_types::{now_millis, DisasterRequest, RequestId, RequestStatus};

use super::{Node, NodeOptions};

/// Run the update command.
///
/// Accepts a full id or a unique prefix of one.
pub async fn run(options: &NodeOptions, id: &str, status: RequestStatus) -> Result<DisasterRequest> {
    let node = Node::open(options).await?;
    let id = resolve_id(&node, id).await?;

    if let Some(current) = node.engine.request(&id).await? {
        if !can_transition(current.status, status) {
            eprintln!(
                "warning: {} -> {} is outside the usual lifecycle",
                current.status, status
            );
        } else if let Some(role) = node.identity.role {
            if !role_actions(role, current.status).contains(&status) {
                eprintln!(
                    "warning: a {} does not normally mark requests {}",
                    role.label(),
                    status
                );
            }
        }
    }

    let updated = node
        .engine
        .update_status(&id, status, now_millis())
        .await
        .with_context(|| format!("Failed to update request {}", id))?;
    node.shutdown().await;

    println!("Request {} is now {}.", updated.id, updated.status);
    println!();
    for entry in &updated.status_history {
        println!(
            "  {:<12}  {}  by {}",
            entry.status.as_str(),
            entry.timestamp,
            entry.updated_by
        );
    }

    Ok(updated)
}

async fn resolve_id(node: &Node, prefix: &str) -> Result<RequestId> {
    let matches: Vec<RequestId> = node
        .engine
        .requests()
        .await?
        .into_iter()
        .map(|r| r.id)
        .filter(|id| id.as_str().starts_with(prefix))
        .collect();

    match matches.as_slice() {
        [only] => Ok(only.clone()),
        [] => Ok(RequestId::from(prefix)),
        _ => anyhow::bail!("Id prefix {} matches {} requests", prefix, matches.len()),
    }
}
