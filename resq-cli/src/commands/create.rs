//! Create a request and broadcast it.

use anyhow::{Context, Result};
use resq_core::RequestDraft;
use resq_types::{now_millis, DisasterRequest, Location};

use super::{Node, NodeOptions};

/// Run the create command.
pub async fn run(
    options: &NodeOptions,
    kind: &str,
    description: &str,
    location: Option<Location>,
) -> Result<DisasterRequest> {
    let node = Node::open(options).await?;

    let mut draft = RequestDraft::new(kind, description);
    if let Some(location) = location {
        draft = draft.with_location(location);
    }

    let request = node
        .engine
        .create_request(draft, now_millis())
        .await
        .context("Failed to create request")?;
    node.shutdown().await;

    println!("Request created.");
    println!();
    println!("  ID:          {}", request.id);
    println!("  Type:        {}", request.kind);
    println!("  Description: {}", request.description);
    if let Some(location) = &request.location {
        println!(
            "  Location:    {:.5}, {:.5}",
            location.latitude, location.longitude
        );
    }
    if node.engine.orchestrator().provider_count() == 0 {
        println!();
        println!("No transport configured; the request is stored locally only.");
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use resq_types::RequestStatus;
    use tempfile::tempdir;

    #[tokio::test]
    async fn create_stores_request() {
        let dir = tempdir().unwrap();
        let options = NodeOptions::local(dir.path());

        let request = run(&options, "medical", "Two injured at the bridge", None)
            .await
            .unwrap();

        assert_eq!(request.status, RequestStatus::Created);
        assert_eq!(request.status_history.len(), 1);

        let listed = super::super::list::run(&options, false).await.unwrap();
        assert_eq!(listed, vec![request]);
    }

    #[tokio::test]
    async fn create_rejects_short_description() {
        let dir = tempdir().unwrap();
        let result = run(&NodeOptions::local(dir.path()), "medical", "help", None).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn create_writes_to_drop_dir() {
        let dir = tempdir().unwrap();
        let shared = tempdir().unwrap();
        let options = NodeOptions {
            data_dir: dir.path().to_path_buf(),
            drop_dir: Some(shared.path().to_path_buf()),
        };

        let location = Location {
            latitude: 14.5995,
            longitude: 120.9842,
        };
        let request = run(&options, "rescue", "Family on the roof", Some(location))
            .await
            .unwrap();

        let files: Vec<_> = std::fs::read_dir(shared.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".resq"))
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with(request.id.as_str()));
    }
}
