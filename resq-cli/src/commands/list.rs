//! List requests.

use anyhow::Result;
use resq_node::RequestStore;
use resq_types::DisasterRequest;

use super::{request_line, NodeOptions};

/// Run the list command. Newest first.
pub async fn run(options: &NodeOptions, json: bool) -> Result<Vec<DisasterRequest>> {
    let config = options.load_config()?;
    let store = options.open_store(&config).await?;
    let requests = store.list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&requests)?);
    } else if requests.is_empty() {
        println!("No requests.");
    } else {
        println!("ID        STATUS        TYPE       DESCRIPTION");
        for request in &requests {
            println!("{}", request_line(request));
        }
    }

    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::create;
    use tempfile::tempdir;

    #[tokio::test]
    async fn list_empty() {
        let dir = tempdir().unwrap();
        let requests = run(&NodeOptions::local(dir.path()), false).await.unwrap();
        assert!(requests.is_empty());
    }

    #[tokio::test]
    async fn list_newest_first() {
        let dir = tempdir().unwrap();
        let options = NodeOptions::local(dir.path());

        let first = create::run(&options, "medical", "First aid kit needed", None)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = create::run(&options, "info", "Road to the school is blocked", None)
            .await
            .unwrap();

        let requests = run(&options, true).await.unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].id, second.id);
        assert_eq!(requests[1].id, first.id);
    }
}
