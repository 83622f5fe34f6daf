//! Create the device identity.

use anyhow::{Context, Result};
use resq_node::IdentityService;
use resq_types::{DeviceIdentity, Role};
use std::sync::Arc;

use super::NodeOptions;

/// Run the init command.
///
/// Safe to repeat: an existing device id is kept.
pub async fn run(options: &NodeOptions, role: Option<Role>) -> Result<DeviceIdentity> {
    let config = options.load_config()?;
    let store = options.open_store(&config).await?;
    let identity = IdentityService::new(Arc::clone(&store));

    let id = identity
        .get_or_create_device_id()
        .await
        .context("Failed to create device id")?;
    if let Some(role) = role {
        identity.set_role(role).await.context("Failed to save role")?;
    }
    let current = identity.load().await?;

    println!("Device ready.");
    println!();
    println!("  Device ID: {}", id);
    println!(
        "  Role:      {}",
        current.role.map_or("(none)", |r| r.label())
    );
    println!("  Database:  {}", config.storage.database.display());
    println!();
    if current.role.is_none() {
        println!("Next: pick a role with 'resq role set <sender|transporter|handler>'");
    } else {
        println!("Next: create a request with 'resq create --kind <type> --description <text>'");
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn init_creates_identity() {
        let dir = tempdir().unwrap();
        let identity = run(&NodeOptions::local(dir.path()), None).await.unwrap();

        assert!(!identity.id.is_empty());
        assert_eq!(identity.role, None);
        assert!(dir.path().join("resq.db").exists());
    }

    #[tokio::test]
    async fn init_is_repeatable() {
        let dir = tempdir().unwrap();
        let options = NodeOptions::local(dir.path());

        let first = run(&options, None).await.unwrap();
        let second = run(&options, Some(Role::RequestHandler)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.role, Some(Role::RequestHandler));
    }
}
