//! Show, set or clear the device role.

use anyhow::Result;
use resq_core::role_actions;
use resq_node::{IdentityService, SqliteStore};
use resq_types::{RequestStatus, Role};

use super::NodeOptions;

async fn identity(options: &NodeOptions) -> Result<IdentityService<SqliteStore>> {
    let config = options.load_config()?;
    let store = options.open_store(&config).await?;
    Ok(IdentityService::new(store))
}

/// Print the current role and what it can do.
pub async fn show(options: &NodeOptions) -> Result<()> {
    match identity(options).await?.role().await? {
        Some(role) => {
            println!("Role: {}", role.label());
            print_actions(role);
        }
        None => {
            println!("Role: (none)");
            println!();
            println!("Pick one with 'resq role set <sender|transporter|handler>'");
        }
    }
    Ok(())
}

/// Persist a new role.
pub async fn set(options: &NodeOptions, role: Role) -> Result<()> {
    identity(options).await?.set_role(role).await?;
    println!("Role set to {}.", role.label());
    print_actions(role);
    Ok(())
}

/// Forget the role.
pub async fn clear(options: &NodeOptions) -> Result<()> {
    identity(options).await?.clear_role().await?;
    println!("Role cleared.");
    Ok(())
}

fn print_actions(role: Role) {
    let transitions: Vec<String> = RequestStatus::ALL
        .into_iter()
        .flat_map(|from| {
            role_actions(role, from)
                .into_iter()
                .map(move |to| format!("{} -> {}", from, to))
        })
        .collect();

    if transitions.is_empty() {
        println!("  (no status changes for this role)");
    } else {
        println!("  Can apply: {}", transitions.join(", "));
    }
}
