//! Fixture loading into SQLite.
//!
//! A fixture is a JSON array of members. Each entry may carry a `pass`
//! field; it is written to the credential column and never read back.
//!
//! ```json
//! [
//!   {
//!     "member_id": 123,
//!     "first_name": "Ada",
//!     "last_name": "Lovelace",
//!     "email": "ada@example.com",
//!     "pass": "hunter2",
//!     "detail": { "phone_number": "555-1111", "city": "London" }
//!   }
//! ]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::models::Member;
use crate::store::SqliteStore;

#[derive(Debug, Deserialize)]
pub struct SeedMember {
    #[serde(flatten)]
    pub member: Member,
    #[serde(default)]
    pub pass: Option<String>,
}

pub fn load_fixture(path: &Path) -> Result<Vec<SeedMember>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse fixture: {}", path.display()))
}

/// Upsert every fixture member. Returns how many were written.
pub async fn seed_members(config: &Config, path: &Path) -> Result<usize> {
    let members = load_fixture(path)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    for entry in &members {
        if entry.member.member_id <= 0 {
            anyhow::bail!(
                "invalid member_id {} in {}",
                entry.member.member_id,
                path.display()
            );
        }
        store
            .upsert_member(&entry.member, entry.pass.as_deref())
            .await
            .with_context(|| format!("Failed to upsert member {}", entry.member.member_id))?;
    }

    store.pool().close().await;
    tracing::info!(count = members.len(), fixture = %path.display(), "seeded members");
    Ok(members.len())
}

/// CLI entry point.
pub async fn run_seed(config: &Config, path: &Path) -> Result<()> {
    let count = seed_members(config, path).await?;
    println!("Seeded {} member(s) into {}", count, config.db.path.display());
    Ok(())
}
