//! Member retrieval by ID.
//!
//! Reads a single member straight from the configured store, bypassing the
//! model entirely. Used by `mchat get` to inspect what the pipeline would
//! resolve.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::models::Member;
use crate::store;

/// Core get function returning structured data.
pub async fn get_member(config: &Config, id: i64) -> Result<Member> {
    let store = store::open(config).await?;
    match store.find_by_id(id).await? {
        Some(member) => Ok(member),
        None => bail!("member not found: {}", id),
    }
}

/// CLI entry point. Calls get_member and prints to stdout.
pub async fn run_get(config: &Config, id: i64) -> Result<()> {
    let member = match get_member(config, id).await {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("--- Member ---");
    println!("id:             {}", member.member_id);
    println!(
        "name:           {}",
        member.full_name().as_deref().unwrap_or("(unnamed)")
    );
    if let Some(ref email) = member.email {
        println!("email:          {}", email);
    }

    match member.detail {
        Some(ref d) => {
            println!();
            println!("--- Detail ---");
            let fields = [
                ("occupation", d.occupation.clone()),
                ("address1", d.address1.clone()),
                ("address2", d.address2.clone()),
                ("city", d.city.clone()),
                ("country", d.country.clone()),
                ("zipcode", d.zipcode.map(|z| z.to_string())),
                ("phone_number", d.phone_number.clone()),
                ("user_name", d.user_name.clone()),
                ("profile_status", d.profile_status.clone()),
            ];
            for (label, value) in fields {
                if let Some(value) = value {
                    println!("{:<15} {}", format!("{}:", label), value);
                }
            }
        }
        None => {
            println!();
            println!("(no detail row)");
        }
    }

    Ok(())
}
