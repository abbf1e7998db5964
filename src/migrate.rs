use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Members, including the credential column the pipeline never reads
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS member (
            memberid INTEGER PRIMARY KEY,
            firstname TEXT,
            lastname TEXT,
            email TEXT,
            pass TEXT
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // One optional detail row per member
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS member_detail (
            memberid INTEGER PRIMARY KEY,
            occupation TEXT,
            address1 TEXT,
            address2 TEXT,
            city TEXT,
            country TEXT,
            zipcode INTEGER,
            phon_number TEXT,
            user_name TEXT,
            profile_status TEXT,
            FOREIGN KEY (memberid) REFERENCES member(memberid)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_member_firstname ON member(firstname)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_member_lastname ON member(lastname)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
