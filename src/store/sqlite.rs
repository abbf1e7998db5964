//! SQLite-backed [`RecordStore`].
//!
//! Every lookup is a parameterized query; no model-drafted text ever
//! reaches this module. The credential column is never selected.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{Member, MemberDetail};

use super::RecordStore;

const SELECT_MEMBER: &str = r#"
    SELECT m.memberid, m.firstname, m.lastname, m.email,
           md.memberid AS detail_id, md.occupation, md.address1, md.address2,
           md.city, md.country, md.zipcode, md.phon_number, md.user_name,
           md.profile_status
    FROM member m
    LEFT JOIN member_detail md ON m.memberid = md.memberid
"#;

/// Upper bound on name candidates; anything above one is ambiguous anyway.
const NAME_CANDIDATE_LIMIT: i64 = 10;

/// One name word, matched against either name column.
const WORD_FILTER: &str = "(LOWER(m.firstname) LIKE '%' || LOWER(?) || '%' ESCAPE '\\' \
     OR LOWER(m.lastname) LIKE '%' || LOWER(?) || '%' ESCAPE '\\')";

/// Make `%`, `_` and `\` match literally inside a LIKE pattern.
fn escape_like(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    for c in word.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a member and its detail row.
    pub async fn upsert_member(&self, member: &Member, pass: Option<&str>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO member (memberid, firstname, lastname, email, pass)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(memberid) DO UPDATE SET
                firstname = excluded.firstname,
                lastname = excluded.lastname,
                email = excluded.email,
                pass = COALESCE(excluded.pass, member.pass)
            "#,
        )
        .bind(member.member_id)
        .bind(&member.first_name)
        .bind(&member.last_name)
        .bind(&member.email)
        .bind(pass)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM member_detail WHERE memberid = ?")
            .bind(member.member_id)
            .execute(&mut *tx)
            .await?;

        if let Some(d) = &member.detail {
            sqlx::query(
                r#"
                INSERT INTO member_detail (memberid, occupation, address1, address2, city,
                                           country, zipcode, phon_number, user_name,
                                           profile_status)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(member.member_id)
            .bind(&d.occupation)
            .bind(&d.address1)
            .bind(&d.address2)
            .bind(&d.city)
            .bind(&d.country)
            .bind(d.zipcode)
            .bind(&d.phone_number)
            .bind(&d.user_name)
            .bind(&d.profile_status)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn member_from_row(row: &SqliteRow) -> Member {
    let detail_id: Option<i64> = row.get("detail_id");
    let detail = detail_id.map(|_| MemberDetail {
        occupation: row.get("occupation"),
        address1: row.get("address1"),
        address2: row.get("address2"),
        city: row.get("city"),
        country: row.get("country"),
        zipcode: row.get("zipcode"),
        phone_number: row.get("phon_number"),
        user_name: row.get("user_name"),
        profile_status: row.get("profile_status"),
    });

    Member {
        member_id: row.get("memberid"),
        first_name: row.get("firstname"),
        last_name: row.get("lastname"),
        email: row.get("email"),
        detail,
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Member>> {
        let row = sqlx::query(&format!("{} WHERE m.memberid = ?", SELECT_MEMBER))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(member_from_row))
    }

    /// Every word of `fragment` must appear in the first or last name.
    async fn find_by_name(&self, fragment: &str) -> Result<Vec<Member>> {
        let words: Vec<String> = fragment.split_whitespace().map(escape_like).collect();
        if words.is_empty() {
            return Ok(vec![]);
        }

        let filter = vec![WORD_FILTER; words.len()].join(" AND ");
        let sql = format!(
            "{} WHERE {} ORDER BY m.memberid LIMIT ?",
            SELECT_MEMBER, filter
        );

        let mut query = sqlx::query(&sql);
        for word in &words {
            query = query.bind(word.as_str()).bind(word.as_str());
        }
        let rows = query
            .bind(NAME_CANDIDATE_LIMIT)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(member_from_row).collect())
    }
}
