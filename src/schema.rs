//! Schema description shown to the model.
//!
//! The credential column is deliberately absent so the model has no reason
//! to select it.

use std::sync::Arc;

const MEMBER_SCHEMA: &str = "\
Database Schema:
- member (memberid BIGINT PK, firstname VARCHAR, lastname VARCHAR, email VARCHAR)
- member_detail (memberid BIGINT PK FK->member.memberid, occupation CHAR, address1 CLOB, \
address2 CLOB, city CLOB, country CLOB, zipcode INTEGER, phon_number VARCHAR, \
user_name CLOB, profile_status VARCHAR)
";

/// Immutable schema text, cheap to clone into every component.
#[derive(Debug, Clone)]
pub struct Schema {
    description: Arc<str>,
}

impl Schema {
    /// The member / member_detail schema.
    pub fn members() -> Self {
        Self::new(MEMBER_SCHEMA)
    }

    pub fn new(description: impl Into<Arc<str>>) -> Self {
        Self {
            description: description.into(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::members()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_schema_hides_credential() {
        let schema = Schema::members();
        assert!(schema.description().contains("member_detail"));
        assert!(!schema.description().contains("pass"));
    }
}
