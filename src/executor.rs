//! Member resolution through the record store.

use std::sync::Arc;

use crate::error::LookupError;
use crate::models::Member;
use crate::store::RecordStore;

pub struct QueryExecutor {
    store: Arc<dyn RecordStore>,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Exactly one member by id. Zero rows is [`LookupError::NotFound`].
    pub async fn execute(&self, id: i64) -> Result<Member, LookupError> {
        match self.store.find_by_id(id).await? {
            Some(member) => {
                tracing::debug!(member_id = id, "member resolved");
                Ok(member)
            }
            None => Err(LookupError::NotFound(id.to_string())),
        }
    }

    /// Exactly one member by name fragment.
    ///
    /// No match is [`LookupError::NotFound`]; more than one is
    /// [`LookupError::AmbiguousMatch`]. The caller never gets to pick.
    pub async fn execute_by_name(&self, name: &str) -> Result<Member, LookupError> {
        let mut matches = self.store.find_by_name(name).await?;
        match matches.len() {
            0 => Err(LookupError::NotFound(name.to_string())),
            1 => Ok(matches.remove(0)),
            count => {
                tracing::info!(name, count, "ambiguous member name");
                Err(LookupError::AmbiguousMatch {
                    name: name.to_string(),
                    count,
                })
            }
        }
    }
}
