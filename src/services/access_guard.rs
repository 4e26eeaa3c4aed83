//! Ownership check applied before any object-store operation.

use crate::{auth::Identity, models::file_record::FileRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied,
}

/// Only the record's owner may act on it. There is no admin bypass.
pub fn authorize(record: &FileRecord, identity: &Identity) -> Access {
    if record.owner_id == identity.as_str() {
        Access::Allowed
    } else {
        Access::Denied
    }
}
