//! The document store contract the forum core is written against.
//!
//! Every content record is one document keyed by its id. Writes carry the
//! revision the caller last read; the store refuses them when the document
//! has moved on since.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agora_types::models::{ContentKind, ContentRecord};

/// Opaque version token for a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(u64);

impl Revision {
    pub const INITIAL: Revision = Revision(1);

    pub(crate) fn from_raw(raw: i64) -> Self {
        Self(raw.max(0) as u64)
    }

    pub(crate) fn raw(self) -> i64 {
        self.0 as i64
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document {0} not found")]
    NotFound(Uuid),

    #[error("document {0} changed since it was read")]
    Conflict(Uuid),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Backend(anyhow::Error::new(e).context("malformed content document"))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Field filter over the content collection. Unset fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentQuery {
    pub kind: Option<ContentKind>,
    pub channel_id: Option<Uuid>,
    pub root_message_id: Option<Uuid>,
}

impl ContentQuery {
    pub fn messages() -> Self {
        Self {
            kind: Some(ContentKind::Message),
            ..Self::default()
        }
    }

    pub fn replies() -> Self {
        Self {
            kind: Some(ContentKind::Reply),
            ..Self::default()
        }
    }

    pub fn in_channel(mut self, channel_id: Uuid) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    pub fn under_root(mut self, root_message_id: Uuid) -> Self {
        self.root_message_id = Some(root_message_id);
        self
    }

    pub fn matches(&self, record: &ContentRecord) -> bool {
        self.kind.is_none_or(|kind| record.kind() == kind)
            && self.channel_id.is_none_or(|id| record.channel_id() == Some(id))
            && self
                .root_message_id
                .is_none_or(|id| record.root_message_id() == Some(id))
    }
}

/// Versioned document storage for messages and replies.
pub trait ContentStore {
    /// Fetch a record with the revision it is stored at.
    fn get(&self, id: Uuid) -> StoreResult<(ContentRecord, Revision)>;

    /// Store a new record under its own id. Fails with `Conflict` if the id
    /// is already taken.
    fn create(&self, record: &ContentRecord) -> StoreResult<(Uuid, Revision)>;

    /// Replace a record, provided it is still at `expected`.
    fn put(&self, record: &ContentRecord, expected: Revision) -> StoreResult<Revision>;

    /// Remove a record, provided it is still at `expected`.
    fn delete(&self, id: Uuid, expected: Revision) -> StoreResult<()>;

    /// All records matching `query`, in no particular order.
    fn query(&self, query: &ContentQuery) -> StoreResult<Vec<ContentRecord>>;
}
