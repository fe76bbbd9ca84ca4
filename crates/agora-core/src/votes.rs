//! The like/dislike ledger.
//!
//! A vote is a read-modify-write of the whole content document, guarded by
//! the revision read at the start. When another writer got there first the
//! store reports a conflict and the cycle starts over from a fresh read, up
//! to [`MAX_VOTE_ATTEMPTS`] times.

use tracing::debug;
use uuid::Uuid;

use agora_db::ContentStore;
use agora_types::models::{VoteAction, VoteCounts};

use crate::error::Result;
use crate::retry_on_conflict;

pub const MAX_VOTE_ATTEMPTS: usize = 3;

/// Apply `action` by `user_id` to a message or reply and return the new
/// counts. Repeating a vote the user already holds changes nothing and
/// writes nothing.
pub fn apply_vote<S>(store: &S, content_id: Uuid, user_id: Uuid, action: VoteAction) -> Result<VoteCounts>
where
    S: ContentStore + ?Sized,
{
    apply_vote_with_attempts(store, content_id, user_id, action, MAX_VOTE_ATTEMPTS)
}

pub fn apply_vote_with_attempts<S>(
    store: &S,
    content_id: Uuid,
    user_id: Uuid,
    action: VoteAction,
    attempts: usize,
) -> Result<VoteCounts>
where
    S: ContentStore + ?Sized,
{
    retry_on_conflict(attempts, || {
        let (mut record, revision) = store.get(content_id)?;

        if !record.votes.apply(action, user_id) {
            debug!(%content_id, %user_id, %action, "vote already recorded");
            return Ok(record.votes.counts());
        }

        store.put(&record, revision)?;
        let counts = record.votes.counts();
        debug!(
            %content_id,
            %user_id,
            %action,
            up = counts.up_count,
            down = counts.down_count,
            "vote recorded"
        );
        Ok(counts)
    })
}
