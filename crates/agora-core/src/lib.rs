//! Forum core: reply-tree assembly, the like/dislike ledger, and content
//! posting. Every operation takes the content store it runs against; nothing
//! here holds state between calls.

pub mod error;
pub mod posting;
pub mod thread;
pub mod votes;

use tracing::warn;

pub use error::{ForumError, Result};
pub use posting::{
    MAX_REPLY_DEPTH, NewMessage, NewReply, delete_content, post_message, post_message_in_channel,
    post_reply,
};
pub use thread::{
    ThreadIndex, assemble_forest, assemble_tree, list_messages_with_trees, message_with_tree,
    reply_with_tree,
};
pub use votes::{MAX_VOTE_ATTEMPTS, apply_vote, apply_vote_with_attempts};

/// Run a read-modify-write cycle until it lands without a revision conflict,
/// at most `attempts` times. The last conflict is returned as-is.
pub(crate) fn retry_on_conflict<T>(attempts: usize, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Err(ForumError::Conflict(id)) if attempt < attempts => {
                warn!(%id, attempt, attempts, "revision conflict, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}
