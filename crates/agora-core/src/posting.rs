use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use agora_db::{ContentStore, StoreError};
use agora_types::models::{ContentRecord, Placement, Votes};

use crate::error::{ForumError, Result};
use crate::retry_on_conflict;

/// Attempts allowed for a moderator delete racing with votes on the record.
const DELETE_ATTEMPTS: usize = 3;

/// Deepest allowed reply nesting; a reply to a message is at depth 1.
/// Keeps thread documents within what JSON clients will parse.
pub const MAX_REPLY_DEPTH: usize = 50;

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub channel_id: Uuid,
    pub author_id: Uuid,
    pub text: String,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewReply {
    pub parent_id: Uuid,
    pub author_id: Uuid,
    pub text: String,
    pub image_path: Option<String>,
}

fn validate_body(text: &str, image_path: Option<&str>) -> Result<()> {
    let has_image = image_path.is_some_and(|p| !p.trim().is_empty());
    if text.trim().is_empty() && !has_image {
        return Err(ForumError::Validation("text or image required"));
    }
    Ok(())
}

fn new_record(placement: Placement, author_id: Uuid, text: String, image_path: Option<String>) -> ContentRecord {
    ContentRecord {
        id: Uuid::now_v7(),
        placement,
        author_id,
        text,
        image_path: image_path.filter(|p| !p.trim().is_empty()),
        created_at: Utc::now(),
        votes: Votes::default(),
    }
}

/// Post a top-level message. The caller has already checked the channel.
pub fn post_message<S>(store: &S, new: NewMessage) -> Result<Uuid>
where
    S: ContentStore + ?Sized,
{
    validate_body(&new.text, new.image_path.as_deref())?;

    let record = new_record(
        Placement::Message {
            channel_id: new.channel_id,
        },
        new.author_id,
        new.text,
        new.image_path,
    );
    let (id, _) = store.create(&record)?;

    info!(message_id = %id, channel_id = %new.channel_id, "message posted");
    Ok(id)
}

/// Post a message into a channel that may be deleted at the same time.
///
/// `channel_live` is asked before and after the insert. A message that lands
/// in a channel deleted in between is removed again and reported as
/// `NotFound`, so it never outlives its channel.
pub fn post_message_in_channel<S, F>(store: &S, new: NewMessage, channel_live: F) -> Result<Uuid>
where
    S: ContentStore + ?Sized,
    F: Fn(Uuid) -> Result<bool>,
{
    let channel_id = new.channel_id;
    if !channel_live(channel_id)? {
        return Err(ForumError::NotFound(channel_id));
    }

    let id = post_message(store, new)?;

    if !channel_live(channel_id)? {
        warn!(message_id = %id, %channel_id, "channel deleted while posting, withdrawing message");
        match delete_content(store, id) {
            // The channel delete already swept it up
            Ok(()) | Err(ForumError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        return Err(ForumError::NotFound(channel_id));
    }
    Ok(id)
}

/// Check that `parent` still hangs off its root message and return the
/// nesting depth a reply under it would have (1 for a reply to a message).
///
/// Walks parent links once, at creation time. The walk is bounded by
/// [`MAX_REPLY_DEPTH`].
fn attach_point<S>(store: &S, parent: &ContentRecord) -> Result<usize>
where
    S: ContentStore + ?Sized,
{
    let root_id = parent.thread_root();
    let mut depth = 1;
    let mut cursor = parent.clone();

    while let Some(up) = cursor.parent_id() {
        depth += 1;
        if depth > MAX_REPLY_DEPTH {
            return Err(ForumError::Validation("replies are nested too deeply"));
        }
        cursor = match store.get(up) {
            Ok((record, _)) if record.thread_root() == root_id => record,
            // A deleted ancestor, or a link into another thread
            Ok(_) | Err(StoreError::NotFound(_)) => {
                return Err(ForumError::InvalidReference(parent.id));
            }
            Err(e) => return Err(e.into()),
        };
    }

    if cursor.id != root_id {
        return Err(ForumError::InvalidReference(parent.id));
    }
    Ok(depth)
}

/// Post a reply under a message or another reply.
///
/// The thread root is resolved here, once: a message parent is its own
/// root, a reply parent already carries the root it was created under. The
/// parent must still be reachable from that root; otherwise the reply could
/// never be shown and is refused.
pub fn post_reply<S>(store: &S, new: NewReply) -> Result<Uuid>
where
    S: ContentStore + ?Sized,
{
    validate_body(&new.text, new.image_path.as_deref())?;

    let (parent, _) = store.get(new.parent_id).map_err(|e| match e {
        StoreError::NotFound(id) => ForumError::InvalidReference(id),
        other => other.into(),
    })?;
    let root_message_id = parent.thread_root();
    let depth = attach_point(store, &parent)?;

    let record = new_record(
        Placement::Reply {
            parent_id: parent.id,
            root_message_id,
        },
        new.author_id,
        new.text,
        new.image_path,
    );
    let (id, _) = store.create(&record)?;

    info!(reply_id = %id, parent_id = %parent.id, %root_message_id, depth, "reply posted");
    Ok(id)
}

/// Remove one message or reply. Replies beneath it are left in place and
/// drop out of every tree.
pub fn delete_content<S>(store: &S, content_id: Uuid) -> Result<()>
where
    S: ContentStore + ?Sized,
{
    retry_on_conflict(DELETE_ATTEMPTS, || {
        let (_, revision) = store.get(content_id)?;
        store.delete(content_id, revision)?;
        Ok(())
    })?;

    debug!(%content_id, "content deleted");
    Ok(())
}
