use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Users --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

/// Public view of a user. The password hash stays in agora-db rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: String,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

// -- Channels --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

// -- Content (messages and replies) --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Message,
    Reply,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Reply => "reply",
        }
    }
}

/// Where a content record sits: at the top of a channel, or under a parent.
///
/// Serialized inline with the record as `"kind": "message" | "reply"` plus
/// the variant's fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Placement {
    Message {
        channel_id: Uuid,
    },
    Reply {
        parent_id: Uuid,
        /// Fixed when the reply is created; never recomputed.
        root_message_id: Uuid,
    },
}

/// A message or a reply. Both share this shape; only `votes` changes after
/// creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub placement: Placement,
    pub author_id: Uuid,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub votes: Votes,
}

impl ContentRecord {
    pub fn kind(&self) -> ContentKind {
        match self.placement {
            Placement::Message { .. } => ContentKind::Message,
            Placement::Reply { .. } => ContentKind::Reply,
        }
    }

    pub fn channel_id(&self) -> Option<Uuid> {
        match self.placement {
            Placement::Message { channel_id } => Some(channel_id),
            Placement::Reply { .. } => None,
        }
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        match self.placement {
            Placement::Message { .. } => None,
            Placement::Reply { parent_id, .. } => Some(parent_id),
        }
    }

    pub fn root_message_id(&self) -> Option<Uuid> {
        match self.placement {
            Placement::Message { .. } => None,
            Placement::Reply { root_message_id, .. } => Some(root_message_id),
        }
    }

    /// The message this record's thread hangs from (itself for a message).
    pub fn thread_root(&self) -> Uuid {
        self.root_message_id().unwrap_or(self.id)
    }
}

/// Messages and replies are rendered oldest first at every level.
pub fn creation_order(a: &ContentRecord, b: &ContentRecord) -> std::cmp::Ordering {
    a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
}

// -- Votes --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    Like,
    Dislike,
}

impl fmt::Display for VoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Like => f.write_str("like"),
            Self::Dislike => f.write_str("dislike"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts {
    pub up_count: u32,
    pub down_count: u32,
}

/// Like/dislike state of one content record.
///
/// Counts always equal the sizes of the member sets, and a user is in at most
/// one of the two sets. Stored documents that break either rule fail to
/// deserialize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredVotes")]
pub struct Votes {
    up_count: u32,
    down_count: u32,
    liked_by: BTreeSet<Uuid>,
    disliked_by: BTreeSet<Uuid>,
}

impl Votes {
    pub fn counts(&self) -> VoteCounts {
        VoteCounts {
            up_count: self.up_count,
            down_count: self.down_count,
        }
    }

    pub fn liked_by(&self) -> &BTreeSet<Uuid> {
        &self.liked_by
    }

    pub fn disliked_by(&self) -> &BTreeSet<Uuid> {
        &self.disliked_by
    }

    /// Record `action` by `user`. Returns false when the user already holds
    /// that vote and nothing changed.
    pub fn apply(&mut self, action: VoteAction, user: Uuid) -> bool {
        match action {
            VoteAction::Like => self.like(user),
            VoteAction::Dislike => self.dislike(user),
        }
    }

    pub fn like(&mut self, user: Uuid) -> bool {
        if self.liked_by.contains(&user) {
            return false;
        }
        if self.disliked_by.remove(&user) {
            self.down_count = self.down_count.saturating_sub(1);
        }
        self.liked_by.insert(user);
        self.up_count += 1;
        true
    }

    pub fn dislike(&mut self, user: Uuid) -> bool {
        if self.disliked_by.contains(&user) {
            return false;
        }
        if self.liked_by.remove(&user) {
            self.up_count = self.up_count.saturating_sub(1);
        }
        self.disliked_by.insert(user);
        self.down_count += 1;
        true
    }
}

#[derive(Deserialize)]
struct StoredVotes {
    #[serde(default)]
    up_count: u32,
    #[serde(default)]
    down_count: u32,
    #[serde(default)]
    liked_by: BTreeSet<Uuid>,
    #[serde(default)]
    disliked_by: BTreeSet<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum VotesError {
    #[error("up_count {count} does not match {members} liking users")]
    UpCountMismatch { count: u32, members: usize },
    #[error("down_count {count} does not match {members} disliking users")]
    DownCountMismatch { count: u32, members: usize },
    #[error("user {0} both likes and dislikes the same content")]
    BothWays(Uuid),
}

impl TryFrom<StoredVotes> for Votes {
    type Error = VotesError;

    fn try_from(doc: StoredVotes) -> Result<Self, Self::Error> {
        if doc.up_count as usize != doc.liked_by.len() {
            return Err(VotesError::UpCountMismatch {
                count: doc.up_count,
                members: doc.liked_by.len(),
            });
        }
        if doc.down_count as usize != doc.disliked_by.len() {
            return Err(VotesError::DownCountMismatch {
                count: doc.down_count,
                members: doc.disliked_by.len(),
            });
        }
        if let Some(user) = doc.liked_by.intersection(&doc.disliked_by).next() {
            return Err(VotesError::BothWays(*user));
        }

        Ok(Self {
            up_count: doc.up_count,
            down_count: doc.down_count,
            liked_by: doc.liked_by,
            disliked_by: doc.disliked_by,
        })
    }
}

// -- Threads --

/// A content record with its replies attached, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub record: ContentRecord,
    pub replies: Vec<TreeNode>,
}

impl TreeNode {
    pub fn id(&self) -> Uuid {
        self.record.id
    }

    /// Depth-first walk over this node and all descendants, parents before
    /// their replies.
    pub fn walk(&self) -> Vec<&TreeNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.replies.iter().rev());
        }
        out
    }
}

// Dropping nested `replies` recursively would use one stack frame per level.
impl Drop for TreeNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.replies);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.replies);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(parent: Uuid, root: Uuid) -> ContentRecord {
        ContentRecord {
            id: Uuid::now_v7(),
            placement: Placement::Reply {
                parent_id: parent,
                root_message_id: root,
            },
            author_id: Uuid::new_v4(),
            text: "hello".into(),
            image_path: None,
            created_at: Utc::now(),
            votes: Votes::default(),
        }
    }

    #[test]
    fn like_is_idempotent() {
        let user = Uuid::new_v4();
        let mut votes = Votes::default();

        assert!(votes.like(user));
        assert!(!votes.like(user));
        assert!(!votes.like(user));

        assert_eq!(votes.counts(), VoteCounts { up_count: 1, down_count: 0 });
        assert_eq!(votes.liked_by().len(), 1);
    }

    #[test]
    fn switching_sides_moves_the_vote() {
        let user = Uuid::new_v4();
        let mut votes = Votes::default();

        votes.like(user);
        votes.dislike(user);
        assert_eq!(votes.counts(), VoteCounts { up_count: 0, down_count: 1 });
        assert!(votes.liked_by().is_empty());

        votes.like(user);
        assert_eq!(votes.counts(), VoteCounts { up_count: 1, down_count: 0 });
        assert!(votes.liked_by().contains(&user));
        assert!(votes.disliked_by().is_empty());
    }

    #[test]
    fn record_json_is_flat_and_tagged() {
        let root = Uuid::now_v7();
        let record = reply(root, root);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "reply");
        assert_eq!(json["parent_id"], root.to_string());
        assert_eq!(json["root_message_id"], root.to_string());
        assert!(json.get("image_path").is_none());

        let back: ContentRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.thread_root(), root);
    }

    #[test]
    fn inconsistent_votes_are_rejected() {
        let user = Uuid::new_v4();

        let miscounted = serde_json::json!({
            "up_count": 2,
            "down_count": 0,
            "liked_by": [user],
            "disliked_by": [],
        });
        assert!(serde_json::from_value::<Votes>(miscounted).is_err());

        let both = serde_json::json!({
            "up_count": 1,
            "down_count": 1,
            "liked_by": [user],
            "disliked_by": [user],
        });
        assert!(serde_json::from_value::<Votes>(both).is_err());
    }

    #[test]
    fn missing_votes_default_to_empty() {
        let json = serde_json::json!({
            "id": Uuid::now_v7(),
            "kind": "message",
            "channel_id": Uuid::new_v4(),
            "author_id": Uuid::new_v4(),
            "text": "first",
            "created_at": "2026-01-02T03:04:05Z",
        });

        let record: ContentRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.kind(), ContentKind::Message);
        assert_eq!(record.votes, Votes::default());
    }

    #[test]
    fn deep_tree_walks_and_drops_without_recursion() {
        let root = Uuid::now_v7();
        let mut node = TreeNode {
            record: reply(root, root),
            replies: Vec::new(),
        };
        for _ in 0..100_000 {
            let parent = node.id();
            node = TreeNode {
                record: reply(parent, root),
                replies: vec![node],
            };
        }

        let walked = node.walk();
        assert_eq!(walked.len(), 100_001);
        assert_eq!(walked[0].id(), node.id());
        assert!(walked[100_000].replies.is_empty());
        drop(walked);
        drop(node);
    }
}
