//! Reply-tree assembly.
//!
//! Replies are stored flat, each pointing at its parent and at the message
//! its thread started from. Trees are rebuilt per request from one
//! adjacency index, so every record is visited once no matter how deep the
//! nesting goes.
//!
//! A reply whose parent is gone (deleted by a moderator) is never reached
//! from its root and silently drops out of the output together with its own
//! descendants.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use agora_db::{ContentQuery, ContentStore, StoreError};
use agora_types::models::{ContentKind, ContentRecord, Placement, TreeNode, creation_order};

use crate::error::{ForumError, Result};

/// Messages and replies by id, and replies grouped under
/// `(root message, parent)`.
pub struct ThreadIndex<'a> {
    roots: HashMap<Uuid, &'a ContentRecord>,
    replies: HashMap<Uuid, &'a ContentRecord>,
    children: HashMap<(Uuid, Uuid), Vec<&'a ContentRecord>>,
}

/// One node under construction: its record, the children still to visit,
/// and the finished subtrees of those already visited.
struct Frame<'a, 'i> {
    record: &'a ContentRecord,
    pending: std::slice::Iter<'i, &'a ContentRecord>,
    replies: Vec<TreeNode>,
}

impl<'a> ThreadIndex<'a> {
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ContentRecord>,
    {
        let mut roots = HashMap::new();
        let mut replies = HashMap::new();
        let mut children: HashMap<(Uuid, Uuid), Vec<&'a ContentRecord>> = HashMap::new();

        for record in records {
            match record.placement {
                Placement::Message { .. } => {
                    roots.insert(record.id, record);
                }
                Placement::Reply {
                    parent_id,
                    root_message_id,
                } => {
                    replies.insert(record.id, record);
                    children
                        .entry((root_message_id, parent_id))
                        .or_default()
                        .push(record);
                }
            }
        }

        for siblings in children.values_mut() {
            siblings.sort_by(|a, b| creation_order(a, b));
        }

        Self {
            roots,
            replies,
            children,
        }
    }

    /// The tree under message `root_id`, or `None` if that message is not in
    /// the index.
    pub fn tree(&self, root_id: Uuid) -> Option<TreeNode> {
        let root = *self.roots.get(&root_id)?;
        Some(self.node(root_id, root))
    }

    /// The tree under reply `reply_id`, or `None` if the reply is not in the
    /// index or no longer hangs off its root message.
    pub fn subtree(&self, reply_id: Uuid) -> Option<TreeNode> {
        let reply = *self.replies.get(&reply_id)?;
        let root_id = reply.root_message_id()?;
        if !self.reachable(root_id, reply) {
            return None;
        }
        Some(self.node(root_id, reply))
    }

    /// Every indexed message with its tree, oldest message first.
    pub fn forest(&self) -> Vec<TreeNode> {
        let mut roots: Vec<&ContentRecord> = self.roots.values().copied().collect();
        roots.sort_by(|a, b| creation_order(a, b));
        roots.into_iter().map(|root| self.node(root.id, root)).collect()
    }

    /// Follow parent links from `reply` up to `root_id`. Each step must stay
    /// inside the same thread.
    fn reachable(&self, root_id: Uuid, reply: &'a ContentRecord) -> bool {
        if !self.roots.contains_key(&root_id) {
            return false;
        }
        let mut cursor = reply;
        // Parents are created strictly before their replies, so a valid
        // chain never revisits a record.
        for _ in 0..=self.replies.len() {
            let Some(parent_id) = cursor.parent_id() else {
                return false;
            };
            if parent_id == root_id {
                return true;
            }
            match self.replies.get(&parent_id) {
                Some(&parent) if parent.root_message_id() == Some(root_id) => cursor = parent,
                _ => return false,
            }
        }
        false
    }

    fn children_of(&self, root_id: Uuid, parent_id: Uuid) -> &[&'a ContentRecord] {
        self.children
            .get(&(root_id, parent_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Build the subtree under `top` with an explicit stack, so nesting depth
    /// is bounded by the heap rather than the call stack.
    fn node(&self, root_id: Uuid, top: &'a ContentRecord) -> TreeNode {
        let mut stack = vec![Frame {
            record: top,
            pending: self.children_of(root_id, top.id).iter(),
            replies: Vec::new(),
        }];
        let mut finished = None;

        while let Some(frame) = stack.last_mut() {
            if let Some(&child) = frame.pending.next() {
                stack.push(Frame {
                    record: child,
                    pending: self.children_of(root_id, child.id).iter(),
                    replies: Vec::new(),
                });
                continue;
            }

            let node = TreeNode {
                record: frame.record.clone(),
                replies: std::mem::take(&mut frame.replies),
            };
            stack.pop();
            match stack.last_mut() {
                Some(parent) => parent.replies.push(node),
                None => finished = Some(node),
            }
        }

        finished.unwrap_or_else(|| TreeNode {
            record: top.clone(),
            replies: Vec::new(),
        })
    }
}

/// Assemble the reply tree of message `root_id` out of `records`.
///
/// Returns `None` when `root_id` is not a message among `records`.
pub fn assemble_tree(root_id: Uuid, records: &[ContentRecord]) -> Option<TreeNode> {
    ThreadIndex::build(records).tree(root_id)
}

/// Assemble a tree for every message in `records`, oldest first.
pub fn assemble_forest(records: &[ContentRecord]) -> Vec<TreeNode> {
    ThreadIndex::build(records).forest()
}

/// Fetch one message and everything posted under it.
pub fn message_with_tree<S>(store: &S, message_id: Uuid) -> Result<TreeNode>
where
    S: ContentStore + ?Sized,
{
    let (root, _) = store.get(message_id)?;
    if root.kind() != ContentKind::Message {
        return Err(ForumError::NotFound(message_id));
    }

    let replies = store.query(&ContentQuery::replies().under_root(message_id))?;
    debug!(%message_id, replies = replies.len(), "assembling thread");

    ThreadIndex::build(std::iter::once(&root).chain(replies.iter()))
        .tree(message_id)
        .ok_or(ForumError::NotFound(message_id))
}

/// Fetch one reply and everything posted under it. A reply that no longer
/// hangs off its root message is as good as gone.
pub fn reply_with_tree<S>(store: &S, reply_id: Uuid) -> Result<TreeNode>
where
    S: ContentStore + ?Sized,
{
    let (reply, _) = store.get(reply_id)?;
    let Some(root_id) = reply.root_message_id() else {
        return Err(ForumError::NotFound(reply_id));
    };

    let root = match store.get(root_id) {
        Ok((root, _)) => root,
        Err(StoreError::NotFound(_)) => return Err(ForumError::NotFound(reply_id)),
        Err(e) => return Err(e.into()),
    };
    let thread = store.query(&ContentQuery::replies().under_root(root_id))?;
    debug!(%reply_id, %root_id, replies = thread.len(), "assembling subthread");

    ThreadIndex::build(std::iter::once(&root).chain(thread.iter()))
        .subtree(reply_id)
        .ok_or(ForumError::NotFound(reply_id))
}

/// Every message (optionally only those in `channel_id`) with its tree.
///
/// A channel view only loads the replies of that channel's threads.
pub fn list_messages_with_trees<S>(store: &S, channel_id: Option<Uuid>) -> Result<Vec<TreeNode>>
where
    S: ContentStore + ?Sized,
{
    let (messages, replies) = match channel_id {
        Some(channel_id) => {
            let messages = store.query(&ContentQuery::messages().in_channel(channel_id))?;
            let mut replies = Vec::new();
            for message in &messages {
                replies.extend(store.query(&ContentQuery::replies().under_root(message.id))?);
            }
            (messages, replies)
        }
        None => (
            store.query(&ContentQuery::messages())?,
            store.query(&ContentQuery::replies())?,
        ),
    };
    debug!(
        ?channel_id,
        messages = messages.len(),
        replies = replies.len(),
        "assembling threads"
    );

    Ok(ThreadIndex::build(messages.iter().chain(replies.iter())).forest())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use agora_db::{MemoryStore, Revision, StoreResult};
    use agora_types::models::Votes;
    use chrono::{DateTime, Duration, Utc};

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(1_700_000_000 + seconds)
    }

    fn message(channel_id: Uuid, t: i64) -> ContentRecord {
        ContentRecord {
            id: Uuid::now_v7(),
            placement: Placement::Message { channel_id },
            author_id: Uuid::new_v4(),
            text: format!("message at {t}"),
            image_path: None,
            created_at: at(t),
            votes: Votes::default(),
        }
    }

    fn reply(parent: &ContentRecord, t: i64) -> ContentRecord {
        ContentRecord {
            id: Uuid::now_v7(),
            placement: Placement::Reply {
                parent_id: parent.id,
                root_message_id: parent.thread_root(),
            },
            author_id: Uuid::new_v4(),
            text: format!("reply at {t}"),
            image_path: None,
            created_at: at(t),
            votes: Votes::default(),
        }
    }

    fn ids(nodes: &[TreeNode]) -> Vec<Uuid> {
        nodes.iter().map(TreeNode::id).collect()
    }

    /// M1 with R1, R2, R3 directly under it and R4 under R2.
    struct Fixture {
        m1: ContentRecord,
        r1: ContentRecord,
        r2: ContentRecord,
        r3: ContentRecord,
        r4: ContentRecord,
    }

    impl Fixture {
        fn new() -> Self {
            let m1 = message(Uuid::new_v4(), 0);
            let r1 = reply(&m1, 1);
            let r2 = reply(&m1, 2);
            let r3 = reply(&m1, 3);
            let r4 = reply(&r2, 4);
            Self { m1, r1, r2, r3, r4 }
        }

        /// Records in an order unrelated to creation time.
        fn shuffled(&self) -> Vec<ContentRecord> {
            vec![
                self.r4.clone(),
                self.r3.clone(),
                self.m1.clone(),
                self.r1.clone(),
                self.r2.clone(),
            ]
        }
    }

    #[test]
    fn nested_replies_in_creation_order() {
        let f = Fixture::new();
        let tree = assemble_tree(f.m1.id, &f.shuffled()).unwrap();

        assert_eq!(tree.id(), f.m1.id);
        assert_eq!(ids(&tree.replies), vec![f.r1.id, f.r2.id, f.r3.id]);
        assert_eq!(ids(&tree.replies[1].replies), vec![f.r4.id]);
        assert!(tree.replies[0].replies.is_empty());
        assert!(tree.replies[2].replies.is_empty());
    }

    #[test]
    fn deleted_parent_hides_its_subtree() {
        let f = Fixture::new();
        let records: Vec<ContentRecord> = f
            .shuffled()
            .into_iter()
            .filter(|r| r.id != f.r2.id)
            .collect();

        let tree = assemble_tree(f.m1.id, &records).unwrap();
        let all: Vec<Uuid> = tree.walk().iter().map(|n| n.id()).collect();

        assert_eq!(ids(&tree.replies), vec![f.r1.id, f.r3.id]);
        assert!(!all.contains(&f.r4.id));
    }

    #[test]
    fn missing_or_reply_root_yields_nothing() {
        let f = Fixture::new();
        let records = f.shuffled();

        assert!(assemble_tree(Uuid::now_v7(), &records).is_none());
        assert!(assemble_tree(f.r2.id, &records).is_none());
    }

    #[test]
    fn replies_stay_under_their_own_root() {
        let channel = Uuid::new_v4();
        let m1 = message(channel, 0);
        let m2 = message(channel, 1);
        let r1 = reply(&m1, 2);
        // Claims M1 as parent but belongs to M2's thread: unreachable from both.
        let mut stray = reply(&m2, 3);
        stray.placement = Placement::Reply {
            parent_id: m1.id,
            root_message_id: m2.id,
        };
        let r2 = reply(&m2, 4);

        let records = vec![m1.clone(), m2.clone(), r1.clone(), stray.clone(), r2.clone()];
        let forest = assemble_forest(&records);

        assert_eq!(ids(&forest), vec![m1.id, m2.id]);
        assert_eq!(ids(&forest[0].replies), vec![r1.id]);
        assert_eq!(ids(&forest[1].replies), vec![r2.id]);
    }

    #[test]
    fn equal_timestamps_fall_back_to_id_order() {
        let m1 = message(Uuid::new_v4(), 0);
        let a = reply(&m1, 5);
        let b = reply(&m1, 5);
        let (first, second) = if a.id < b.id { (&a, &b) } else { (&b, &a) };

        let records = vec![second.clone(), m1.clone(), first.clone()];
        let tree = assemble_tree(m1.id, &records).unwrap();

        assert_eq!(ids(&tree.replies), vec![first.id, second.id]);
    }

    #[test]
    fn deep_chain_is_fully_attached() {
        let m1 = message(Uuid::new_v4(), 0);
        let mut records = vec![m1.clone()];
        for t in 1..=10_000 {
            let next = reply(&records[records.len() - 1], t);
            records.push(next);
        }
        let deepest = records[records.len() - 1].id;

        let tree = assemble_tree(m1.id, &records).unwrap();
        let walked = tree.walk();
        assert_eq!(walked.len(), 10_001);
        assert_eq!(walked[10_000].id(), deepest);
        drop(walked);
        drop(tree);

        let index = ThreadIndex::build(&records);
        let lower = index.subtree(records[5_000].id).unwrap();
        assert_eq!(lower.walk().len(), 5_001);
    }

    #[test]
    fn subtree_starts_at_the_reply() {
        let f = Fixture::new();
        let records = f.shuffled();
        let index = ThreadIndex::build(&records);

        let r2 = index.subtree(f.r2.id).unwrap();
        assert_eq!(r2.id(), f.r2.id);
        assert_eq!(ids(&r2.replies), vec![f.r4.id]);

        let r4 = index.subtree(f.r4.id).unwrap();
        assert!(r4.replies.is_empty());

        // Messages and unknown ids are not replies
        assert!(index.subtree(f.m1.id).is_none());
        assert!(index.subtree(Uuid::now_v7()).is_none());
    }

    #[test]
    fn orphaned_reply_has_no_subtree() {
        let f = Fixture::new();
        let without_r2: Vec<ContentRecord> = f
            .shuffled()
            .into_iter()
            .filter(|r| r.id != f.r2.id)
            .collect();
        assert!(ThreadIndex::build(&without_r2).subtree(f.r4.id).is_none());

        let without_root: Vec<ContentRecord> = f
            .shuffled()
            .into_iter()
            .filter(|r| r.id != f.m1.id)
            .collect();
        assert!(ThreadIndex::build(&without_root).subtree(f.r1.id).is_none());
    }

    #[test]
    fn input_records_are_untouched() {
        let f = Fixture::new();
        let records = f.shuffled();
        let before = records.clone();

        let _ = assemble_forest(&records);
        assert_eq!(records, before);
    }

    #[test]
    fn store_backed_reads() {
        let store = MemoryStore::new();
        let f = Fixture::new();
        for record in f.shuffled() {
            store.create(&record).unwrap();
        }
        let other = message(Uuid::new_v4(), 10);
        store.create(&other).unwrap();

        let tree = message_with_tree(&store, f.m1.id).unwrap();
        assert_eq!(ids(&tree.replies), vec![f.r1.id, f.r2.id, f.r3.id]);

        let channel = f.m1.channel_id().unwrap();
        let listed = list_messages_with_trees(&store, Some(channel)).unwrap();
        assert_eq!(ids(&listed), vec![f.m1.id]);
        assert_eq!(listed[0], tree);

        let everything = list_messages_with_trees(&store, None).unwrap();
        assert_eq!(ids(&everything), vec![f.m1.id, other.id]);

        assert!(matches!(
            message_with_tree(&store, f.r1.id),
            Err(ForumError::NotFound(_))
        ));

        store.delete(f.r2.id, Revision::INITIAL).unwrap();
        let pruned = message_with_tree(&store, f.m1.id).unwrap();
        assert_eq!(ids(&pruned.replies), vec![f.r1.id, f.r3.id]);
        assert_eq!(pruned.walk().len(), 3);
    }

    #[test]
    fn store_backed_reply_reads() {
        let store = MemoryStore::new();
        let f = Fixture::new();
        for record in f.shuffled() {
            store.create(&record).unwrap();
        }

        let r2 = reply_with_tree(&store, f.r2.id).unwrap();
        assert_eq!(ids(&r2.replies), vec![f.r4.id]);

        assert!(matches!(
            reply_with_tree(&store, f.m1.id),
            Err(ForumError::NotFound(_))
        ));

        store.delete(f.r2.id, Revision::INITIAL).unwrap();
        assert!(matches!(
            reply_with_tree(&store, f.r4.id),
            Err(ForumError::NotFound(id)) if id == f.r4.id
        ));

        store.delete(f.m1.id, Revision::INITIAL).unwrap();
        assert!(matches!(
            reply_with_tree(&store, f.r1.id),
            Err(ForumError::NotFound(_))
        ));
    }

    /// Remembers every query it is asked to run.
    struct Recording {
        inner: MemoryStore,
        queries: Mutex<Vec<ContentQuery>>,
    }

    impl ContentStore for Recording {
        fn get(&self, id: Uuid) -> StoreResult<(ContentRecord, Revision)> {
            self.inner.get(id)
        }

        fn create(&self, record: &ContentRecord) -> StoreResult<(Uuid, Revision)> {
            self.inner.create(record)
        }

        fn put(&self, record: &ContentRecord, expected: Revision) -> StoreResult<Revision> {
            self.inner.put(record, expected)
        }

        fn delete(&self, id: Uuid, expected: Revision) -> StoreResult<()> {
            self.inner.delete(id, expected)
        }

        fn query(&self, query: &ContentQuery) -> StoreResult<Vec<ContentRecord>> {
            self.queries.lock().unwrap().push(*query);
            self.inner.query(query)
        }
    }

    #[test]
    fn channel_listing_only_loads_its_own_threads() {
        let store = Recording {
            inner: MemoryStore::new(),
            queries: Mutex::new(Vec::new()),
        };
        let f = Fixture::new();
        for record in f.shuffled() {
            store.create(&record).unwrap();
        }
        let elsewhere = message(Uuid::new_v4(), 20);
        let noise = reply(&elsewhere, 21);
        store.create(&elsewhere).unwrap();
        store.create(&noise).unwrap();

        let channel = f.m1.channel_id().unwrap();
        let listed = list_messages_with_trees(&store, Some(channel)).unwrap();
        assert_eq!(ids(&listed), vec![f.m1.id]);
        assert_eq!(listed[0].walk().len(), 5);

        let queries = store.queries.lock().unwrap();
        let reply_queries: Vec<&ContentQuery> = queries
            .iter()
            .filter(|q| q.kind == Some(ContentKind::Reply))
            .collect();
        assert_eq!(reply_queries.len(), 1);
        assert_eq!(reply_queries[0].root_message_id, Some(f.m1.id));
    }
}
