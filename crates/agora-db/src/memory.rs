use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use agora_types::models::ContentRecord;

use crate::store::{ContentQuery, ContentStore, Revision, StoreError, StoreResult};

/// In-process content store with the same revision semantics as the SQLite
/// one. Used by tests and by anything that wants a throwaway forum.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<Uuid, (ContentRecord, Revision)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<Uuid, (ContentRecord, Revision)>>> {
        self.docs
            .lock()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("store lock poisoned: {}", e)))
    }
}

impl ContentStore for MemoryStore {
    fn get(&self, id: Uuid) -> StoreResult<(ContentRecord, Revision)> {
        self.lock()?
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn create(&self, record: &ContentRecord) -> StoreResult<(Uuid, Revision)> {
        let mut docs = self.lock()?;
        if docs.contains_key(&record.id) {
            return Err(StoreError::Conflict(record.id));
        }
        docs.insert(record.id, (record.clone(), Revision::INITIAL));
        Ok((record.id, Revision::INITIAL))
    }

    fn put(&self, record: &ContentRecord, expected: Revision) -> StoreResult<Revision> {
        let mut docs = self.lock()?;
        let slot = docs.get_mut(&record.id).ok_or(StoreError::NotFound(record.id))?;
        if slot.1 != expected {
            return Err(StoreError::Conflict(record.id));
        }
        let next = expected.next();
        *slot = (record.clone(), next);
        Ok(next)
    }

    fn delete(&self, id: Uuid, expected: Revision) -> StoreResult<()> {
        let mut docs = self.lock()?;
        match docs.get(&id) {
            None => Err(StoreError::NotFound(id)),
            Some((_, current)) if *current != expected => Err(StoreError::Conflict(id)),
            Some(_) => {
                docs.remove(&id);
                Ok(())
            }
        }
    }

    fn query(&self, query: &ContentQuery) -> StoreResult<Vec<ContentRecord>> {
        Ok(self
            .lock()?
            .values()
            .filter(|(record, _)| query.matches(record))
            .map(|(record, _)| record.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::models::{Placement, Votes};

    fn message() -> ContentRecord {
        ContentRecord {
            id: Uuid::now_v7(),
            placement: Placement::Message {
                channel_id: Uuid::new_v4(),
            },
            author_id: Uuid::new_v4(),
            text: "hi".into(),
            image_path: None,
            created_at: chrono::Utc::now(),
            votes: Votes::default(),
        }
    }

    #[test]
    fn revisions_advance_and_guard_writes() {
        let store = MemoryStore::new();
        let mut record = message();
        let (_, r1) = store.create(&record).unwrap();

        record.votes.like(Uuid::new_v4());
        let r2 = store.put(&record, r1).unwrap();
        assert_ne!(r1, r2);

        assert!(matches!(store.put(&record, r1), Err(StoreError::Conflict(_))));
        assert!(matches!(store.delete(record.id, r1), Err(StoreError::Conflict(_))));

        store.delete(record.id, r2).unwrap();
        assert!(store.is_empty().unwrap());
        assert!(matches!(store.get(record.id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn poisoned_lock_is_an_error() {
        let store = MemoryStore::new();
        store.create(&message()).unwrap();

        let _ = std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = store.docs.lock().unwrap();
                panic!("poison the store");
            })
            .join()
        });

        assert!(matches!(store.len(), Err(StoreError::Backend(_))));
        assert!(store.is_empty().is_err());
    }
}
