use rusqlite::{Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use agora_types::models::ContentRecord;

use crate::Database;
use crate::store::{ContentQuery, ContentStore, Revision, StoreError, StoreResult};

/// What a revision-guarded statement found when it touched no rows.
enum Guarded {
    Applied,
    Stale,
    Missing,
}

impl Guarded {
    fn into_result(self, id: Uuid) -> StoreResult<()> {
        match self {
            Self::Applied => Ok(()),
            Self::Stale => Err(StoreError::Conflict(id)),
            Self::Missing => Err(StoreError::NotFound(id)),
        }
    }
}

fn classify(conn: &Connection, id: &str, changed: usize) -> rusqlite::Result<Guarded> {
    if changed > 0 {
        return Ok(Guarded::Applied);
    }
    let exists = conn
        .query_row("SELECT 1 FROM content WHERE id = ?1", [id], |_| Ok(()))
        .optional()?
        .is_some();
    Ok(if exists { Guarded::Stale } else { Guarded::Missing })
}

impl ContentStore for Database {
    fn get(&self, id: Uuid) -> StoreResult<(ContentRecord, Revision)> {
        let row = self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT body, revision FROM content WHERE id = ?1",
                    [id.to_string()],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?;
            Ok(row)
        })?;

        let (body, revision) = row.ok_or(StoreError::NotFound(id))?;
        let record: ContentRecord = serde_json::from_str(&body)?;
        Ok((record, Revision::from_raw(revision)))
    }

    fn create(&self, record: &ContentRecord) -> StoreResult<(Uuid, Revision)> {
        let body = serde_json::to_string(record)?;
        let revision = Revision::INITIAL;

        let inserted = self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO content (id, kind, channel_id, root_message_id, body, revision, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    record.id.to_string(),
                    record.kind().as_str(),
                    record.channel_id().map(|id| id.to_string()),
                    record.root_message_id().map(|id| id.to_string()),
                    body,
                    revision.raw(),
                    record.created_at.to_rfc3339(),
                ],
            )?;
            Ok(inserted)
        })?;

        if inserted == 0 {
            return Err(StoreError::Conflict(record.id));
        }
        debug!(id = %record.id, kind = record.kind().as_str(), "content created");
        Ok((record.id, revision))
    }

    fn put(&self, record: &ContentRecord, expected: Revision) -> StoreResult<Revision> {
        let body = serde_json::to_string(record)?;
        let next = expected.next();
        let id = record.id.to_string();

        let outcome = self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE content SET body = ?1, revision = ?2 WHERE id = ?3 AND revision = ?4",
                rusqlite::params![body, next.raw(), id, expected.raw()],
            )?;
            Ok(classify(conn, &id, changed)?)
        })?;

        outcome.into_result(record.id)?;
        Ok(next)
    }

    fn delete(&self, id: Uuid, expected: Revision) -> StoreResult<()> {
        let key = id.to_string();

        let outcome = self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM content WHERE id = ?1 AND revision = ?2",
                rusqlite::params![key, expected.raw()],
            )?;
            Ok(classify(conn, &key, changed)?)
        })?;

        outcome.into_result(id)
    }

    fn query(&self, query: &ContentQuery) -> StoreResult<Vec<ContentRecord>> {
        let mut sql = String::from("SELECT body FROM content WHERE 1 = 1");
        let mut params: Vec<String> = Vec::new();

        if let Some(kind) = query.kind {
            params.push(kind.as_str().to_string());
            sql.push_str(&format!(" AND kind = ?{}", params.len()));
        }
        if let Some(channel_id) = query.channel_id {
            params.push(channel_id.to_string());
            sql.push_str(&format!(" AND channel_id = ?{}", params.len()));
        }
        if let Some(root) = query.root_message_id {
            params.push(root.to_string());
            sql.push_str(&format!(" AND root_message_id = ?{}", params.len()));
        }

        let bodies = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let bodies = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(bodies)
        })?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }
}
