use crate::Database;
use crate::models::{ChannelRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

const USER_COLUMNS: &str = "id, name, email, password, role, status, is_blocked, created_at";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        name: &str,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, password, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (id, name, email, password_hash, role, &now),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users ORDER BY created_at, id",
                USER_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false when no such user exists.
    pub fn set_user_blocked(&self, id: &str, is_blocked: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_blocked = ?1 WHERE id = ?2",
                rusqlite::params![is_blocked, id],
            )?;
            Ok(changed == 1)
        })
    }

    /// Returns false when no such user exists.
    pub fn set_user_status(&self, id: &str, status: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET status = ?1 WHERE id = ?2",
                (status, id),
            )?;
            Ok(changed == 1)
        })
    }

    // -- Channels --

    pub fn create_channel(&self, id: &str, name: &str, created_by: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (id, name, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id, name, created_by, &now),
            )?;
            Ok(())
        })
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, created_by, created_at FROM channels WHERE id = ?1",
                    [id],
                    channel_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Name lookup is case-insensitive, matching the uniqueness rule.
    pub fn get_channel_by_name(&self, name: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, created_by, created_at FROM channels WHERE name = ?1 COLLATE NOCASE",
                    [name],
                    channel_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// All channels, oldest first. `name_filter` keeps channels whose name
    /// contains it, ignoring ASCII case.
    pub fn list_channels(&self, name_filter: Option<&str>) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, created_by, created_at FROM channels ORDER BY created_at, id",
            )?;
            let rows = stmt
                .query_map([], channel_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let Some(filter) = name_filter.map(str::to_lowercase).filter(|f| !f.is_empty()) else {
                return Ok(rows);
            };
            Ok(rows
                .into_iter()
                .filter(|row| row.name.to_lowercase().contains(&filter))
                .collect())
        })
    }

    /// Returns false when no such channel exists.
    pub fn delete_channel(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM channels WHERE id = ?1", [id])?;
            Ok(deleted == 1)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE {} = ?1",
        USER_COLUMNS, column
    ))?;

    let row = stmt.query_row([value], user_from_row).optional()?;

    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        role: row.get(4)?,
        status: row.get(5)?,
        is_blocked: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        name: row.get(1)?,
        created_by: row.get(2)?,
        created_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_user() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        db.create_user(&id, "ada", "ada@example.com", "hash", "user").unwrap();
        (db, id)
    }

    #[test]
    fn user_round_trip() {
        let (db, id) = db_with_user();

        let row = db.get_user_by_email("ada@example.com").unwrap().unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.password, "hash");

        let user = row.to_user().unwrap();
        assert_eq!(user.status, "beginner");
        assert!(!user.is_blocked);
        assert_eq!(user.role, agora_types::models::Role::User);
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let (db, _) = db_with_user();
        let other = uuid::Uuid::new_v4().to_string();
        assert!(db.create_user(&other, "eve", "ada@example.com", "x", "user").is_err());
    }

    #[test]
    fn block_and_status_updates() {
        let (db, id) = db_with_user();

        assert!(db.set_user_blocked(&id, true).unwrap());
        assert!(db.set_user_status(&id, "regular").unwrap());
        assert!(!db.set_user_blocked("missing", true).unwrap());

        let user = db.get_user_by_id(&id).unwrap().unwrap().to_user().unwrap();
        assert!(user.is_blocked);
        assert_eq!(user.status, "regular");
    }

    #[test]
    fn channel_search_ignores_case() {
        let (db, user) = db_with_user();
        db.create_channel(&uuid::Uuid::new_v4().to_string(), "Rust Talk", &user).unwrap();
        db.create_channel(&uuid::Uuid::new_v4().to_string(), "gardening", &user).unwrap();

        let hits = db.list_channels(Some("rust")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Rust Talk");
        assert_eq!(db.list_channels(None).unwrap().len(), 2);
        assert!(db.get_channel_by_name("RUST TALK").unwrap().is_some());
    }

    #[test]
    fn channel_names_are_unique_ignoring_case() {
        let (db, user) = db_with_user();
        db.create_channel(&uuid::Uuid::new_v4().to_string(), "general", &user).unwrap();
        assert!(
            db.create_channel(&uuid::Uuid::new_v4().to_string(), "General", &user)
                .is_err()
        );
    }

    #[test]
    fn delete_channel_reports_missing() {
        let (db, user) = db_with_user();
        let id = uuid::Uuid::new_v4().to_string();
        db.create_channel(&id, "general", &user).unwrap();

        assert!(db.delete_channel(&id).unwrap());
        assert!(!db.delete_channel(&id).unwrap());
        assert!(db.get_channel(&id).unwrap().is_none());
    }
}
