use std::collections::BTreeMap;

use chipi_common::{Error, Result, UserId};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;

impl Database {
    /// Insert or overwrite one key; `created_at` survives overwrites.
    pub fn save_user_preference(&self, user_id: UserId, key: &str, value: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO user_preferences (user_id, preference_key, preference_value)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, preference_key) DO UPDATE SET
                preference_value = excluded.preference_value,
                updated_at = datetime('now')",
            params![user_id.as_i64(), key, value],
        )
        .map_err(|e| Error::Database(format!("failed to save preference: {e}")))?;
        Ok(())
    }

    pub fn get_user_preference(&self, user_id: UserId, key: &str) -> Result<Option<String>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT preference_value FROM user_preferences
             WHERE user_id = ?1 AND preference_key = ?2",
            params![user_id.as_i64(), key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to read preference: {e}")))
    }

    pub fn get_all_user_preferences(&self, user_id: UserId) -> Result<BTreeMap<String, String>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT preference_key, preference_value FROM user_preferences
                 WHERE user_id = ?1",
            )
            .map_err(|e| Error::Database(format!("failed to prepare preference query: {e}")))?;

        let rows = stmt
            .query_map(params![user_id.as_i64()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| Error::Database(format!("failed to execute preference query: {e}")))?;

        rows.collect::<std::result::Result<BTreeMap<_, _>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect preference rows: {e}")))
    }

    /// Remove the given keys for one user. Returns the number of rows removed.
    pub fn delete_user_preferences(&self, user_id: UserId, keys: &[&str]) -> Result<usize> {
        let conn = self.connection()?;
        let mut removed = 0;
        for key in keys {
            removed += conn
                .execute(
                    "DELETE FROM user_preferences WHERE user_id = ?1 AND preference_key = ?2",
                    params![user_id.as_i64(), *key],
                )
                .map_err(|e| Error::Database(format!("failed to delete preference: {e}")))?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use crate::database::tests::db_with_users;

    #[test]
    fn upsert_keeps_one_row_per_key() {
        let (db, ids) = db_with_users(&["3001234567"]);
        let user = ids[0];

        db.save_user_preference(user, "font_size", "18").unwrap();
        db.save_user_preference(user, "font_size", "22").unwrap();
        db.save_user_preference(user, "prefers_reminders", "true")
            .unwrap();

        assert_eq!(
            db.get_user_preference(user, "font_size").unwrap().as_deref(),
            Some("22")
        );
        assert_eq!(db.get_user_preference(user, "missing").unwrap(), None);

        let all = db.get_all_user_preferences(user).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["prefers_reminders"], "true");
    }

    #[test]
    fn delete_only_touches_named_keys_of_one_user() {
        let (db, ids) = db_with_users(&["3001234567", "3007654321"]);
        db.save_user_preference(ids[0], "prefers_reminders", "true")
            .unwrap();
        db.save_user_preference(ids[0], "font_size", "20").unwrap();
        db.save_user_preference(ids[1], "prefers_reminders", "true")
            .unwrap();

        let removed = db
            .delete_user_preferences(ids[0], &["prefers_reminders", "uses_password_manager"])
            .unwrap();
        assert_eq!(removed, 1);
        assert!(db.get_user_preference(ids[0], "font_size").unwrap().is_some());
        assert!(
            db.get_user_preference(ids[1], "prefers_reminders")
                .unwrap()
                .is_some()
        );
    }
}
