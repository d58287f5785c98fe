use chipi_common::{Error, Result, UserId};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::database::Database;

/// A stored note with a free-form time. Nothing fires it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub text: String,
    pub time: String,
}

impl Database {
    pub fn create_reminder(&self, user_id: UserId, text: &str, reminder_time: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO reminders (user_id, text, reminder_time) VALUES (?1, ?2, ?3)",
            params![user_id.as_i64(), text, reminder_time],
        )
        .map_err(|e| Error::Database(format!("failed to create reminder: {e}")))?;
        Ok(())
    }

    /// Newest first.
    pub fn get_reminders(&self, user_id: UserId) -> Result<Vec<Reminder>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, text, reminder_time FROM reminders
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )
            .map_err(|e| Error::Database(format!("failed to prepare reminder query: {e}")))?;

        let rows = stmt
            .query_map(params![user_id.as_i64()], |row| {
                Ok(Reminder {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    time: row.get(2)?,
                })
            })
            .map_err(|e| Error::Database(format!("failed to execute reminder query: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect reminder rows: {e}")))
    }
}
