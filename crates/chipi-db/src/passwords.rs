use chipi_common::{Error, Result, UserId};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::database::Database;

/// A credential the user asked Chipi to remember. Stored as entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPassword {
    pub service: String,
    pub password: String,
}

impl Database {
    pub fn save_password(&self, user_id: UserId, service: &str, password: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO passwords (user_id, service, password) VALUES (?1, ?2, ?3)",
            params![user_id.as_i64(), service, password],
        )
        .map_err(|e| Error::Database(format!("failed to save password: {e}")))?;
        Ok(())
    }

    /// Newest first.
    pub fn get_passwords(&self, user_id: UserId) -> Result<Vec<StoredPassword>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT service, password FROM passwords
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )
            .map_err(|e| Error::Database(format!("failed to prepare password query: {e}")))?;

        let rows = stmt
            .query_map(params![user_id.as_i64()], |row| {
                Ok(StoredPassword {
                    service: row.get(0)?,
                    password: row.get(1)?,
                })
            })
            .map_err(|e| Error::Database(format!("failed to execute password query: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect password rows: {e}")))
    }
}
