use chipi_common::{Error, Result, UserId};
use chipi_security::{hash_password, verify_password};
use rusqlite::{ErrorCode, OptionalExtension, params};
use serde::Serialize;
use tracing::info;

use crate::database::Database;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub phone: String,
}

impl Database {
    /// Insert a new account. Returns `false` when the phone is already taken;
    /// the existing row is left untouched.
    pub fn create_user(&self, phone: &str, password: &str) -> Result<bool> {
        let conn = self.connection()?;
        let result = conn.execute(
            "INSERT INTO users (phone, password_hash) VALUES (?1, ?2)",
            params![phone, hash_password(password)],
        );

        match result {
            Ok(_) => {
                info!("registered new user");
                Ok(true)
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(Error::Database(format!("failed to create user: {e}"))),
        }
    }

    /// Look up a user by phone and check the password. Unknown phones and wrong
    /// passwords both yield `None`.
    pub fn validate_user(&self, phone: &str, password: &str) -> Result<Option<User>> {
        let conn = self.connection()?;
        let row: Option<(i64, String, String)> = conn
            .query_row(
                "SELECT id, phone, password_hash FROM users WHERE phone = ?1",
                params![phone],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to validate user: {e}")))?;

        Ok(row.and_then(|(id, phone, stored_hash)| {
            verify_password(password, &stored_hash).then(|| User {
                id: UserId::new(id),
                phone,
            })
        }))
    }

    pub fn user_exists(&self, phone: &str) -> Result<bool> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT id FROM users WHERE phone = ?1",
            params![phone],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map(|id| id.is_some())
        .map_err(|e| Error::Database(format!("failed to check user: {e}")))
    }

    pub fn touch_last_login(&self, user_id: UserId) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE users SET last_login = datetime('now') WHERE id = ?1",
            params![user_id.as_i64()],
        )
        .map_err(|e| Error::Database(format!("failed to update last login: {e}")))?;
        Ok(())
    }
}
