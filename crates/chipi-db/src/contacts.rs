use chipi_common::{Error, Result, UserId};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::database::Database;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub phone: String,
    /// Empty when the user did not say how they know the person.
    pub relationship: String,
}

impl Database {
    pub fn save_contact(
        &self,
        user_id: UserId,
        name: &str,
        phone: &str,
        relationship: Option<&str>,
    ) -> Result<()> {
        let relationship = relationship.filter(|r| !r.is_empty());
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO contacts (user_id, name, phone, relationship) VALUES (?1, ?2, ?3, ?4)",
            params![user_id.as_i64(), name, phone, relationship],
        )
        .map_err(|e| Error::Database(format!("failed to save contact: {e}")))?;
        Ok(())
    }

    /// Alphabetical by name.
    pub fn get_contacts(&self, user_id: UserId) -> Result<Vec<Contact>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, phone, relationship FROM contacts
                 WHERE user_id = ?1
                 ORDER BY name, id",
            )
            .map_err(|e| Error::Database(format!("failed to prepare contact query: {e}")))?;

        let rows = stmt
            .query_map(params![user_id.as_i64()], |row| {
                Ok(Contact {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    phone: row.get(2)?,
                    relationship: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                })
            })
            .map_err(|e| Error::Database(format!("failed to execute contact query: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect contact rows: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use crate::database::tests::db_with_users;

    #[test]
    fn contacts_list_alphabetically_with_empty_relationship() {
        let (db, ids) = db_with_users(&["3001234567"]);
        db.save_contact(ids[0], "Marta", "3011111111", Some("hija"))
            .unwrap();
        db.save_contact(ids[0], "Carlos", "3022222222", None).unwrap();
        db.save_contact(ids[0], "Doctor Ruiz", "3033333333", Some(""))
            .unwrap();

        let contacts = db.get_contacts(ids[0]).unwrap();
        let names: Vec<&str> = contacts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Carlos", "Doctor Ruiz", "Marta"]);
        assert_eq!(contacts[0].relationship, "");
        assert_eq!(contacts[1].relationship, "");
        assert_eq!(contacts[2].relationship, "hija");
    }
}
