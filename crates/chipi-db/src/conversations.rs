use chipi_common::{Error, Result, UserId};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::database::Database;

/// Upper bound on rows returned by a history search.
const SEARCH_LIMIT: i64 = 50;

/// One exchange as shown in the chat window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Row id; internal, not part of the JSON shape.
    #[serde(skip)]
    pub id: i64,
    pub user_message: String,
    pub bot_response: String,
    pub timestamp: String,
}

/// A stored exchange including its context blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub user_message: String,
    pub bot_response: String,
    pub context: serde_json::Value,
    pub timestamp: String,
}

impl Database {
    pub fn save_conversation(
        &self,
        user_id: UserId,
        user_message: &str,
        bot_response: &str,
    ) -> Result<()> {
        self.save_conversation_with_context(user_id, user_message, bot_response, None)
    }

    pub fn save_conversation_with_context(
        &self,
        user_id: UserId,
        user_message: &str,
        bot_response: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<()> {
        let context_json = context.map(serde_json::to_string).transpose()?;

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO conversations (user_id, user_message, bot_response, context)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id.as_i64(), user_message, bot_response, context_json],
        )
        .map_err(|e| Error::Database(format!("failed to save conversation: {e}")))?;
        Ok(())
    }

    /// The newest `limit` exchanges, returned oldest first for display.
    pub fn get_conversations(&self, user_id: UserId, limit: usize) -> Result<Vec<ConversationTurn>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_message, bot_response, timestamp
                 FROM conversations
                 WHERE user_id = ?1
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?2",
            )
            .map_err(|e| Error::Database(format!("failed to prepare history query: {e}")))?;

        let mut turns = stmt
            .query_map(params![user_id.as_i64(), limit as i64], row_to_turn)
            .map_err(|e| Error::Database(format!("failed to execute history query: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect history rows: {e}")))?;

        turns.reverse();
        Ok(turns)
    }

    /// Paged history, newest first, with the decoded context of each row.
    pub fn get_complete_history(
        &self,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConversationRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT user_message, bot_response, context, timestamp
                 FROM conversations
                 WHERE user_id = ?1
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?2 OFFSET ?3",
            )
            .map_err(|e| Error::Database(format!("failed to prepare history query: {e}")))?;

        let rows = stmt
            .query_map(
                params![user_id.as_i64(), limit as i64, offset as i64],
                |row| {
                    let context: Option<String> = row.get(2)?;
                    Ok(ConversationRecord {
                        user_message: row.get(0)?,
                        bot_response: row.get(1)?,
                        context: context
                            .and_then(|raw| serde_json::from_str(&raw).ok())
                            .unwrap_or_else(|| serde_json::json!({})),
                        timestamp: row.get(3)?,
                    })
                },
            )
            .map_err(|e| Error::Database(format!("failed to execute history query: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect history rows: {e}")))
    }

    /// Exchanges where either side contains `term`, newest first.
    pub fn search_conversations(&self, user_id: UserId, term: &str) -> Result<Vec<ConversationTurn>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_message, bot_response, timestamp
                 FROM conversations
                 WHERE user_id = ?1
                   AND (user_message LIKE '%' || ?2 || '%' OR bot_response LIKE '%' || ?2 || '%')
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?3",
            )
            .map_err(|e| Error::Database(format!("failed to prepare search query: {e}")))?;

        let rows = stmt
            .query_map(params![user_id.as_i64(), term, SEARCH_LIMIT], row_to_turn)
            .map_err(|e| Error::Database(format!("failed to execute search query: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect search rows: {e}")))
    }

    /// Delete every exchange of one user. Returns the number of rows removed.
    pub fn clear_conversations(&self, user_id: UserId) -> Result<usize> {
        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM conversations WHERE user_id = ?1",
            params![user_id.as_i64()],
        )
        .map_err(|e| Error::Database(format!("failed to clear conversations: {e}")))
    }

    /// Id of the newest exchange; changes whenever history grows or is cleared.
    pub fn latest_conversation_id(&self, user_id: UserId) -> Result<Option<i64>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT MAX(id) FROM conversations WHERE user_id = ?1",
            params![user_id.as_i64()],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(format!("failed to read latest conversation: {e}")))
    }
}

fn row_to_turn(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationTurn> {
    Ok(ConversationTurn {
        id: row.get(0)?,
        user_message: row.get(1)?,
        bot_response: row.get(2)?,
        timestamp: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::database::tests::db_with_users;

    #[test]
    fn get_conversations_returns_newest_in_chronological_order() {
        let (db, ids) = db_with_users(&["3001234567"]);
        let user = ids[0];
        for i in 1..=4 {
            db.save_conversation(user, &format!("pregunta {i}"), &format!("respuesta {i}"))
                .unwrap();
        }

        let turns = db.get_conversations(user, 3).unwrap();
        let messages: Vec<&str> = turns.iter().map(|t| t.user_message.as_str()).collect();
        assert_eq!(messages, vec!["pregunta 2", "pregunta 3", "pregunta 4"]);
    }

    #[test]
    fn complete_history_decodes_context_and_pages() {
        let (db, ids) = db_with_users(&["3001234567"]);
        let user = ids[0];
        db.save_conversation(user, "hola", "¡Hola!").unwrap();
        db.save_conversation_with_context(
            user,
            "recordatorio",
            "Dime qué quieres que te recuerde",
            Some(&serde_json::json!({"source": "fallback"})),
        )
        .unwrap();

        let page = db.get_complete_history(user, 1, 0).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].user_message, "recordatorio");
        assert_eq!(page[0].context["source"], "fallback");

        let next = db.get_complete_history(user, 1, 1).unwrap();
        assert_eq!(next[0].user_message, "hola");
        assert_eq!(next[0].context, serde_json::json!({}));
    }

    #[test]
    fn search_matches_either_side() {
        let (db, ids) = db_with_users(&["3001234567"]);
        let user = ids[0];
        db.save_conversation(user, "mi doctor", "anotado").unwrap();
        db.save_conversation(user, "hola", "visita al doctor mañana").unwrap();
        db.save_conversation(user, "gracias", "de nada").unwrap();

        let results = db.search_conversations(user, "doctor").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].user_message, "hola");
        assert_eq!(results[1].user_message, "mi doctor");
    }

    #[test]
    fn clearing_one_user_keeps_other_users_rows() {
        let (db, ids) = db_with_users(&["3001234567", "3007654321"]);
        let (alice, bob) = (ids[0], ids[1]);
        db.save_conversation(alice, "hola", "¡Hola!").unwrap();
        db.save_conversation(alice, "gracias", "¡De nada!").unwrap();
        db.save_conversation(bob, "hola", "¡Hola!").unwrap();

        assert_eq!(db.clear_conversations(alice).unwrap(), 2);
        assert!(db.get_conversations(alice, 10).unwrap().is_empty());
        assert_eq!(db.latest_conversation_id(alice).unwrap(), None);

        let bob_turns = db.get_conversations(bob, 10).unwrap();
        assert_eq!(bob_turns.len(), 1);
        assert!(db.latest_conversation_id(bob).unwrap().is_some());
    }
}
