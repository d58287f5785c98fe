pub mod contacts;
pub mod conversations;
pub mod database;
pub mod migrations;
pub mod passwords;
pub mod preferences;
pub mod reminders;
pub mod users;

pub use contacts::Contact;
pub use conversations::{ConversationRecord, ConversationTurn};
pub use database::Database;
pub use passwords::StoredPassword;
pub use reminders::Reminder;
pub use users::User;
