pub mod password;
pub mod validation;

pub use password::{hash_password, verify_password};
pub use validation::{InputValidator, RegistrationForm};
