use chipi_common::{Error, Result};

pub const PASSWORD_MIN_LENGTH: usize = 6;
const PHONE_LENGTH: usize = 10;

pub const MSG_MISSING_FIELDS: &str = "Por favor completa todos los campos";
pub const MSG_PASSWORD_MISMATCH: &str = "Las contraseñas no coinciden";
pub const MSG_INVALID_PHONE: &str =
    "Número de teléfono inválido. Debe tener 10 dígitos y comenzar con 3.";
pub const MSG_SHORT_PASSWORD: &str = "La contraseña debe tener al menos 6 caracteres";

/// Input validation and sanitization for form and chat input.
pub struct InputValidator;

impl InputValidator {
    /// Mobile numbers are exactly ten ASCII digits and start with `3`.
    pub fn is_valid_phone(phone: &str) -> bool {
        phone.len() == PHONE_LENGTH
            && phone.starts_with('3')
            && phone.chars().all(|c| c.is_ascii_digit())
    }

    pub fn is_valid_password(password: &str) -> bool {
        password.chars().count() >= PASSWORD_MIN_LENGTH
    }

    /// Sanitize user input by removing control characters.
    pub fn sanitize(input: &str) -> String {
        input
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect()
    }
}

/// Fields submitted by the registration page, already trimmed.
#[derive(Debug, Clone)]
pub struct RegistrationForm {
    pub phone: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegistrationForm {
    pub fn new(phone: &str, password: &str, confirm_password: &str) -> Self {
        Self {
            phone: phone.trim().to_string(),
            password: password.trim().to_string(),
            confirm_password: confirm_password.trim().to_string(),
        }
    }

    /// Checks run in a fixed order; the first failure is reported.
    pub fn validate(&self) -> Result<()> {
        if self.phone.is_empty() || self.password.is_empty() || self.confirm_password.is_empty() {
            return Err(Error::Validation(MSG_MISSING_FIELDS.into()));
        }
        if self.password != self.confirm_password {
            return Err(Error::Validation(MSG_PASSWORD_MISMATCH.into()));
        }
        if !InputValidator::is_valid_phone(&self.phone) {
            return Err(Error::Validation(MSG_INVALID_PHONE.into()));
        }
        if !InputValidator::is_valid_password(&self.password) {
            return Err(Error::Validation(MSG_SHORT_PASSWORD.into()));
        }
        Ok(())
    }
}
