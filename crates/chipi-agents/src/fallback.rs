//! Static replies used when the model endpoint is not configured or fails.

use chrono::{Local, NaiveDateTime};

/// Checked in order; the first key contained in the message wins.
const RESPONSES: &[(&str, &str)] = &[
    (
        "hola",
        "¡Hola! Soy Chipi, tu asistente virtual. ¿En qué puedo ayudarte hoy?",
    ),
    (
        "cómo estás",
        "Estoy muy bien, gracias por preguntar. ¿Y tú cómo estás?",
    ),
    (
        "qué puedes hacer",
        "Puedo ayudarte con muchas cosas: guardar contraseñas, crear recordatorios, responder tus preguntas y más. ¿Qué necesitas?",
    ),
    (
        "abrir",
        "¡Claro! ¿Qué aplicación quieres abrir? WhatsApp, Facebook, Instagram...",
    ),
    (
        "recordatorio",
        "Dime qué quieres que te recuerde y a qué hora.",
    ),
    (
        "contraseña",
        "Para guardar contraseñas, dime: \"Mi contraseña de [servicio] es [contraseña]\"",
    ),
    (
        "contacto",
        "Para guardar contactos, dime: \"Guarda a [nombre] con el número [teléfono]\"",
    ),
    (
        "gracias",
        "¡De nada! Estoy aquí para ayudarte siempre que me necesites.",
    ),
];

const APP_NAMES: &[&str] = &["whatsapp", "facebook", "instagram", "twitter"];
const TIME_WORDS: &[&str] = &["hora", "fecha", "día"];

pub const OPENING_APP: &str = "¡Perfecto! Abriendo la aplicación que mencionaste.";
pub const DEFAULT_REPLY: &str = "Entendido. ¿En qué más puedo ayudarte? Puedo guardar contraseñas, crear recordatorios o responder tus preguntas.";

pub fn respond(message: &str) -> String {
    respond_at(message, Local::now().naive_local())
}

/// Like [`respond`], with the clock supplied by the caller.
pub fn respond_at(message: &str, now: NaiveDateTime) -> String {
    let lowered = message.to_lowercase();

    if let Some((_, reply)) = RESPONSES.iter().find(|(key, _)| lowered.contains(key)) {
        return (*reply).to_string();
    }
    if APP_NAMES.iter().any(|app| lowered.contains(app)) {
        return OPENING_APP.to_string();
    }
    if TIME_WORDS.iter().any(|word| lowered.contains(word)) {
        return format!(
            "Son las {} del {}",
            now.format("%H:%M"),
            now.format("%d/%m/%Y")
        );
    }
    DEFAULT_REPLY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 7)
            .and_then(|d| d.and_hms_opt(14, 5, 0))
            .unwrap()
    }

    #[test]
    fn greeting_matches_case_insensitively() {
        assert!(respond_at("HOLA Chipi", noon()).starts_with("¡Hola! Soy Chipi"));
    }

    #[test]
    fn earlier_table_entries_win() {
        // "hola" precedes "gracias" in the table.
        assert!(respond_at("gracias, hola", noon()).starts_with("¡Hola!"));
        // "abrir" precedes the app-name rule.
        assert!(respond_at("abrir whatsapp", noon()).starts_with("¡Claro!"));
        assert_eq!(
            respond_at("recordatorio de mi contraseña", noon()),
            "Dime qué quieres que te recuerde y a qué hora."
        );
    }

    #[test]
    fn app_names_and_time_words() {
        assert_eq!(respond_at("Instagram", noon()), OPENING_APP);
        assert_eq!(
            respond_at("¿qué hora es?", noon()),
            "Son las 14:05 del 07/05/2024"
        );
        assert_eq!(
            respond_at("qué día es hoy", noon()),
            "Son las 14:05 del 07/05/2024"
        );
    }

    #[test]
    fn unknown_message_gets_default() {
        assert_eq!(respond_at("xyz", noon()), DEFAULT_REPLY);
        assert_eq!(respond(""), DEFAULT_REPLY);
    }
}
