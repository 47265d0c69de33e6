//! Localized substitute replies used when the completion gateway cannot answer.

use crate::core::assistant::GatewayError;
use crate::infrastructure::config::AppConfig;
use di::{Ref, inject, injectable};
use log::warn;
use std::collections::HashMap;
use std::env;

pub const NOT_CONFIGURED: &str = "not_configured";
pub const INVALID_CREDENTIAL: &str = "invalid_credential";
pub const QUOTA_EXCEEDED: &str = "quota_exceeded";
pub const CONTENT_BLOCKED: &str = "content_blocked";
pub const GENERIC_FAILURE: &str = "generic_failure";
pub const DEFAULT_INSTRUCTION: &str = "default_instruction";

const KEYS: [&str; 6] = [
    NOT_CONFIGURED,
    INVALID_CREDENTIAL,
    QUOTA_EXCEEDED,
    CONTENT_BLOCKED,
    GENERIC_FAILURE,
    DEFAULT_INSTRUCTION,
];

fn builtin(locale: &str, key: &str) -> &'static str {
    match (locale, key) {
        ("en", NOT_CONFIGURED) => {
            r#"[Gemini AI not configured] Simulated reply to the message: "{{ message }}". Please set GEMINI_API_KEY in the environment."#
        }
        ("en", INVALID_CREDENTIAL) => "Error: the Gemini API key is invalid or has expired.",
        ("en", QUOTA_EXCEEDED) => {
            "Sorry, the API usage limit has been exceeded. Please try again later."
        }
        ("en", CONTENT_BLOCKED) => {
            "Sorry, I can't reply to that message because of content restrictions."
        }
        ("en", GENERIC_FAILURE) => {
            "Sorry, there was an error processing your message. Please try again."
        }
        ("en", _) => "You are a helpful and friendly assistant. Answer clearly and concisely.",
        (_, NOT_CONFIGURED) => {
            r#"[Gemini AI no configurado] Respuesta simulada al mensaje: "{{ message }}". Por favor, configura GEMINI_API_KEY en las variables de entorno."#
        }
        (_, INVALID_CREDENTIAL) => "Error: La API key de Gemini no es válida o ha expirado.",
        (_, QUOTA_EXCEEDED) => {
            "Lo siento, se ha excedido el límite de uso de la API. Por favor, intenta más tarde."
        }
        (_, CONTENT_BLOCKED) => {
            "Lo siento, no puedo responder a ese mensaje debido a restricciones de contenido."
        }
        (_, GENERIC_FAILURE) => {
            "Lo siento, hubo un error al procesar tu mensaje. Por favor, intenta de nuevo."
        }
        _ => "Eres un asistente útil y amigable. Responde de manera clara y concisa.",
    }
}

/// Template sources keyed by reply kind, rendered with minijinja.
pub struct ReplyTemplates {
    templates: HashMap<&'static str, String>,
}

#[injectable]
impl ReplyTemplates {
    #[inject]
    pub fn create(config: Ref<AppConfig>) -> ReplyTemplates {
        let mut templates = ReplyTemplates::for_locale(&config.reply_locale);

        for key in KEYS {
            let var = format!("REPLY_TEMPLATE_{}", key.to_uppercase());
            if let Ok(source) = env::var(&var) {
                templates.templates.insert(key, source);
            }
        }

        templates
    }
}

impl ReplyTemplates {
    pub fn for_locale(locale: &str) -> ReplyTemplates {
        let locale = if locale.starts_with("en") { "en" } else { "es" };

        ReplyTemplates {
            templates: KEYS
                .iter()
                .map(|key| (*key, builtin(locale, key).to_owned()))
                .collect(),
        }
    }

    pub fn with_template(mut self, key: &'static str, source: impl Into<String>) -> Self {
        self.templates.insert(key, source.into());
        self
    }

    fn render(&self, key: &str, message: &str) -> String {
        let source = self
            .templates
            .get(key)
            .map(String::as_str)
            .unwrap_or_default();

        minijinja::Environment::new()
            .render_str(source, minijinja::context! { message => message })
            .unwrap_or_else(|e| {
                warn!("failed to render reply template {key}: {e}");
                source.to_owned()
            })
    }

    /// Instruction used for conversations without an assigned prompt.
    pub fn default_instruction(&self) -> String {
        self.render(DEFAULT_INSTRUCTION, "")
    }

    /// Substitute AI reply for a failed or unavailable completion of `message`.
    pub fn for_failure(&self, error: &GatewayError, message: &str) -> String {
        let key = match error {
            GatewayError::NotConfigured => NOT_CONFIGURED,
            GatewayError::InvalidCredential => INVALID_CREDENTIAL,
            GatewayError::QuotaExceeded => QUOTA_EXCEEDED,
            GatewayError::ContentBlocked => CONTENT_BLOCKED,
            GatewayError::Timeout | GatewayError::Other(_) => GENERIC_FAILURE,
        };
        self.render(key, message)
    }
}
