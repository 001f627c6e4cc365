use std::env;

use folio_chat_core::{ConfigurationError, SessionManager};
use folio_chat_gemini_model::{
    GeminiConfig, GeminiConfigBuilder, GeminiProvider,
};

use crate::SYSTEM_PROMPT;

/// Environment variables holding the API key, in lookup order.
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Environment variable overriding the model.
pub const MODEL_VAR: &str = "GEMINI_MODEL";

/// Environment variable overriding the endpoint.
pub const BASE_URL_VAR: &str = "GEMINI_BASE_URL";

/// Reads the Gemini configuration from the process environment.
///
/// Blank variables count as unset.
pub fn gemini_config_from_env() -> Result<GeminiConfig, ConfigurationError> {
    gemini_config_from(|name| env::var(name).ok())
}

/// Creates a session manager that connects to Gemini with the configuration
/// found in the process environment, using the portfolio persona.
///
/// Nothing is read until the first message is sent.
pub fn session_manager_from_env() -> SessionManager {
    SessionManager::new(SYSTEM_PROMPT, || {
        let config = gemini_config_from_env()?;
        info!("connecting to Gemini with {config:?}");
        Ok(GeminiProvider::new(config))
    })
}

fn gemini_config_from(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<GeminiConfig, ConfigurationError> {
    let non_blank = |name: &str| {
        lookup(name)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    };

    let Some(api_key) =
        API_KEY_VARS.into_iter().find_map(|name| non_blank(name))
    else {
        return Err(ConfigurationError::MissingCredential {
            source: API_KEY_VARS.join(" or "),
        });
    };
    // The key travels in a request header.
    if !api_key.chars().all(|c| c.is_ascii_graphic()) {
        return Err(ConfigurationError::InvalidCredential {
            reason: "the API key contains characters that cannot be sent"
                .to_owned(),
        });
    }

    let mut builder = GeminiConfigBuilder::with_api_key(api_key);
    if let Some(model) = non_blank(MODEL_VAR) {
        builder = builder.with_model(model);
    }
    if let Some(base_url) = non_blank(BASE_URL_VAR) {
        builder = builder.with_base_url(base_url);
    }
    Ok(builder.build())
}
