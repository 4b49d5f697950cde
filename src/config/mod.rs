pub mod prompt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API key not found. Please set OPENAI_API_KEY in your .env file.")]
    MissingApiKey,
    #[error("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.")]
    IncompleteTls,
}
