//! Error taxonomy of the pipeline.
//!
//! Fetch and persistence failures abort the current job iteration only;
//! the next scheduler tick is the retry. Model fitting failures and
//! malformed samples never leave the forecast module.

use crate::forecast::graph::GraphFormatError;

/// Échec de l'appel au service de supervision externe
#[derive(Debug, thiserror::Error)]
pub enum FetchFailure {
    #[error("{endpoint}: unexpected HTTP status {status}")]
    Status { endpoint: String, status: u16 },
    #[error("{endpoint}: transport error: {message}")]
    Transport { endpoint: String, message: String },
    #[error("{endpoint}: timed out")]
    Timeout { endpoint: String },
    #[error("{endpoint}: invalid JSON payload: {message}")]
    Decode { endpoint: String, message: String },
}

/// Échec de lecture/écriture du stockage persistant
#[derive(Debug, thiserror::Error)]
pub enum PersistenceFailure {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store operation `{operation}` timed out")]
    Timeout { operation: &'static str },
}

/// Configuration invalide ou incomplète, fatale au démarrage
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Erreur d'une itération de job
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchFailure),
    #[error(transparent)]
    Persistence(#[from] PersistenceFailure),
    #[error("graph payload rejected: {0}")]
    Graph(#[from] GraphFormatError),
}
