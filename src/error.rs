use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Ontology error: {0}")]
    Ontology(String),

    #[error("Semantic store error: {0}")]
    Store(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ResolverError>;
