use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RecommendError {
    #[error("schema error: {0}")]
    Schema(String),
    #[error("empty vocabulary: {0}")]
    EmptyVocabulary(String),
    #[error("no catalog item matches `{query}`")]
    NotFound { query: String },
}

impl RecommendError {
    pub fn missing_identity_field(field: &str) -> Self {
        Self::Schema(format!("identity field `{field}` is absent from every catalog row"))
    }

    /// Stable machine-readable class used in command payloads and serving-layer mapping.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Schema(_) => "schema",
            Self::EmptyVocabulary(_) => "empty_vocabulary",
            Self::NotFound { .. } => "not_found",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "That song is not in the catalog. Try a different title.",
            Self::Schema(_) | Self::EmptyVocabulary(_) => {
                "The recommendation catalog is not available right now."
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
