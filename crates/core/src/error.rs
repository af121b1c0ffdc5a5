use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlannerError {
    #[error("completion service is not configured: {0}")]
    Configuration(String),

    #[error("completion service call failed: {0}")]
    Upstream(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("storage failure: {0:#}")]
    Storage(#[source] anyhow::Error),
}

impl PlannerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Upstream(_) => "upstream_error",
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "storage_error",
        }
    }
}

pub type PlannerResult<T> = Result<T, PlannerError>;
