use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Verification error: {0}")]
    Verification(String),

    #[error("Risk check error: {0}")]
    RiskCheck(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Kill switch active: {0}")]
    KillSwitch(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn collaborator(err: impl std::fmt::Display) -> Self {
        EngineError::Collaborator(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
