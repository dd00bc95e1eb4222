/// Shared error type used across all Tiller crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider: {0}")]
    Provider(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool already registered: {0}")]
    ToolDuplicate(String),

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("hook {phase} in skill {skill}: {message}")]
    Hook {
        skill: String,
        phase: String,
        message: String,
    },

    #[error("turn limit reached ({0} iterations)")]
    TurnLimit(usize),

    #[error("cancelled")]
    Cancelled,

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error was produced by turn cancellation (as opposed to
    /// a genuine failure). Callers use this to suppress retry logic.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
