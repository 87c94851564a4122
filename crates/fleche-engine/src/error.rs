use fleche_store::StoreError;

/// Game-level error taxonomy. Lost claim races are deliberately NOT an
/// error: they resolve to a silent no-op inside the resolver.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// Malformed input (pseudo, color, code, cell position or value).
    #[error("invalid input: {0}")]
    Validation(String),

    /// Unknown game code or grid.
    #[error("not found: {0}")]
    NotFound(String),

    /// Owner-only action attempted by a non-owner.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Grid generation ran out of retries without placing a single word.
    /// Fatal to the create-game / next-grid operation.
    #[error("grid generation failed: {0}")]
    Generation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GameError {
    /// Short classification string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Generation(_) => "generation",
            Self::Store(_) => "store",
        }
    }
}

impl From<GameError> for String {
    fn from(e: GameError) -> Self {
        e.to_string()
    }
}
