use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Invalid rank: {0}")]
    InvalidRank(char),

    #[error("Invalid suit: {0}")]
    InvalidSuit(char),

    #[error("Invalid card index: {0}")]
    InvalidCard(u8),

    #[error("Invalid card notation: {0}")]
    InvalidCardNotation(String),

    #[error("Invalid board notation: {0}")]
    InvalidBoardNotation(String),

    #[error("Invalid hand notation: {0}")]
    InvalidHandNotation(String),

    #[error("Board must have 3, 4 or 5 cards, got {0}")]
    InvalidBoardSize(usize),

    #[error("Duplicate card: {0}")]
    DuplicateCard(String),

    #[error("Stacks and pot must be non-negative")]
    InvalidStacks,

    #[error("{0} range is empty")]
    EmptyRange(&'static str),

    #[error("Tree pool overflow in {array} (limit: {limit})")]
    PoolOverflow { array: &'static str, limit: usize },

    #[error("No tree built; call build_tree first")]
    TreeNotBuilt,

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type SolverResult<T> = Result<T, SolverError>;
