use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeederError {
    #[error("no cans loaded")]
    NoCans,
    #[error("magazine full")]
    MagazineFull,
    #[error("machine busy: {0}")]
    Busy(&'static str),
    #[error("invalid state: {0}")]
    State(String),
}
