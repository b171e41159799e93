use thiserror::Error;

#[derive(Debug, Error)]
pub enum RamboError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Persist: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown set: {0}")]
    UnknownSet(String),

    #[error("Partition map not built (call create_meta_rambo first)")]
    NotConstructed,

    #[error("Partition map cannot be rebuilt after insertion")]
    AlreadyPopulated,

    #[error("Set {0} is not routed to the rare pool")]
    NotRare(String),

    #[error("Bad magic or version")]
    BadHeader,

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Parameter blocks of fragments differ")]
    ParamMismatch,

    #[error("Partition maps of fragments differ")]
    MetaMismatch,

    #[error("Repeat {0} missing from all fragments")]
    MissingRepeat(u32),
}

pub type Result<T> = std::result::Result<T, RamboError>;
