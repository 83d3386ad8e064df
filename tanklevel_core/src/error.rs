use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TankError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for hardware")]
    Timeout,
    #[error("unrecoverable link failure: {0}")]
    FatalLink(&'static str),
    #[error("payload exceeds wire limit: {0} bytes")]
    PayloadTooLarge(usize),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing ranger")]
    MissingRanger,
    #[error("missing network link")]
    MissingLink,
    #[error("missing tank geometry")]
    MissingGeometry,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
