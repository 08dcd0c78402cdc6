use civ_protocol::CivError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Civ(#[from] CivError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid value for {var}: {source}")]
    Config {
        var: &'static str,
        #[source]
        source: CivError,
    },

    #[error("ingest queue capacity must be at least 1")]
    ZeroQueueCapacity,
}
