use thiserror::Error;

pub type Result<T> = std::result::Result<T, CivError>;

#[derive(Debug, Error)]
pub enum CivError {
    #[cfg(feature = "serial")]
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IC-705 serial port not found")]
    PortNotFound,

    #[error("invalid BCD digit in binding `{binding}`: {text:?}")]
    InvalidDigit { binding: &'static str, text: String },

    #[error("expected {expected} BCD digits, got {actual} (value {value})")]
    DigitCount {
        expected: usize,
        actual: usize,
        value: u64,
    },

    #[error("value out of range: {0}")]
    OutOfRange(u64),

    #[error("frequency out of range: {0} Hz")]
    FrequencyOutOfRange(u64),

    #[error("unknown operating mode: {0:?}")]
    UnknownMode(String),

    #[error("invalid CI-V address: {0:?}")]
    InvalidAddress(String),

    #[error("serial sink lock poisoned")]
    SinkPoisoned,
}
