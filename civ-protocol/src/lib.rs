pub mod assembler;
pub mod bcd;
pub mod command;
pub mod decoder;
pub mod error;
pub mod frequency;
pub mod grammar;
pub mod mode;
pub mod protocol;
pub mod transport;

pub use command::CommandEncoder;
pub use decoder::{CivEvent, CivEvents, DatagramDecoder, ListenerId, ToneType};
pub use error::{CivError, Result};
pub use frequency::Frequency;
pub use mode::{Filter, OperatingMode};
