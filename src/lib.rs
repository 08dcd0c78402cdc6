pub mod config;
pub mod duplex;
pub mod error;
pub mod properties;
pub mod repeater;
pub mod session;
pub mod timeout;

pub use config::{CivConfig, PollPolicy};
pub use duplex::{RepeaterMonitor, do_frequency_jump, repeater_bands_find};
pub use error::{Error, Result};
pub use properties::{Property, PropertyStore};
pub use repeater::{RepeaterDir, RepeaterDirectory, RepeaterInfo};
pub use session::Session;
pub use timeout::{TimeoutListener, TimerHandle};
