use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use log::debug;

/// Radio status fields shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Property {
    Timer,
    RadioLink,
    Frequency,
    Mode,
    Callsign,
    Location,
    Group,
    RepeaterTone,
    RepeaterUrl,
    Alternates,
    ToneEnable,
    PowerLevel,
}

impl Property {
    pub fn label(self) -> &'static str {
        match self {
            Self::Timer => "Timer",
            Self::RadioLink => "Radio Link",
            Self::Frequency => "Frequency",
            Self::Mode => "Mode",
            Self::Callsign => "Callsign",
            Self::Location => "Location",
            Self::Group => "Group",
            Self::RepeaterTone => "Repeater Tone",
            Self::RepeaterUrl => "Repeater URL",
            Self::Alternates => "Alternates",
            Self::ToneEnable => "Rptr Tone Enable",
            Self::PowerLevel => "Power Level",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where the monitor and the countdown publish status.
///
/// Shared between the poll task and the timeout task, so updates take `&self`.
pub trait PropertyStore: Send + Sync {
    fn update(&self, property: Property, value: String);

    /// Empty every value.
    fn clear(&self);
}

/// Keeps the latest value of each property.
#[derive(Debug, Default)]
pub struct MemoryProperties {
    values: Mutex<BTreeMap<Property, String>>,
}

impl MemoryProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, property: Property) -> Option<String> {
        self.values
            .lock()
            .ok()
            .and_then(|values| values.get(&property).cloned())
    }
}

impl PropertyStore for MemoryProperties {
    fn update(&self, property: Property, value: String) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(property, value);
        }
    }

    fn clear(&self) {
        if let Ok(mut values) = self.values.lock() {
            values.clear();
        }
    }
}

/// Prints each update to stdout, one `label: value` line.
#[derive(Debug, Default)]
pub struct ConsoleProperties;

impl PropertyStore for ConsoleProperties {
    fn update(&self, property: Property, value: String) {
        println!("{:>16}: {}", property.label(), value);
    }

    fn clear(&self) {
        debug!("properties cleared");
    }
}
