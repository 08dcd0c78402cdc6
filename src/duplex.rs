//! Repeater resolution for observed frequencies.
//!
//! The radio only tells us its frequency. Landing on a repeater input without
//! having asked for it means the operator keyed up, so that is where the
//! time-out countdown starts. Landing on an output means we are listening.

use std::sync::Arc;

use civ_protocol::command::{cmd, duplex_sub, level_sub, tone_sub, various_sub};
use civ_protocol::{CivEvents, CommandEncoder, Filter, Frequency, OperatingMode, ToneType};
use log::{debug, error};

use crate::properties::{Property, PropertyStore};
use crate::repeater::{RepeaterDir, RepeaterDirectory};
use crate::timeout::TimerHandle;

/// Other channels of the same repeater owner, in directory order.
///
/// Callsigns compare case-insensitively on their base (`k7lwh/c` is a
/// `k7lwh` channel). The repeater's own output is excluded.
pub fn repeater_bands_find<'d>(
    dir: &'d RepeaterDirectory,
    repeater: &RepeaterDir,
) -> Vec<&'d RepeaterDir> {
    let base = repeater.base_callsign();
    dir.repeaters()
        .iter()
        .filter(|r| r.base_callsign().eq_ignore_ascii_case(base))
        .filter(|r| r.output_hz != repeater.output_hz)
        .collect()
}

/// Alternate outputs as MHz text separated by spaces, or `None`.
pub fn alternates_text(dir: &RepeaterDirectory, repeater: &RepeaterDir) -> String {
    let alternates = repeater_bands_find(dir, repeater);
    if alternates.is_empty() {
        return "None".to_string();
    }
    alternates
        .iter()
        .map(|r| r.output_mhz_text())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tune to `hz` and, on a known repeater output, set its tone and duplex.
pub fn do_frequency_jump(dir: &RepeaterDirectory, encoder: &CommandEncoder, hz: u64) {
    encoder.send_set_frequency(hz);

    if let Some(repeater) = dir.by_output(hz) {
        if let Some(deci_hz) = repeater.tone_deci_hz() {
            encoder.send_set_repeater_tone(deci_hz);
            encoder.send_tone_enable(true);
        }

        let offset = repeater.input_hz() as i64 - repeater.output_hz as i64;
        if offset < 0 {
            encoder.send_command_sub(cmd::DUPLEX, duplex_sub::DUP_MINUS);
            encoder.send_freq_offset(offset.unsigned_abs());
        } else if offset > 0 {
            encoder.send_command_sub(cmd::DUPLEX, duplex_sub::DUP_PLUS);
            encoder.send_freq_offset(offset.unsigned_abs());
        }
    }

    encoder.send_command(cmd::READ_FREQ);
    query_repeater_state(encoder);
}

/// Ask for tone frequency, tone enable and RF power.
pub fn query_repeater_state(encoder: &CommandEncoder) {
    encoder.send_command_sub(cmd::TONE, tone_sub::REPEATER_TONE);
    encoder.send_command_sub(cmd::VARIOUS, various_sub::REPEATER_TONE);
    encoder.send_command_sub(cmd::LEVEL, level_sub::RF_POWER);
}

/// What an observed frequency means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'d> {
    /// Unrequested change onto a repeater input: the operator keyed up.
    Transmitting(&'d RepeaterDir),
    /// A repeater input we read back ourselves.
    TunedInput(&'d RepeaterDir),
    /// Listening on a repeater output.
    Monitoring(&'d RepeaterDir),
    Unknown,
}

impl<'d> Resolution<'d> {
    pub fn repeater(&self) -> Option<&'d RepeaterDir> {
        match *self {
            Resolution::Transmitting(r)
            | Resolution::TunedInput(r)
            | Resolution::Monitoring(r) => Some(r),
            Resolution::Unknown => None,
        }
    }
}

/// Inputs are checked before outputs.
pub fn resolve(dir: &RepeaterDirectory, requested: bool, hz: u64) -> Resolution<'_> {
    if let Some(repeater) = dir.by_input(hz) {
        if requested {
            Resolution::TunedInput(repeater)
        } else {
            Resolution::Transmitting(repeater)
        }
    } else if let Some(repeater) = dir.by_output(hz) {
        Resolution::Monitoring(repeater)
    } else {
        Resolution::Unknown
    }
}

/// Decoder listener that keeps the operator's view of the radio current.
pub struct RepeaterMonitor {
    directory: Arc<RepeaterDirectory>,
    encoder: CommandEncoder,
    props: Arc<dyn PropertyStore>,
    timer: Option<TimerHandle>,
    radio_tone: Option<f64>,
}

impl RepeaterMonitor {
    pub fn new(
        directory: Arc<RepeaterDirectory>,
        encoder: CommandEncoder,
        props: Arc<dyn PropertyStore>,
    ) -> Self {
        Self {
            directory,
            encoder,
            props,
            timer: None,
            radio_tone: None,
        }
    }

    /// Last repeater tone the radio reported.
    pub fn radio_tone(&self) -> Option<f64> {
        self.radio_tone
    }

    pub fn timer_running(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn set(&self, property: Property, value: impl Into<String>) {
        self.props.update(property, value.into());
    }

    fn start_timer(&mut self, timeout_secs: u32) {
        if tokio::runtime::Handle::try_current().is_err() {
            error!("no async runtime, time-out countdown not started");
            return;
        }
        self.timer = Some(TimerHandle::spawn(timeout_secs, Arc::clone(&self.props)));
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            debug!("countdown stopped");
            timer.stop();
        }
    }

    fn show_repeater(&self, repeater: &RepeaterDir) {
        if let Some(info) = self.directory.info(&repeater.callsign) {
            self.set(Property::Location, info.location.as_str());
            self.set(Property::Group, info.group.as_str());
            self.set(Property::RepeaterTone, repeater.tone.as_str());
            self.set(Property::RepeaterUrl, info.url.as_str());
        }
        self.set(Property::Alternates, alternates_text(&self.directory, repeater));
    }
}

impl CivEvents for RepeaterMonitor {
    fn frequency_changed(&mut self, requested: bool, hz: u64) {
        let frequency = match Frequency::from_hz(hz) {
            Ok(f) => f.to_string(),
            Err(_) => format!("{hz} Hz"),
        };

        self.props.clear();
        self.set(Property::Timer, "Stopped");
        self.set(Property::RadioLink, "On");
        self.set(Property::Frequency, frequency);

        let directory = Arc::clone(&self.directory);
        let resolution = resolve(&directory, requested, hz);
        match resolution {
            Resolution::Transmitting(repeater) => {
                self.set(Property::Timer, "Timer start...");
                self.set(Property::Callsign, repeater.callsign.as_str());
                self.stop_timer();
                self.start_timer(repeater.timeout_secs);
            }
            Resolution::TunedInput(repeater) => {
                self.set(Property::Callsign, repeater.callsign.as_str());
            }
            Resolution::Monitoring(repeater) => {
                self.set(Property::Timer, "Timer stop...");
                self.set(Property::Callsign, repeater.callsign.as_str());
                self.stop_timer();
            }
            Resolution::Unknown => self.stop_timer(),
        }

        if let Some(repeater) = resolution.repeater().filter(|r| !r.callsign.is_empty()) {
            self.show_repeater(repeater);
        }

        query_repeater_state(&self.encoder);
    }

    fn mode_changed(&mut self, mode: OperatingMode, _filter: &Filter) {
        self.set(Property::Mode, mode.name());
    }

    fn tone_report(&mut self, hz: f64, kind: ToneType) {
        if kind == ToneType::Tone {
            self.radio_tone = Some(hz);
        }
    }

    fn tone_enable(&mut self, enabled: bool) {
        self.set(Property::ToneEnable, enabled.to_string());
    }

    fn power_level(&mut self, level: u8) {
        let percent = f64::from(level) / 255.0 * 100.0;
        self.set(Property::PowerLevel, format!("{percent:.2}%"));
    }

    fn parser_error(&mut self, offset: usize) {
        debug!("unparsed radio data at byte {offset}");
    }
}
