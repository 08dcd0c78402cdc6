//! Inbound datagram decoding.
//!
//! A raw chunk from the serial reader is turned into a token line by the
//! [`FrameAssembler`], matched against the CI-V grammar, and every datagram
//! found is reduced to a [`CivEvent`] and handed to the registered
//! [`CivEvents`] listeners in registration order.

use log::{debug, error, trace, warn};

use crate::assembler::FrameAssembler;
use crate::bcd;
use crate::command::{cmd, tone_sub};
use crate::error::{CivError, Result};
use crate::frequency::{DIGIT_NAMES, FREQ_DIGITS};
use crate::grammar::{Bindings, Grammar, Node, StateId, bind, hex, lit, not_ahead, sep, state};
use crate::mode::{Filter, OperatingMode};

/// Which tone a tone report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToneType {
    /// Repeater (transmit) tone.
    Tone,
    /// Tone squelch.
    Tsql,
}

impl ToneType {
    fn from_sub(sub: u8) -> Option<Self> {
        match sub {
            tone_sub::REPEATER_TONE => Some(Self::Tone),
            tone_sub::TSQL_TONE => Some(Self::Tsql),
            _ => None,
        }
    }
}

/// One decoded datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum CivEvent {
    /// `requested` is true for a reply to a read (0x03), false for an
    /// unsolicited transceive broadcast (0x00).
    FrequencyChanged { hz: u64, requested: bool },
    ModeChanged { mode: OperatingMode, filter: Filter },
    ToneReport { hz: f64, kind: ToneType },
    ToneEnable { enabled: bool },
    /// RF power, 0 to 255.
    PowerLevel { level: u8 },
    /// No datagram could be matched at this byte offset of the chunk.
    ParserError { offset: usize },
}

impl CivEvent {
    /// Dispatch to the matching [`CivEvents`] method.
    pub fn deliver(&self, sink: &mut dyn CivEvents) {
        match self {
            CivEvent::FrequencyChanged { hz, requested } => {
                sink.frequency_changed(*requested, *hz)
            }
            CivEvent::ModeChanged { mode, filter } => sink.mode_changed(*mode, filter),
            CivEvent::ToneReport { hz, kind } => sink.tone_report(*hz, *kind),
            CivEvent::ToneEnable { enabled } => sink.tone_enable(*enabled),
            CivEvent::PowerLevel { level } => sink.power_level(*level),
            CivEvent::ParserError { offset } => sink.parser_error(*offset),
        }
    }
}

/// Receiver of decoded events. Every method defaults to doing nothing.
pub trait CivEvents {
    fn frequency_changed(&mut self, _requested: bool, _hz: u64) {}
    fn mode_changed(&mut self, _mode: OperatingMode, _filter: &Filter) {}
    fn tone_report(&mut self, _hz: f64, _kind: ToneType) {}
    fn tone_enable(&mut self, _enabled: bool) {}
    fn power_level(&mut self, _level: u8) {}
    fn parser_error(&mut self, _offset: usize) {}
}

/// Handle returned by [`DatagramDecoder::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn CivEvents + Send>;

/// Width of one token in the assembled line: two hex digits and a space.
const TOKEN_WIDTH: usize = 3;

const PREAMBLE_TOKENS: &str = "FE FE ";

/// The preamble byte never appears inside a datagram body.
const PREAMBLE_BYTE: &str = "FE";

pub struct DatagramDecoder {
    assembler: FrameAssembler,
    grammar: Grammar,
    start: StateId,
    listeners: Vec<(ListenerId, Listener)>,
    next_id: u64,
}

impl Default for DatagramDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DatagramDecoder {
    pub fn new() -> Self {
        let (grammar, start) = civ_grammar();
        Self {
            assembler: FrameAssembler::new(),
            grammar,
            start,
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    pub fn add_listener(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Returns the listener if it was registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> Option<Listener> {
        let index = self.listeners.iter().position(|(lid, _)| *lid == id)?;
        Some(self.listeners.remove(index).1)
    }

    /// Decode every datagram in `raw` and notify the listeners.
    ///
    /// Returns the number of events delivered, parser errors excluded. Text
    /// that does not match is reported once per run, then matching resumes
    /// at the next `FE FE`.
    pub fn parse(&mut self, raw: &[u8]) -> usize {
        let Self {
            assembler,
            grammar,
            start,
            listeners,
            ..
        } = self;
        let line = assembler.assemble(raw);
        trace!("RX: {}", line);

        let mut pos = 0;
        let mut delivered = 0;
        while pos < line.len() {
            let Some(m) = grammar.match_at(*start, line, pos) else {
                let offset = pos / TOKEN_WIDTH;
                debug!("no datagram at byte {offset}: {:?}", &line[pos..]);
                notify(listeners, &CivEvent::ParserError { offset });
                pos = line[pos + 1..]
                    .find(PREAMBLE_TOKENS)
                    .map_or(line.len(), |i| pos + 1 + i);
                continue;
            };
            pos = m.span.end;

            match decode(&m.bindings, line) {
                Ok(Some(event)) => {
                    debug!("decoded {:?}", event);
                    notify(listeners, &event);
                    delivered += 1;
                }
                Ok(None) => {}
                Err(e @ CivError::UnknownMode(_)) => error!("{e}"),
                Err(e) => warn!("skipping datagram: {e}"),
            }
        }
        delivered
    }
}

fn notify(listeners: &mut [(ListenerId, Listener)], event: &CivEvent) {
    for (_, listener) in listeners.iter_mut() {
        event.deliver(listener.as_mut());
    }
}

/// Build the CI-V datagram grammar and return it with its start state.
///
/// Top-level bindings are `dest`, `source`, `cmdid`, `cmdsub` and `data`;
/// the field bindings sit nested under `data`.
pub fn civ_grammar() -> (Grammar, StateId) {
    let mut g = Grammar::new();
    let datagram = g.declare();
    let preamble = g.declare();
    let byte = g.declare();
    let command = g.declare();
    let freq_cmd = g.declare();
    let freq_data = g.declare();
    let mode_cmd = g.declare();
    let mode_data = g.declare();
    let tone_sub = g.declare();
    let tone_data = g.declare();
    let flag_data = g.declare();
    let level_data = g.declare();
    let rest = g.declare();

    g.define(
        datagram,
        vec![vec![
            lit("FE "),
            state(preamble),
            bind("dest", state(byte)),
            sep(),
            bind("source", state(byte)),
            sep(),
            state(command),
        ]],
    );
    g.define(
        preamble,
        vec![vec![lit("FE "), state(preamble)], vec![lit("FE ")]],
    );
    // A truncated datagram must not run on into the next preamble.
    g.define(byte, vec![vec![body(), hex(), hex()]]);

    g.define(
        command,
        vec![
            vec![
                bind("cmdid", state(freq_cmd)),
                sep(),
                bind("data", state(freq_data)),
                lit("FD "),
            ],
            vec![
                bind("cmdid", state(mode_cmd)),
                sep(),
                bind("data", state(mode_data)),
                lit("FD "),
            ],
            vec![
                bind("cmdid", lit("1B")),
                sep(),
                bind("cmdsub", state(tone_sub)),
                sep(),
                bind("data", state(tone_data)),
                lit("FD "),
            ],
            vec![
                bind("cmdid", lit("16")),
                sep(),
                bind("cmdsub", lit("42")),
                sep(),
                bind("data", state(flag_data)),
                lit("FD "),
            ],
            vec![
                bind("cmdid", lit("14")),
                sep(),
                bind("cmdsub", lit("0A")),
                sep(),
                bind("data", state(level_data)),
                lit("FD "),
            ],
            // Anything else, including our own echoed requests.
            vec![bind("cmdid", state(byte)), sep(), state(rest)],
        ],
    );

    g.define(freq_cmd, vec![vec![lit("00")], vec![lit("03")]]);
    // Each byte carries the higher digit in its first nibble.
    let mut freq_nodes = Vec::with_capacity(FREQ_DIGITS / 2 * 4);
    for pair in DIGIT_NAMES.chunks(2) {
        freq_nodes.push(body());
        freq_nodes.push(bind(pair[1], hex()));
        freq_nodes.push(bind(pair[0], hex()));
        freq_nodes.push(sep());
    }
    g.define(freq_data, vec![freq_nodes]);

    g.define(mode_cmd, vec![vec![lit("01")], vec![lit("04")]]);
    g.define(
        mode_data,
        vec![
            vec![
                bind("mode", state(byte)),
                sep(),
                bind("filter", state(byte)),
                sep(),
            ],
            vec![bind("mode", state(byte)), sep()],
        ],
    );

    g.define(tone_sub, vec![vec![lit("00")], vec![lit("01")]]);
    let tone_digits = || {
        vec![
            body(),
            bind("hundreds", hex()),
            bind("tens", hex()),
            sep(),
            body(),
            bind("units", hex()),
            bind("tenths", hex()),
            sep(),
        ]
    };
    let mut padded = vec![lit("00 ")];
    padded.extend(tone_digits());
    g.define(tone_data, vec![padded, tone_digits()]);

    g.define(flag_data, vec![vec![bind("value", state(byte)), sep()]]);
    g.define(
        level_data,
        vec![vec![
            body(),
            bind("thousands", hex()),
            bind("hundreds", hex()),
            sep(),
            body(),
            bind("tens", hex()),
            bind("units", hex()),
            sep(),
        ]],
    );

    g.define(
        rest,
        vec![vec![lit("FD ")], vec![state(byte), sep(), state(rest)]],
    );

    (g, datagram)
}

fn body() -> Node {
    not_ahead(PREAMBLE_BYTE)
}

/// Reduce one matched datagram to an event.
///
/// `Ok(None)` means the datagram is well-formed but carries nothing the
/// listeners care about.
pub fn decode(bindings: &Bindings, line: &str) -> Result<Option<CivEvent>> {
    let Some(cmdid) = byte_value(bindings, "cmdid", line) else {
        return Ok(None);
    };
    let Some(data) = bindings.nested("data") else {
        return Ok(None);
    };

    let event = match cmdid {
        cmd::TRANSCEIVE_FREQ | cmd::READ_FREQ => CivEvent::FrequencyChanged {
            hz: frequency_from(data, line)?,
            requested: cmdid == cmd::READ_FREQ,
        },
        cmd::TRANSCEIVE_MODE | cmd::READ_MODE => {
            let code = data.text("mode", line).unwrap_or_default();
            let mode = OperatingMode::from_code(code)?;
            let filter = Filter::from_code(data.text("filter", line).unwrap_or_default());
            CivEvent::ModeChanged { mode, filter }
        }
        cmd::TONE => {
            let Some(kind) = byte_value(bindings, "cmdsub", line).and_then(ToneType::from_sub)
            else {
                return Ok(None);
            };
            let deci = number_from(data, line, &["hundreds", "tens", "units", "tenths"])?;
            CivEvent::ToneReport {
                hz: deci as f64 / 10.0,
                kind,
            }
        }
        cmd::VARIOUS => {
            let value = number_from(data, line, &["value"])?;
            match value {
                0 => CivEvent::ToneEnable { enabled: false },
                1 => CivEvent::ToneEnable { enabled: true },
                other => return Err(CivError::OutOfRange(other)),
            }
        }
        cmd::LEVEL => {
            let value = number_from(data, line, &["thousands", "hundreds", "tens", "units"])?;
            let level = u8::try_from(value).map_err(|_| CivError::OutOfRange(value))?;
            CivEvent::PowerLevel { level }
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// A captured hex byte such as `cmdid`.
fn byte_value(bindings: &Bindings, name: &str, line: &str) -> Option<u8> {
    bindings
        .text(name, line)
        .and_then(|text| u8::from_str_radix(text, 16).ok())
}

fn frequency_from(data: &Bindings, line: &str) -> Result<u64> {
    let mut digits = [0u8; FREQ_DIGITS];
    for (digit, name) in digits.iter_mut().zip(DIGIT_NAMES) {
        *digit = bcd::parse_digit(name, binding_text(data, name, line)?)?;
    }
    Ok(bcd::value_from_digits_le(&digits))
}

/// Decimal value of the named bindings, most significant first.
///
/// A binding may span several nibbles, e.g. a whole byte.
fn number_from(data: &Bindings, line: &str, names: &[&'static str]) -> Result<u64> {
    let mut value = 0u64;
    for &name in names {
        for c in binding_text(data, name, line)?.chars() {
            let digit = bcd::parse_digit(name, c.encode_utf8(&mut [0; 4]))?;
            value = value * 10 + u64::from(digit);
        }
    }
    Ok(value)
}

fn binding_text<'t>(data: &Bindings, name: &'static str, line: &'t str) -> Result<&'t str> {
    data.text(name, line).ok_or(CivError::InvalidDigit {
        binding: name,
        text: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<CivEvent>>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<CivEvent> {
            self.events.lock().unwrap().clone()
        }

        fn push(&mut self, event: CivEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl CivEvents for Recorder {
        fn frequency_changed(&mut self, requested: bool, hz: u64) {
            self.push(CivEvent::FrequencyChanged { hz, requested });
        }
        fn mode_changed(&mut self, mode: OperatingMode, filter: &Filter) {
            self.push(CivEvent::ModeChanged {
                mode,
                filter: filter.clone(),
            });
        }
        fn tone_report(&mut self, hz: f64, kind: ToneType) {
            self.push(CivEvent::ToneReport { hz, kind });
        }
        fn tone_enable(&mut self, enabled: bool) {
            self.push(CivEvent::ToneEnable { enabled });
        }
        fn power_level(&mut self, level: u8) {
            self.push(CivEvent::PowerLevel { level });
        }
        fn parser_error(&mut self, offset: usize) {
            self.push(CivEvent::ParserError { offset });
        }
    }

    fn decoder() -> (DatagramDecoder, Recorder) {
        let mut decoder = DatagramDecoder::new();
        let recorder = Recorder::default();
        decoder.add_listener(Box::new(recorder.clone()));
        (decoder, recorder)
    }

    #[test]
    fn test_read_frequency_reply() {
        let (mut decoder, rec) = decoder();
        let raw = [
            0xFE, 0xFE, 0xE0, 0xA4, 0x03, 0x00, 0x00, 0x82, 0x46, 0x01, 0xFD,
        ];
        assert_eq!(decoder.parse(&raw), 1);
        assert_eq!(
            rec.events(),
            vec![CivEvent::FrequencyChanged {
                hz: 146_820_000,
                requested: true
            }]
        );
    }

    #[test]
    fn test_transceive_frequency_is_unrequested() {
        let (mut decoder, rec) = decoder();
        let raw = [
            0xFE, 0xFE, 0x00, 0xA4, 0x00, 0x00, 0x00, 0x17, 0x53, 0x00, 0xFD,
        ];
        decoder.parse(&raw);
        assert_eq!(
            rec.events(),
            vec![CivEvent::FrequencyChanged {
                hz: 53_170_000,
                requested: false
            }]
        );
    }

    #[test]
    fn test_bindings() {
        let (grammar, start) = civ_grammar();
        let line = "FE FE E0 A4 03 00 50 37 44 04 FD ";
        let m = grammar.match_at(start, line, 0).unwrap();
        assert_eq!(m.span.end, line.len());
        assert_eq!(m.bindings.text("dest", line), Some("E0"));
        assert_eq!(m.bindings.text("source", line), Some("A4"));
        assert_eq!(m.bindings.text("cmdid", line), Some("03"));
        let data = m.bindings.nested("data").unwrap();
        assert_eq!(data.text("100MHz", line), Some("4"));
        assert_eq!(data.text("1GHz", line), Some("0"));
        assert_eq!(data.text("10kHz", line), Some("7"));
        assert_eq!(data.text("100kHz", line), Some("3"));
        assert_eq!(data.text("100Hz", line), Some("0"));
        assert_eq!(data.text("1kHz", line), Some("5"));
        assert_eq!(
            decode(&m.bindings, line).unwrap(),
            Some(CivEvent::FrequencyChanged {
                hz: 444_375_000,
                requested: true
            })
        );
    }

    #[test]
    fn test_mode_with_filter() {
        let (mut decoder, rec) = decoder();
        decoder.parse(&[0xFE, 0xFE, 0x00, 0xA4, 0x01, 0x05, 0x01, 0xFD]);
        decoder.parse(&[0xFE, 0xFE, 0xE0, 0xA4, 0x04, 0x17, 0xFD]);
        assert_eq!(
            rec.events(),
            vec![
                CivEvent::ModeChanged {
                    mode: OperatingMode::Fm,
                    filter: Filter::from_code("01"),
                },
                CivEvent::ModeChanged {
                    mode: OperatingMode::Dv,
                    filter: Filter::from_code(""),
                },
            ]
        );
    }

    #[test]
    fn test_unknown_mode_skipped() {
        let (mut decoder, rec) = decoder();
        assert_eq!(decoder.parse(&[0xFE, 0xFE, 0x00, 0xA4, 0x01, 0x09, 0x01, 0xFD]), 0);
        assert!(rec.events().is_empty());
    }

    #[test]
    fn test_tone_report() {
        let (mut decoder, rec) = decoder();
        decoder.parse(&[0xFE, 0xFE, 0xE0, 0xA4, 0x1B, 0x00, 0x00, 0x10, 0x35, 0xFD]);
        decoder.parse(&[0xFE, 0xFE, 0xE0, 0xA4, 0x1B, 0x01, 0x00, 0x08, 0x85, 0xFD]);
        decoder.parse(&[0xFE, 0xFE, 0xE0, 0xA4, 0x1B, 0x00, 0x14, 0x13, 0xFD]);
        assert_eq!(
            rec.events(),
            vec![
                CivEvent::ToneReport {
                    hz: 103.5,
                    kind: ToneType::Tone
                },
                CivEvent::ToneReport {
                    hz: 88.5,
                    kind: ToneType::Tsql
                },
                CivEvent::ToneReport {
                    hz: 141.3,
                    kind: ToneType::Tone
                },
            ]
        );
    }

    #[test]
    fn test_tone_enable_and_power() {
        let (mut decoder, rec) = decoder();
        let raw = [
            0xFE, 0xFE, 0xE0, 0xA4, 0x16, 0x42, 0x01, 0xFD, //
            0xFE, 0xFE, 0xE0, 0xA4, 0x14, 0x0A, 0x01, 0x28, 0xFD,
        ];
        assert_eq!(decoder.parse(&raw), 2);
        assert_eq!(
            rec.events(),
            vec![
                CivEvent::ToneEnable { enabled: true },
                CivEvent::PowerLevel { level: 128 },
            ]
        );
    }

    #[test]
    fn test_power_level_out_of_range_skipped() {
        let (mut decoder, rec) = decoder();
        decoder.parse(&[0xFE, 0xFE, 0xE0, 0xA4, 0x14, 0x0A, 0x02, 0x56, 0xFD]);
        assert!(rec.events().is_empty());
    }

    #[test]
    fn test_non_decimal_digit_skipped() {
        let (mut decoder, rec) = decoder();
        let raw = [
            0xFE, 0xFE, 0xE0, 0xA4, 0x03, 0x0A, 0x00, 0x82, 0x46, 0x01, 0xFD, //
            0xFE, 0xFE, 0xE0, 0xA4, 0x16, 0x42, 0x00, 0xFD,
        ];
        assert_eq!(decoder.parse(&raw), 1);
        assert_eq!(rec.events(), vec![CivEvent::ToneEnable { enabled: false }]);
    }

    #[test]
    fn test_echoed_requests_ignored() {
        let (mut decoder, rec) = decoder();
        let raw = [
            0xFE, 0xFE, 0xA4, 0xE0, 0x03, 0xFD, //
            0xFE, 0xFE, 0xA4, 0xE0, 0x1B, 0x00, 0xFD, //
            0xFE, 0xFE, 0xA4, 0xE0, 0x05, 0x00, 0x00, 0x82, 0x46, 0x01, 0xFD, //
            0xFE, 0xFE, 0xE0, 0xA4, 0xFB, 0xFD,
        ];
        assert_eq!(decoder.parse(&raw), 0);
        assert!(rec.events().is_empty());
    }

    #[test]
    fn test_truncated_datagram() {
        let (mut decoder, rec) = decoder();
        assert_eq!(decoder.parse(&[0xFE, 0xFE, 0xA4]), 0);
        assert_eq!(rec.events(), vec![CivEvent::ParserError { offset: 0 }]);
    }

    #[test]
    fn test_truncated_then_complete_in_one_chunk() {
        let (mut decoder, rec) = decoder();
        let raw = [
            0xFE, 0xFE, 0xA4, // cut short
            0xFE, 0xFE, 0xE0, 0xA4, 0x03, 0x00, 0x00, 0x82, 0x46, 0x01, 0xFD,
        ];
        assert_eq!(decoder.parse(&raw), 1);
        assert_eq!(
            rec.events(),
            vec![
                CivEvent::ParserError { offset: 0 },
                CivEvent::FrequencyChanged {
                    hz: 146_820_000,
                    requested: true
                },
            ]
        );
    }

    #[test]
    fn test_truncated_frequency_then_broadcast() {
        let (mut decoder, rec) = decoder();
        let raw = [
            0xFE, 0xFE, 0xE0, 0xA4, 0x03, 0x00, 0x00, // cut inside the data
            0xFE, 0xFE, 0x00, 0xA4, 0x00, 0x00, 0x00, 0x17, 0x53, 0x00, 0xFD,
        ];
        assert_eq!(decoder.parse(&raw), 1);
        assert_eq!(
            rec.events(),
            vec![
                CivEvent::ParserError { offset: 0 },
                CivEvent::FrequencyChanged {
                    hz: 53_170_000,
                    requested: false
                },
            ]
        );
    }

    #[test]
    fn test_resync_after_garbage() {
        let (mut decoder, rec) = decoder();
        let raw = [
            0x12, 0x34, 0xFE, 0x56, // noise
            0xFE, 0xFE, 0xE0, 0xA4, 0x16, 0x42, 0x01, 0xFD,
        ];
        assert_eq!(decoder.parse(&raw), 1);
        assert_eq!(
            rec.events(),
            vec![
                CivEvent::ParserError { offset: 0 },
                CivEvent::ToneEnable { enabled: true },
            ]
        );
    }

    #[test]
    fn test_long_preamble() {
        let (mut decoder, rec) = decoder();
        decoder.parse(&[0xFE, 0xFE, 0xFE, 0xE0, 0xA4, 0x16, 0x42, 0x00, 0xFD]);
        assert_eq!(rec.events(), vec![CivEvent::ToneEnable { enabled: false }]);
    }

    #[test]
    fn test_remove_listener() {
        let mut decoder = DatagramDecoder::new();
        let first = Recorder::default();
        let second = Recorder::default();
        let id = decoder.add_listener(Box::new(first.clone()));
        decoder.add_listener(Box::new(second.clone()));
        assert!(decoder.remove_listener(id).is_some());
        assert!(decoder.remove_listener(id).is_none());

        decoder.parse(&[0xFE, 0xFE, 0xE0, 0xA4, 0x16, 0x42, 0x01, 0xFD]);
        assert!(first.events().is_empty());
        assert_eq!(second.events().len(), 1);
    }
}
