//! Assembly of a structured activity from a flat message stream.
//!
//! Devices write sessions, laps, lengths, and trackpoint records in an
//! order and completeness that varies by vendor. The builder accumulates
//! records as they arrive and transfers ownership upwards when each
//! enclosing message appears: records and lengths into the lap, laps into
//! the session, sessions into the final activity.

use std::collections::VecDeque;

use thiserror::Error;
use tracing::{debug, warn};

use crate::decoder::{FieldKey, Message};
use crate::dispatch::{Clock, Dispatcher};
use crate::profile::MessageKind;
use crate::types::Value;

/// `file_id.type` value for an ACTIVITY file.
const FILE_TYPE_ACTIVITY: u64 = 4;

#[derive(Error, Debug)]
pub enum ActivityError {
    #[error("file_id declares file type {0:?}, not an activity")]
    NotAnActivity(Option<u64>),
}

type Result<T> = std::result::Result<T, ActivityError>;

/// The decoded activity: metadata plus the session hierarchy.
#[derive(Debug, Default)]
pub struct Activity {
    /// FIT-epoch seconds the activity started at.
    pub start_time: Option<u64>,
    /// Stable identifier derived from the device serial number and file
    /// creation time.
    pub guid: Option<String>,
    pub developer_data_ids: Vec<Message>,
    pub field_descriptions: Vec<Message>,
    pub training_files: Vec<Message>,
    pub sessions: Vec<Session>,
}

#[derive(Debug)]
pub struct Session {
    pub summary: Message,
    pub devices: Vec<Message>,
    pub laps: Vec<Lap>,
}

#[derive(Debug)]
pub struct Lap {
    pub summary: Message,
    pub lengths: Vec<Length>,
}

#[derive(Debug)]
pub struct Length {
    pub summary: Message,
    pub records: Vec<Message>,
}

/// Rolls sensor samples up into the summary fields of a synthesised lap
/// or session.
pub trait Summarizer {
    fn summarize(
        &self,
        records: &[Message],
        lengths: &[Length],
        laps: &[Lap],
        sessions: &[Session],
    ) -> Vec<(FieldKey, Value)>;
}

/// Summariser that contributes nothing.
#[derive(Debug, Default)]
pub struct NoSummary;

impl Summarizer for NoSummary {
    fn summarize(
        &self,
        _records: &[Message],
        _lengths: &[Length],
        _laps: &[Lap],
        _sessions: &[Session],
    ) -> Vec<(FieldKey, Value)> {
        Vec::new()
    }
}

/// Raw power-phase angles are eighths of a binary degree.
const POWER_PHASE_DEGREES: f64 = 360.0 / 256.0;

/// Power-phase vector extractions: target field, source vector, index.
const POWER_PHASE_RULES: &[(&str, &str, usize)] = &[
    ("left_pp_start", "left_power_phase", 0),
    ("left_pp_end", "left_power_phase", 1),
    ("left_ppp_start", "left_power_phase_peak", 0),
    ("left_ppp_end", "left_power_phase_peak", 1),
    ("right_pp_start", "right_power_phase", 0),
    ("right_pp_end", "right_power_phase", 1),
    ("right_ppp_start", "right_power_phase_peak", 0),
    ("right_ppp_end", "right_power_phase_peak", 1),
    ("avg_left_pp_start", "avg_left_power_phase", 0),
    ("avg_left_pp_end", "avg_left_power_phase", 1),
    ("avg_left_ppp_start", "avg_left_power_phase_peak", 0),
    ("avg_left_ppp_end", "avg_left_power_phase_peak", 1),
    ("avg_right_pp_start", "avg_right_power_phase", 0),
    ("avg_right_pp_end", "avg_right_power_phase", 1),
    ("avg_right_ppp_start", "avg_right_power_phase_peak", 0),
    ("avg_right_ppp_end", "avg_right_power_phase_peak", 1),
];

/// Fuse a whole-unit cadence field with its fractional counterpart.
fn fused_cadence(message: &Message, bases: &[&str], fraction: &str) -> Option<Value> {
    let base = bases.iter().find_map(|name| message.get(name))?;
    match (base.as_f64(), message.get(fraction).and_then(Value::as_f64)) {
        (Some(b), Some(f)) => Some(Value::Float(b + f)),
        _ => Some(base.clone()),
    }
}

/// Apply the derived-field rules to a summary or record message.
///
/// Derived pairs are computed against the incoming message, then
/// prepended so they win lookups; the fractional source fields they
/// consume are dropped.
pub fn process_fields(mut message: Message) -> Message {
    let mut derived: Vec<(FieldKey, Value)> = Vec::new();

    if let Some(start) = message
        .get("start_time")
        .or_else(|| message.get("timestamp"))
    {
        derived.push((FieldKey::Sym("start_time"), start.clone()));
    }

    if let Some(cadence) = fused_cadence(&message, &["cadence"], "fractional_cadence") {
        derived.push((FieldKey::Sym("cadence"), cadence));
    }
    if let Some(cadence) = fused_cadence(
        &message,
        &["avg_swimming_cadence", "avg_cadence"],
        "avg_fractional_cadence",
    ) {
        derived.push((FieldKey::Sym("avg_cadence"), cadence));
    }
    if let Some(cadence) = fused_cadence(&message, &["max_cadence"], "max_fractional_cadence") {
        derived.push((FieldKey::Sym("max_cadence"), cadence));
    }

    if let Some(cycles) = message
        .get("total_cycles")
        .or_else(|| message.get("total_strokes"))
    {
        derived.push((FieldKey::Sym("total_cycles"), cycles.clone()));
    }

    if let Some(balance) = message
        .get("left_right_balance")
        .or_else(|| message.get("stance_time_balance"))
    {
        derived.push((FieldKey::Sym("left_right_balance"), balance.clone()));
    }

    for &(target, source, index) in POWER_PHASE_RULES {
        let angle = message
            .get(source)
            .and_then(|v| v.element(index))
            .and_then(Value::as_f64);
        if let Some(angle) = angle {
            derived.push((FieldKey::Sym(target), Value::Float(angle * POWER_PHASE_DEGREES)));
        }
    }

    for fraction in [
        "fractional_cadence",
        "avg_fractional_cadence",
        "max_fractional_cadence",
    ] {
        message.remove(fraction);
    }
    message.prepend(derived);
    message
}

/// Streaming builder of the activity hierarchy.
///
/// Create one per file, feed every decoded message through
/// [`Dispatcher::dispatch`], then call [`ActivityBuilder::collect_activity`]
/// exactly once.
pub struct ActivityBuilder {
    clock: Clock,
    guid: Option<String>,
    activity_timestamp: Option<u64>,
    sessions: Vec<Session>,
    laps: Vec<Lap>,
    lengths: Vec<Length>,
    records: Vec<Message>,
    devices: Vec<Message>,
    sport: Option<Message>,
    training_files: Vec<Message>,
    developer_data_ids: Vec<Message>,
    field_descriptions: Vec<Message>,
    timer_stopped: bool,
    summarizer: Box<dyn Summarizer>,
}

impl Default for ActivityBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityBuilder {
    pub fn new() -> Self {
        Self {
            clock: Clock::new(),
            guid: None,
            activity_timestamp: None,
            sessions: Vec::new(),
            laps: Vec::new(),
            lengths: Vec::new(),
            records: Vec::new(),
            devices: Vec::new(),
            sport: None,
            training_files: Vec::new(),
            developer_data_ids: Vec::new(),
            field_descriptions: Vec::new(),
            timer_stopped: false,
            summarizer: Box::new(NoSummary),
        }
    }

    /// Use `summarizer` for the summary fields of synthesised laps and
    /// sessions.
    pub fn with_summarizer(mut self, summarizer: Box<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    /// Attach the accumulated lengths and records to a lap summary and
    /// file the lap.
    fn push_lap(&mut self, summary: Message) {
        let lengths = std::mem::take(&mut self.lengths);
        let records = std::mem::take(&mut self.records);
        let lap = attach_to_lap(summary, lengths, records);
        self.laps.push(lap);
    }

    /// Consume the builder and emit the assembled activity.
    pub fn collect_activity(mut self) -> Activity {
        // A single session written before any of its data carries its own
        // start as its timestamp; the stream clock knows better.
        if self.sessions.len() == 1 {
            let summary = &mut self.sessions[0].summary;
            let timestamp = summary.timestamp();
            let start_time = summary.get("start_time").and_then(Value::as_u64);
            if timestamp.is_some() && timestamp == start_time {
                if let Some(current) = self.clock.current() {
                    summary.replace("timestamp", Value::UInt(current));
                }
            }
        }

        if !self.records.is_empty() || !self.lengths.is_empty() {
            warn!(
                records = self.records.len(),
                lengths = self.lengths.len(),
                "data after the last lap; synthesising a terminal lap"
            );
            let summary_fields = self.summarizer.summarize(
                &self.records,
                &self.lengths,
                &self.laps,
                &self.sessions,
            );
            let mut summary = Message::new(MessageKind::Lap);
            if let Some(current) = self.clock.current() {
                summary.push(FieldKey::Sym("timestamp"), Value::UInt(current));
            }
            summary.prepend(summary_fields);
            self.push_lap(summary);
        }

        let mut sessions = std::mem::take(&mut self.sessions);
        sessions.sort_by_key(|session| session.summary.timestamp().unwrap_or(u64::MAX));

        // Laps arrived in stream order, which the clock keeps
        // chronological. Walk them into sessions by timestamp prefix.
        let mut remaining: VecDeque<Lap> = std::mem::take(&mut self.laps).into();
        for session in &mut sessions {
            let cutoff = session.summary.timestamp().unwrap_or(u64::MAX);
            while remaining
                .front()
                .is_some_and(|lap| lap.summary.timestamp().unwrap_or(0) <= cutoff)
            {
                session.laps.push(remaining.pop_front().expect("peeked"));
            }
        }

        if !remaining.is_empty() {
            warn!(
                laps = remaining.len(),
                "laps after the last session; synthesising one"
            );
            let laps: Vec<Lap> = remaining.into();
            let summary_fields = self.summarizer.summarize(&[], &[], &laps, &sessions);
            let mut summary = Message::new(MessageKind::Session);
            summary.push(FieldKey::Sym("sport"), Value::UInt(0)); // generic
            if let Some(current) = self.clock.current() {
                summary.push(FieldKey::Sym("timestamp"), Value::UInt(current));
            }
            summary.prepend(summary_fields);
            sessions.push(Session {
                summary,
                devices: Vec::new(),
                laps,
            });
        }

        if !self.devices.is_empty() {
            if let Some(last) = sessions.last_mut() {
                let mut devices = std::mem::take(&mut self.devices);
                devices.append(&mut last.devices);
                last.devices = devices;
            }
        }

        debug!(sessions = sessions.len(), "collected activity");
        Activity {
            start_time: self.activity_timestamp.or(self.clock.start()),
            guid: self.guid,
            developer_data_ids: self.developer_data_ids,
            field_descriptions: self.field_descriptions,
            training_files: self.training_files,
            sessions,
        }
    }
}

/// Attach lengths and records to a lap, tolerating the per-vendor
/// orderings seen in the wild.
fn attach_to_lap(summary: Message, mut lengths: Vec<Length>, mut records: Vec<Message>) -> Lap {
    if lengths.is_empty() && records.is_empty() {
        return Lap {
            summary,
            lengths: Vec::new(),
        };
    }

    if lengths.is_empty() {
        // No lengths at all: one synthetic length carries every record in
        // arrival order.
        let mut length_summary = Message::new(MessageKind::Length);
        for name in ["timestamp", "start_time"] {
            if let Some(value) = summary.get(name) {
                length_summary.push(FieldKey::Sym(name), value.clone());
            }
        }
        return Lap {
            summary,
            lengths: vec![Length {
                summary: length_summary,
                records,
            }],
        };
    }

    if lengths.len() == records.len() {
        // The Garmin Swim writes one record after each length with an
        // unreliable timestamp; pairing by position is the intended
        // mapping.
        for (length, record) in lengths.iter_mut().zip(records) {
            length.records.push(record);
        }
        return Lap { summary, lengths };
    }

    lengths.sort_by_key(|length| length.summary.timestamp().unwrap_or(0));
    records.sort_by_key(|record| record.timestamp().unwrap_or(0));
    let mut pending = records.into_iter().peekable();
    for length in &mut lengths {
        let cutoff = length.summary.timestamp().unwrap_or(u64::MAX);
        while pending
            .peek()
            .is_some_and(|record| record.timestamp().unwrap_or(0) <= cutoff)
        {
            length.records.push(pending.next().expect("peeked"));
        }
    }
    let dropped = pending.count();
    if dropped > 0 {
        warn!(dropped, "records after the last length were dropped");
    }
    Lap { summary, lengths }
}

impl Dispatcher for ActivityBuilder {
    type Error = ActivityError;

    fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    fn on_file_id(&mut self, message: Message) -> Result<()> {
        let file_type = message.get("type").and_then(Value::as_u64);
        if file_type != Some(FILE_TYPE_ACTIVITY) {
            return Err(ActivityError::NotAnActivity(file_type));
        }
        if self.guid.is_none() {
            let serial = message.get("serial_number").and_then(Value::as_u64);
            let created = message.get("time_created").and_then(Value::as_u64);
            if let (Some(serial), Some(created)) = (serial, created) {
                self.guid = Some(format!("{serial}-{created}"));
            }
        }
        Ok(())
    }

    fn on_activity(&mut self, message: Message) -> Result<()> {
        self.activity_timestamp = message.timestamp();
        Ok(())
    }

    fn on_session(&mut self, message: Message) -> Result<()> {
        let mut summary = process_fields(message);
        if let Some(sport) = self.sport.take() {
            // The dedicated sport message is authoritative over whatever
            // the session carries.
            let mut merged = Vec::new();
            for name in ["sport", "sub_sport", "pool_length", "pool_length_unit"] {
                if let Some(value) = sport.get(name) {
                    merged.push((FieldKey::Sym(name), value.clone()));
                }
            }
            summary.prepend(merged);
        }
        self.sessions.push(Session {
            summary,
            devices: std::mem::take(&mut self.devices),
            laps: Vec::new(),
        });
        Ok(())
    }

    fn on_record(&mut self, message: Message) -> Result<()> {
        let message = process_fields(message);
        // Some devices split one sample across several records with the
        // same timestamp; fold them back together.
        if let (Some(last), Some(ts)) = (self.records.last_mut(), message.timestamp()) {
            if last.timestamp() == Some(ts) {
                last.merge(message);
                return Ok(());
            }
        }
        self.records.push(message);
        Ok(())
    }

    fn on_length(&mut self, message: Message) -> Result<()> {
        let length_type = message.get("length_type").cloned();
        let mut summary = process_fields(message);
        if let Some(length_type) = length_type {
            if !summary.has("length_type") {
                summary.push(FieldKey::Sym("length_type"), length_type);
            }
        }
        self.lengths.push(Length {
            summary,
            records: Vec::new(),
        });
        Ok(())
    }

    fn on_lap(&mut self, message: Message) -> Result<()> {
        let summary = process_fields(message);
        self.push_lap(summary);
        Ok(())
    }

    fn on_device_info(&mut self, message: Message) -> Result<()> {
        self.devices.push(message);
        Ok(())
    }

    fn on_sport(&mut self, message: Message) -> Result<()> {
        self.sport = Some(message);
        Ok(())
    }

    fn on_event(&mut self, message: Message) -> Result<()> {
        let event = message.get("event").and_then(Value::as_u64);
        let event_type = message.get("event_type").and_then(Value::as_u64);
        match (event, event_type) {
            // timer stop_all, then the matching restart
            (Some(0), Some(4)) => self.timer_stopped = true,
            (Some(0), Some(0)) if self.timer_stopped => self.timer_stopped = false,
            _ => {}
        }
        Ok(())
    }

    fn on_developer_data_id(&mut self, message: Message) -> Result<()> {
        self.developer_data_ids.push(message);
        Ok(())
    }

    fn on_field_description(&mut self, message: Message) -> Result<()> {
        self.field_descriptions.push(message);
        Ok(())
    }

    fn on_training_file(&mut self, message: Message) -> Result<()> {
        self.training_files.push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(kind: MessageKind, fields: &[(&'static str, Value)]) -> Message {
        let mut message = Message::new(kind);
        for (name, value) in fields {
            message.push(FieldKey::Sym(*name), value.clone());
        }
        message
    }

    fn record_at(ts: u64) -> Message {
        message(MessageKind::Record, &[("timestamp", Value::UInt(ts))])
    }

    #[test]
    fn test_cadence_fusion() {
        let input = message(
            MessageKind::Record,
            &[
                ("timestamp", Value::UInt(100)),
                ("cadence", Value::UInt(85)),
                ("fractional_cadence", Value::Float(0.5)),
            ],
        );
        let output = process_fields(input);
        assert_eq!(output.get("cadence"), Some(&Value::Float(85.5)));
        assert!(!output.has("fractional_cadence"));
    }

    #[test]
    fn test_cadence_without_fraction_is_kept() {
        let input = message(MessageKind::Record, &[("cadence", Value::UInt(85))]);
        let output = process_fields(input);
        assert_eq!(output.get("cadence"), Some(&Value::UInt(85)));
    }

    #[test]
    fn test_swimming_cadence_preferred() {
        let input = message(
            MessageKind::Session,
            &[
                ("avg_cadence", Value::UInt(60)),
                ("avg_swimming_cadence", Value::UInt(28)),
            ],
        );
        let output = process_fields(input);
        assert_eq!(output.get("avg_cadence"), Some(&Value::UInt(28)));
    }

    #[test]
    fn test_total_cycles_falls_back_to_strokes() {
        let input = message(
            MessageKind::Length,
            &[("total_strokes", Value::UInt(18))],
        );
        let output = process_fields(input);
        assert_eq!(output.get("total_cycles"), Some(&Value::UInt(18)));
    }

    #[test]
    fn test_power_phase_extraction() {
        let input = message(
            MessageKind::Record,
            &[(
                "left_power_phase",
                Value::Array(vec![Some(Value::UInt(128)), Some(Value::UInt(192))]),
            )],
        );
        let output = process_fields(input);
        assert_eq!(output.get("left_pp_start"), Some(&Value::Float(180.0)));
        assert_eq!(output.get("left_pp_end"), Some(&Value::Float(270.0)));
    }

    #[test]
    fn test_start_time_derived_from_timestamp() {
        let input = message(MessageKind::Lap, &[("timestamp", Value::UInt(900))]);
        let output = process_fields(input);
        assert_eq!(output.get("start_time"), Some(&Value::UInt(900)));
    }

    fn file_id() -> Message {
        message(
            MessageKind::FileId,
            &[
                ("type", Value::UInt(4)),
                ("serial_number", Value::UInt(12345)),
                ("time_created", Value::UInt(1000)),
            ],
        )
    }

    #[test]
    fn test_rejects_non_activity_files() {
        let mut builder = ActivityBuilder::new();
        let workout = message(MessageKind::FileId, &[("type", Value::UInt(5))]);
        assert!(matches!(
            builder.dispatch(workout),
            Err(ActivityError::NotAnActivity(Some(5)))
        ));
    }

    #[test]
    fn test_guid_from_file_id() {
        let mut builder = ActivityBuilder::new();
        builder.dispatch(file_id()).unwrap();
        let activity = builder.collect_activity();
        assert_eq!(activity.guid.as_deref(), Some("12345-1000"));
    }

    #[test]
    fn test_records_merge_on_equal_timestamp() {
        let mut builder = ActivityBuilder::new();
        builder.dispatch(file_id()).unwrap();
        builder.dispatch(record_at(100)).unwrap();
        builder
            .dispatch(message(
                MessageKind::Record,
                &[
                    ("timestamp", Value::UInt(100)),
                    ("power", Value::UInt(220)),
                ],
            ))
            .unwrap();
        builder.dispatch(record_at(101)).unwrap();
        assert_eq!(builder.records.len(), 2);
        assert_eq!(builder.records[0].get("power"), Some(&Value::UInt(220)));
    }

    #[test]
    fn test_lap_without_lengths_gets_synthetic_length() {
        let mut builder = ActivityBuilder::new();
        builder.dispatch(file_id()).unwrap();
        for ts in [100, 101, 102] {
            builder.dispatch(record_at(ts)).unwrap();
        }
        builder
            .dispatch(message(MessageKind::Lap, &[("timestamp", Value::UInt(102))]))
            .unwrap();
        assert_eq!(builder.laps.len(), 1);
        let lap = &builder.laps[0];
        assert_eq!(lap.lengths.len(), 1);
        assert_eq!(lap.lengths[0].records.len(), 3);
        assert_eq!(lap.lengths[0].records[0].timestamp(), Some(100));
    }

    #[test]
    fn test_garmin_swim_positional_pairing() {
        let mut builder = ActivityBuilder::new();
        builder.dispatch(file_id()).unwrap();
        // The Garmin Swim convention: one record per length, record
        // timestamps unreliable (all far past the lengths).
        for ts in [100u64, 110, 120] {
            builder
                .dispatch(message(
                    MessageKind::Length,
                    &[("timestamp", Value::UInt(ts))],
                ))
                .unwrap();
        }
        for (ts, power) in [(999u64, 1u64), (1000, 2), (1001, 3)] {
            builder
                .dispatch(message(
                    MessageKind::Record,
                    &[
                        ("timestamp", Value::UInt(ts)),
                        ("power", Value::UInt(power)),
                    ],
                ))
                .unwrap();
        }
        builder
            .dispatch(message(MessageKind::Lap, &[("timestamp", Value::UInt(999))]))
            .unwrap();
        let lap = &builder.laps[0];
        assert_eq!(lap.lengths.len(), 3);
        for (i, length) in lap.lengths.iter().enumerate() {
            assert_eq!(length.records.len(), 1);
            assert_eq!(
                length.records[0].get("power"),
                Some(&Value::UInt(i as u64 + 1))
            );
        }
    }

    #[test]
    fn test_timestamp_pairing_drops_trailing_records() {
        let mut builder = ActivityBuilder::new();
        builder.dispatch(file_id()).unwrap();
        for ts in [100u64, 105, 110, 115, 200] {
            builder.dispatch(record_at(ts)).unwrap();
        }
        for ts in [110u64, 120] {
            builder
                .dispatch(message(
                    MessageKind::Length,
                    &[("timestamp", Value::UInt(ts))],
                ))
                .unwrap();
        }
        builder
            .dispatch(message(MessageKind::Lap, &[("timestamp", Value::UInt(200))]))
            .unwrap();
        let lap = &builder.laps[0];
        assert_eq!(lap.lengths.len(), 2);
        // records at 100/105/110 fall within the first length, 115 within
        // the second, and 200 lies past the last length.
        assert_eq!(lap.lengths[0].records.len(), 3);
        assert_eq!(lap.lengths[1].records.len(), 1);
    }

    #[test]
    fn test_sport_message_overrides_session_fields() {
        let mut builder = ActivityBuilder::new();
        builder.dispatch(file_id()).unwrap();
        builder
            .dispatch(message(
                MessageKind::Sport,
                &[("sport", Value::UInt(5)), ("sub_sport", Value::UInt(17))],
            ))
            .unwrap();
        builder
            .dispatch(message(
                MessageKind::Session,
                &[
                    ("timestamp", Value::UInt(500)),
                    ("sport", Value::UInt(0)),
                ],
            ))
            .unwrap();
        let session = &builder.sessions[0];
        assert_eq!(session.summary.get("sport"), Some(&Value::UInt(5)));
        assert_eq!(session.summary.get("sub_sport"), Some(&Value::UInt(17)));
        assert!(builder.sport.is_none());
    }

    #[test]
    fn test_hierarchy_closure_with_synthetic_lap_and_session() {
        let mut builder = ActivityBuilder::new();
        builder.dispatch(file_id()).unwrap();
        for ts in [100, 101] {
            builder.dispatch(record_at(ts)).unwrap();
        }
        // Stream ends without lap or session messages.
        let activity = builder.collect_activity();
        assert_eq!(activity.sessions.len(), 1);
        let session = &activity.sessions[0];
        assert_eq!(session.summary.get("sport"), Some(&Value::UInt(0)));
        assert_eq!(session.laps.len(), 1);
        assert_eq!(session.laps[0].lengths.len(), 1);
        assert_eq!(session.laps[0].lengths[0].records.len(), 2);
    }

    #[test]
    fn test_laps_assigned_to_sessions_by_timestamp() {
        let mut builder = ActivityBuilder::new();
        builder.dispatch(file_id()).unwrap();
        builder.dispatch(record_at(100)).unwrap();
        builder
            .dispatch(message(MessageKind::Lap, &[("timestamp", Value::UInt(150))]))
            .unwrap();
        builder
            .dispatch(message(
                MessageKind::Session,
                &[
                    ("timestamp", Value::UInt(160)),
                    ("start_time", Value::UInt(90)),
                ],
            ))
            .unwrap();
        builder.dispatch(record_at(200)).unwrap();
        builder
            .dispatch(message(MessageKind::Lap, &[("timestamp", Value::UInt(250))]))
            .unwrap();
        builder
            .dispatch(message(
                MessageKind::Session,
                &[
                    ("timestamp", Value::UInt(260)),
                    ("start_time", Value::UInt(155)),
                ],
            ))
            .unwrap();
        let activity = builder.collect_activity();
        assert_eq!(activity.sessions.len(), 2);
        assert_eq!(activity.sessions[0].laps.len(), 1);
        assert_eq!(activity.sessions[1].laps.len(), 1);
        assert_eq!(
            activity.sessions[0].laps[0].summary.timestamp(),
            Some(150)
        );
    }

    #[test]
    fn test_leftover_devices_attach_to_last_session() {
        let mut builder = ActivityBuilder::new();
        builder.dispatch(file_id()).unwrap();
        builder
            .dispatch(message(
                MessageKind::Session,
                &[("timestamp", Value::UInt(100))],
            ))
            .unwrap();
        builder
            .dispatch(message(
                MessageKind::DeviceInfo,
                &[("manufacturer", Value::UInt(1))],
            ))
            .unwrap();
        let activity = builder.collect_activity();
        assert_eq!(activity.sessions[0].devices.len(), 1);
    }

    #[test]
    fn test_single_session_timestamp_rewritten() {
        let mut builder = ActivityBuilder::new();
        builder.dispatch(file_id()).unwrap();
        // Session header precedes all data: timestamp == start_time.
        builder
            .dispatch(message(
                MessageKind::Session,
                &[
                    ("timestamp", Value::UInt(100)),
                    ("start_time", Value::UInt(100)),
                ],
            ))
            .unwrap();
        builder.dispatch(record_at(500)).unwrap();
        let activity = builder.collect_activity();
        assert_eq!(activity.sessions[0].summary.timestamp(), Some(500));
    }

    #[test]
    fn test_activity_start_time_prefers_activity_message() {
        let mut builder = ActivityBuilder::new();
        builder.dispatch(file_id()).unwrap();
        builder.dispatch(record_at(100)).unwrap();
        builder
            .dispatch(message(
                MessageKind::Activity,
                &[("timestamp", Value::UInt(700))],
            ))
            .unwrap();
        let activity = builder.collect_activity();
        assert_eq!(activity.start_time, Some(700));
    }
}
