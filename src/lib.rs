//! A library for reading FIT activity files and writing FIT workout,
//! sport, and settings files.
//!
//! The read path validates a FIT container, decodes its self-describing
//! message stream, and assembles the flat record sequence into an
//! [`Activity`] hierarchy of sessions, laps, lengths, and trackpoint
//! records, including third-party ("developer") fields keyed by stable
//! identifiers. See [`read_activity`] for the main entry point.
//!
//! The write path builds the inverse: a definition-then-data message
//! stream with header and trailing CRC, specialised for workout, sport
//! zone, and settings payloads in [`files`], or driven directly through
//! [`writer::Encoder`] for generic output.
//!
//! # Feature flags
//!
//! - `cli` enables the additional dependencies needed by the CLI

pub mod activity;
pub mod codec;
pub mod decoder;
pub mod dispatch;
pub mod files;
pub mod profile;
pub mod stream;
pub mod types;
pub mod writer;
pub mod xdata;

use std::path::Path;

use thiserror::Error;
use tracing::instrument;

pub use activity::{
    Activity, ActivityBuilder, ActivityError, Lap, Length, NoSummary, Session, Summarizer,
};
pub use decoder::{DecodeError, FieldKey, Message, RecordDecoder};
pub use dispatch::Dispatcher;
pub use profile::{MessageKind, Sport};
pub use stream::{FitStream, StreamError};
pub use types::Value;
pub use writer::{EncodeError, FileOptions};

#[derive(Error, Debug)]
pub enum FitError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("FIT stream error")]
    Stream(#[from] StreamError),
    #[error("FIT decode error")]
    Decode(#[from] DecodeError),
    #[error("activity assembly error")]
    Activity(#[from] ActivityError),
    #[error("FIT encode error")]
    Encode(#[from] EncodeError),
}

pub type Result<T> = std::result::Result<T, FitError>;

/// Decode a FIT ACTIVITY file held in memory.
///
/// Runs the whole read pipeline: container validation, record decoding,
/// clock normalisation, and activity assembly.
#[instrument(name = "read_activity", level = "debug", skip_all)]
pub fn read_activity(data: Vec<u8>) -> Result<Activity> {
    let mut stream = FitStream::from_bytes(data)?;
    let mut decoder = RecordDecoder::new();
    let mut builder = ActivityBuilder::new();
    while !stream.is_eof() {
        if let Some(message) = decoder.next_message(&mut stream)? {
            builder.dispatch(message)?;
        }
    }
    Ok(builder.collect_activity())
}

/// Decode a FIT ACTIVITY file from disk.
pub fn read_activity_file<P: AsRef<Path>>(path: P) -> Result<Activity> {
    read_activity(std::fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::{WorkoutFile, WorkoutStep};
    use crate::types::Value;
    use crate::writer::{Encoder, WriteField};

    /// Drive a written workout file back through the decoder, exercising
    /// both directions of the codec.
    #[test]
    fn test_workout_file_reads_back() -> anyhow::Result<()> {
        let mut workout = WorkoutFile::new("Test", Sport::Running, &FileOptions::default())?;
        workout.add_step(WorkoutStep {
            duration_type: 0,
            duration_value: Some(300_000),
            target_type: 1,
            target_value: Some(2),
            ..WorkoutStep::default()
        });
        let buf = workout.finalise()?;

        let mut stream = FitStream::from_bytes(buf)?;
        let mut decoder = RecordDecoder::new();
        let mut kinds = Vec::new();
        while !stream.is_eof() {
            if let Some(message) = decoder.next_message(&mut stream)? {
                kinds.push(message.kind);
            }
        }
        assert_eq!(
            kinds,
            vec![
                MessageKind::FileId,
                MessageKind::FileCreator,
                MessageKind::Workout,
                MessageKind::WorkoutStep,
            ]
        );
        Ok(())
    }

    /// An encoder-written activity file assembles into a full hierarchy.
    #[test]
    fn test_written_activity_assembles() -> anyhow::Result<()> {
        let mut encoder = Encoder::new();
        encoder.put_definition(
            0,
            0,
            vec![
                WriteField::new("type", 0, &types::ENUM),
                WriteField::new("serial_number", 3, &types::UINT32Z),
                WriteField::new("time_created", 4, &types::UINT32),
            ],
        )?;
        encoder.put_message(
            0,
            &[
                ("type", Value::UInt(4)),
                ("serial_number", Value::UInt(42)),
                ("time_created", Value::UInt(900_000_000)),
            ],
        )?;
        encoder.put_definition(
            20,
            1,
            vec![
                WriteField::new("timestamp", 253, &types::UINT32),
                WriteField::new("heart_rate", 3, &types::UINT8),
            ],
        )?;
        for (ts, bpm) in [(900_000_010u64, 90u64), (900_000_011, 93), (900_000_012, 95)] {
            encoder.put_message(
                20,
                &[
                    ("timestamp", Value::UInt(ts)),
                    ("heart_rate", Value::UInt(bpm)),
                ],
            )?;
        }
        encoder.put_definition(
            19,
            2,
            vec![
                WriteField::new("timestamp", 253, &types::UINT32),
                WriteField::new("start_time", 2, &types::UINT32),
            ],
        )?;
        encoder.put_message(
            19,
            &[
                ("timestamp", Value::UInt(900_000_012)),
                ("start_time", Value::UInt(900_000_010)),
            ],
        )?;
        encoder.put_definition(
            18,
            3,
            vec![
                WriteField::new("timestamp", 253, &types::UINT32),
                WriteField::new("start_time", 2, &types::UINT32),
                WriteField::new("sport", 5, &types::ENUM),
            ],
        )?;
        encoder.put_message(
            18,
            &[
                ("timestamp", Value::UInt(900_000_013)),
                ("start_time", Value::UInt(900_000_010)),
                ("sport", Value::UInt(2)),
            ],
        )?;
        let buf = encoder.finalise()?;

        let activity = read_activity(buf)?;
        assert_eq!(activity.guid.as_deref(), Some("42-900000000"));
        assert_eq!(activity.sessions.len(), 1);
        let session = &activity.sessions[0];
        assert_eq!(session.summary.get("sport"), Some(&Value::UInt(2)));
        assert_eq!(session.laps.len(), 1);
        let lap = &session.laps[0];
        assert_eq!(lap.lengths.len(), 1);
        assert_eq!(lap.lengths[0].records.len(), 3);
        Ok(())
    }

    #[test]
    fn test_non_activity_file_is_rejected() -> anyhow::Result<()> {
        let workout = WorkoutFile::new("Test", Sport::Running, &FileOptions::default())?;
        let buf = workout.finalise()?;
        assert!(matches!(
            read_activity(buf),
            Err(FitError::Activity(ActivityError::NotAnActivity(Some(5))))
        ));
        Ok(())
    }
}
