//! Routing of decoded messages to per-kind handlers.
//!
//! Every message passes through a common pre-step that keeps a monotone
//! clock, substitutes absent timestamps, and expands compressed timestamp
//! offsets, before being routed to the handler for its kind.

use crate::decoder::{FieldKey, Message};
use crate::profile::MessageKind;
use crate::types::Value;

/// Timestamp value devices emit for "no time recorded": the FIT epoch
/// itself.
pub const EPOCH_MARKER: u64 = 0;

/// Monotone stream clock.
///
/// `current` never moves backwards within a stream; `start` is pinned to
/// the first valid timestamp seen.
#[derive(Debug, Default, Clone, Copy)]
pub struct Clock {
    start: Option<u64>,
    current: Option<u64>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) -> Option<u64> {
        self.start
    }

    pub fn current(&self) -> Option<u64> {
        self.current
    }

    /// The common pre-step applied to every message before routing.
    pub fn touch(&mut self, message: &mut Message) {
        match message.timestamp() {
            // An epoch-marker timestamp means the device recorded no time;
            // substitute the running clock when we have one.
            Some(EPOCH_MARKER) => {
                message.remove("timestamp");
                if let Some(current) = self.current {
                    message.push(FieldKey::Sym("timestamp"), Value::UInt(current));
                }
            }
            Some(ts) => {
                self.current = Some(self.current.map_or(ts, |current| current.max(ts)));
                if self.start.is_none() {
                    self.start = Some(ts);
                }
            }
            None => {}
        }

        let start_time = message.get("start_time").and_then(Value::as_u64);
        if start_time.is_none() || start_time == Some(EPOCH_MARKER) {
            if let Some(current) = self.current {
                message.replace("start_time", Value::UInt(current));
            }
        }

        let offset = message
            .get("compressed_timestamp")
            .and_then(Value::as_u64);
        if let (Some(offset), Some(current)) = (offset, self.current) {
            message.replace("timestamp", Value::UInt(self.expand(offset, current)));
        }
    }

    /// Expand a 5-bit compressed timestamp offset against the clock.
    ///
    /// The offset replaces the low five bits of the current timestamp,
    /// rolling the next 32-second window over when it would move time
    /// backwards.
    fn expand(&mut self, offset: u64, current: u64) -> u64 {
        let offset = offset & 0x1F;
        let base = current & !0x1F;
        let full = if offset >= current % 32 {
            base + offset
        } else {
            base + offset + 32
        };
        self.current = Some(full.max(current));
        if self.start.is_none() {
            self.start = Some(full);
        }
        full
    }
}

/// Per-message-kind handlers with a shared clock pre-step.
///
/// Implementors override the hooks for the kinds they care about; the
/// rest fall through to no-ops. `dispatch` applies the clock pre-step and
/// routes.
pub trait Dispatcher {
    type Error;

    fn clock_mut(&mut self) -> &mut Clock;

    fn dispatch(&mut self, mut message: Message) -> Result<(), Self::Error> {
        self.clock_mut().touch(&mut message);
        match message.kind {
            MessageKind::FileId => self.on_file_id(message),
            MessageKind::FileCreator => self.on_file_creator(message),
            MessageKind::Activity => self.on_activity(message),
            MessageKind::Session => self.on_session(message),
            MessageKind::Record => self.on_record(message),
            MessageKind::Length => self.on_length(message),
            MessageKind::Lap => self.on_lap(message),
            MessageKind::DeviceInfo => self.on_device_info(message),
            MessageKind::Location => self.on_location(message),
            MessageKind::Workout => self.on_workout(message),
            MessageKind::WorkoutStep => self.on_workout_step(message),
            MessageKind::Sport => self.on_sport(message),
            MessageKind::Hrv => self.on_hrv(message),
            MessageKind::DeveloperDataId => self.on_developer_data_id(message),
            MessageKind::FieldDescription => self.on_field_description(message),
            MessageKind::TrainingFile => self.on_training_file(message),
            MessageKind::Event => self.on_event(message),
            MessageKind::Other(_) => self.on_other(message),
        }
    }

    fn on_file_id(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_file_creator(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_activity(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_session(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_record(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_length(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_lap(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_device_info(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_location(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_workout(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_workout_step(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_sport(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_hrv(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_developer_data_id(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_field_description(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_training_file(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_event(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_other(&mut self, _message: Message) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::FieldKey;

    fn message_with_timestamp(ts: u64) -> Message {
        let mut message = Message::new(MessageKind::Record);
        message.push(FieldKey::Sym("timestamp"), Value::UInt(ts));
        message
    }

    #[test]
    fn test_clock_is_monotone() {
        let mut clock = Clock::new();
        for ts in [100u64, 200, 150, 300] {
            let mut message = message_with_timestamp(ts);
            clock.touch(&mut message);
        }
        assert_eq!(clock.current(), Some(300));
        assert_eq!(clock.start(), Some(100));
    }

    #[test]
    fn test_epoch_marker_substituted() {
        let mut clock = Clock::new();
        let mut first = message_with_timestamp(500);
        clock.touch(&mut first);

        let mut second = message_with_timestamp(EPOCH_MARKER);
        clock.touch(&mut second);
        assert_eq!(second.get("timestamp"), Some(&Value::UInt(500)));
    }

    #[test]
    fn test_epoch_marker_without_clock_is_dropped() {
        let mut clock = Clock::new();
        let mut message = message_with_timestamp(EPOCH_MARKER);
        clock.touch(&mut message);
        assert!(!message.has("timestamp"));
    }

    #[test]
    fn test_start_time_filled_from_clock() {
        let mut clock = Clock::new();
        let mut message = message_with_timestamp(1000);
        clock.touch(&mut message);
        assert_eq!(message.get("start_time"), Some(&Value::UInt(1000)));

        // An epoch-marker start_time is treated as missing.
        let mut message = message_with_timestamp(1200);
        message.push(FieldKey::Sym("start_time"), Value::UInt(EPOCH_MARKER));
        clock.touch(&mut message);
        assert_eq!(message.get("start_time"), Some(&Value::UInt(1200)));
    }

    #[test]
    fn test_compressed_expansion_rolls_over() {
        // current = 1000 = 31 * 32 + 8
        let mut clock = Clock::new();
        let mut seed = message_with_timestamp(1000);
        clock.touch(&mut seed);

        // offset below current % 32 rolls into the next window
        let mut message = Message::new(MessageKind::Record);
        message.push(FieldKey::Sym("compressed_timestamp"), Value::UInt(3));
        clock.touch(&mut message);
        assert_eq!(message.get("timestamp"), Some(&Value::UInt(1027)));
        assert_eq!(clock.current(), Some(1027));
    }

    #[test]
    fn test_compressed_expansion_same_window() {
        let mut clock = Clock::new();
        let mut seed = message_with_timestamp(1000);
        clock.touch(&mut seed);

        let mut message = Message::new(MessageKind::Record);
        message.push(FieldKey::Sym("compressed_timestamp"), Value::UInt(20));
        clock.touch(&mut message);
        assert_eq!(message.get("timestamp"), Some(&Value::UInt(1012)));
    }
}
