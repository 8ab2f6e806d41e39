//! Static profile tables: message kinds, field names, and unit conversions.
//!
//! These tables are configuration data distilled from the Garmin FIT
//! global profile. Only the messages and fields the activity builder and
//! the file writers consume are tabulated; anything else is carried
//! through numerically.

use strum::EnumString;

use crate::types::Value;

/// The kind of a FIT message, from its global message number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    FileId,
    FileCreator,
    Activity,
    Session,
    Record,
    Length,
    Lap,
    DeviceInfo,
    Location,
    Workout,
    WorkoutStep,
    Sport,
    Hrv,
    DeveloperDataId,
    FieldDescription,
    TrainingFile,
    Event,
    Other(u16),
}

impl MessageKind {
    pub fn from_global(global: u16) -> MessageKind {
        match global {
            0 => MessageKind::FileId,
            12 => MessageKind::Sport,
            18 => MessageKind::Session,
            19 => MessageKind::Lap,
            20 => MessageKind::Record,
            21 => MessageKind::Event,
            23 => MessageKind::DeviceInfo,
            26 => MessageKind::Workout,
            27 => MessageKind::WorkoutStep,
            29 => MessageKind::Location,
            34 => MessageKind::Activity,
            49 => MessageKind::FileCreator,
            72 => MessageKind::TrainingFile,
            78 => MessageKind::Hrv,
            101 => MessageKind::Length,
            206 => MessageKind::FieldDescription,
            207 => MessageKind::DeveloperDataId,
            other => MessageKind::Other(other),
        }
    }

    pub fn global(&self) -> u16 {
        match self {
            MessageKind::FileId => 0,
            MessageKind::Sport => 12,
            MessageKind::Session => 18,
            MessageKind::Lap => 19,
            MessageKind::Record => 20,
            MessageKind::Event => 21,
            MessageKind::DeviceInfo => 23,
            MessageKind::Workout => 26,
            MessageKind::WorkoutStep => 27,
            MessageKind::Location => 29,
            MessageKind::Activity => 34,
            MessageKind::FileCreator => 49,
            MessageKind::TrainingFile => 72,
            MessageKind::Hrv => 78,
            MessageKind::Length => 101,
            MessageKind::FieldDescription => 206,
            MessageKind::DeveloperDataId => 207,
            MessageKind::Other(global) => *global,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::FileId => write!(f, "file_id"),
            MessageKind::FileCreator => write!(f, "file_creator"),
            MessageKind::Activity => write!(f, "activity"),
            MessageKind::Session => write!(f, "session"),
            MessageKind::Record => write!(f, "record"),
            MessageKind::Length => write!(f, "length"),
            MessageKind::Lap => write!(f, "lap"),
            MessageKind::DeviceInfo => write!(f, "device_info"),
            MessageKind::Location => write!(f, "location"),
            MessageKind::Workout => write!(f, "workout"),
            MessageKind::WorkoutStep => write!(f, "workout_step"),
            MessageKind::Sport => write!(f, "sport"),
            MessageKind::Hrv => write!(f, "hrv"),
            MessageKind::DeveloperDataId => write!(f, "developer_data_id"),
            MessageKind::FieldDescription => write!(f, "field_description"),
            MessageKind::TrainingFile => write!(f, "training_file"),
            MessageKind::Event => write!(f, "event"),
            MessageKind::Other(global) => write!(f, "message_{global}"),
        }
    }
}

/// Symbolic name for a field number within a message, when the profile
/// knows it.
pub fn field_name(kind: MessageKind, number: u8) -> Option<&'static str> {
    let name = match (kind, number) {
        (_, 253) => "timestamp",
        (_, 254) => "message_index",

        (MessageKind::FileId, 0) => "type",
        (MessageKind::FileId, 1) => "manufacturer",
        (MessageKind::FileId, 2) => "product",
        (MessageKind::FileId, 3) => "serial_number",
        (MessageKind::FileId, 4) => "time_created",
        (MessageKind::FileId, 5) => "number",
        (MessageKind::FileId, 8) => "product_name",

        (MessageKind::FileCreator, 0) => "software_version",
        (MessageKind::FileCreator, 1) => "hardware_version",

        (MessageKind::Activity, 0) => "total_timer_time",
        (MessageKind::Activity, 1) => "num_sessions",
        (MessageKind::Activity, 2) => "type",
        (MessageKind::Activity, 3) => "event",
        (MessageKind::Activity, 4) => "event_type",
        (MessageKind::Activity, 5) => "local_timestamp",

        (MessageKind::Session, 0) => "event",
        (MessageKind::Session, 1) => "event_type",
        (MessageKind::Session, 2) => "start_time",
        (MessageKind::Session, 3) => "start_position_lat",
        (MessageKind::Session, 4) => "start_position_long",
        (MessageKind::Session, 5) => "sport",
        (MessageKind::Session, 6) => "sub_sport",
        (MessageKind::Session, 7) => "total_elapsed_time",
        (MessageKind::Session, 8) => "total_timer_time",
        (MessageKind::Session, 9) => "total_distance",
        (MessageKind::Session, 10) => "total_cycles",
        (MessageKind::Session, 11) => "total_calories",
        (MessageKind::Session, 14) => "avg_speed",
        (MessageKind::Session, 15) => "max_speed",
        (MessageKind::Session, 16) => "avg_heart_rate",
        (MessageKind::Session, 17) => "max_heart_rate",
        (MessageKind::Session, 18) => "avg_cadence",
        (MessageKind::Session, 19) => "max_cadence",
        (MessageKind::Session, 20) => "avg_power",
        (MessageKind::Session, 21) => "max_power",
        (MessageKind::Session, 22) => "total_ascent",
        (MessageKind::Session, 23) => "total_descent",
        (MessageKind::Session, 25) => "first_lap_index",
        (MessageKind::Session, 26) => "num_laps",
        (MessageKind::Session, 41) => "avg_stroke_count",
        (MessageKind::Session, 42) => "avg_stroke_distance",
        (MessageKind::Session, 43) => "swim_stroke",
        (MessageKind::Session, 44) => "pool_length",
        (MessageKind::Session, 46) => "pool_length_unit",
        (MessageKind::Session, 79) => "avg_swimming_cadence",
        (MessageKind::Session, 92) => "avg_fractional_cadence",
        (MessageKind::Session, 93) => "max_fractional_cadence",
        (MessageKind::Session, 116) => "avg_left_power_phase",
        (MessageKind::Session, 117) => "avg_left_power_phase_peak",
        (MessageKind::Session, 118) => "avg_right_power_phase",
        (MessageKind::Session, 119) => "avg_right_power_phase_peak",

        (MessageKind::Lap, 0) => "event",
        (MessageKind::Lap, 1) => "event_type",
        (MessageKind::Lap, 2) => "start_time",
        (MessageKind::Lap, 3) => "start_position_lat",
        (MessageKind::Lap, 4) => "start_position_long",
        (MessageKind::Lap, 5) => "end_position_lat",
        (MessageKind::Lap, 6) => "end_position_long",
        (MessageKind::Lap, 7) => "total_elapsed_time",
        (MessageKind::Lap, 8) => "total_timer_time",
        (MessageKind::Lap, 9) => "total_distance",
        (MessageKind::Lap, 10) => "total_cycles",
        (MessageKind::Lap, 11) => "total_calories",
        (MessageKind::Lap, 13) => "avg_speed",
        (MessageKind::Lap, 14) => "max_speed",
        (MessageKind::Lap, 15) => "avg_heart_rate",
        (MessageKind::Lap, 16) => "max_heart_rate",
        (MessageKind::Lap, 17) => "avg_cadence",
        (MessageKind::Lap, 18) => "max_cadence",
        (MessageKind::Lap, 19) => "avg_power",
        (MessageKind::Lap, 20) => "max_power",
        (MessageKind::Lap, 21) => "total_ascent",
        (MessageKind::Lap, 22) => "total_descent",
        (MessageKind::Lap, 23) => "intensity",
        (MessageKind::Lap, 24) => "lap_trigger",
        (MessageKind::Lap, 25) => "sport",
        (MessageKind::Lap, 32) => "num_lengths",
        (MessageKind::Lap, 35) => "first_length_index",
        (MessageKind::Lap, 37) => "avg_stroke_distance",
        (MessageKind::Lap, 38) => "swim_stroke",
        (MessageKind::Lap, 39) => "sub_sport",
        (MessageKind::Lap, 40) => "num_active_lengths",

        (MessageKind::Record, 0) => "position_lat",
        (MessageKind::Record, 1) => "position_long",
        (MessageKind::Record, 2) => "altitude",
        (MessageKind::Record, 3) => "heart_rate",
        (MessageKind::Record, 4) => "cadence",
        (MessageKind::Record, 5) => "distance",
        (MessageKind::Record, 6) => "speed",
        (MessageKind::Record, 7) => "power",
        (MessageKind::Record, 9) => "grade",
        (MessageKind::Record, 13) => "temperature",
        (MessageKind::Record, 29) => "accumulated_power",
        (MessageKind::Record, 30) => "left_right_balance",
        (MessageKind::Record, 39) => "vertical_oscillation",
        (MessageKind::Record, 40) => "stance_time_percent",
        (MessageKind::Record, 41) => "stance_time",
        (MessageKind::Record, 53) => "fractional_cadence",
        (MessageKind::Record, 69) => "left_power_phase",
        (MessageKind::Record, 70) => "left_power_phase_peak",
        (MessageKind::Record, 71) => "right_power_phase",
        (MessageKind::Record, 72) => "right_power_phase_peak",
        (MessageKind::Record, 84) => "stance_time_balance",

        (MessageKind::Length, 0) => "event",
        (MessageKind::Length, 1) => "event_type",
        (MessageKind::Length, 2) => "start_time",
        (MessageKind::Length, 3) => "total_elapsed_time",
        (MessageKind::Length, 4) => "total_timer_time",
        (MessageKind::Length, 5) => "total_strokes",
        (MessageKind::Length, 6) => "avg_speed",
        (MessageKind::Length, 7) => "swim_stroke",
        (MessageKind::Length, 9) => "avg_swimming_cadence",
        (MessageKind::Length, 11) => "total_calories",
        (MessageKind::Length, 12) => "length_type",

        (MessageKind::DeviceInfo, 0) => "device_index",
        (MessageKind::DeviceInfo, 1) => "device_type",
        (MessageKind::DeviceInfo, 2) => "manufacturer",
        (MessageKind::DeviceInfo, 3) => "serial_number",
        (MessageKind::DeviceInfo, 4) => "product",
        (MessageKind::DeviceInfo, 5) => "software_version",
        (MessageKind::DeviceInfo, 6) => "hardware_version",
        (MessageKind::DeviceInfo, 10) => "battery_voltage",
        (MessageKind::DeviceInfo, 11) => "battery_status",
        (MessageKind::DeviceInfo, 27) => "product_name",

        (MessageKind::Event, 0) => "event",
        (MessageKind::Event, 1) => "event_type",
        (MessageKind::Event, 2) => "data16",
        (MessageKind::Event, 3) => "data",
        (MessageKind::Event, 4) => "event_group",

        (MessageKind::Sport, 0) => "sport",
        (MessageKind::Sport, 1) => "sub_sport",
        (MessageKind::Sport, 3) => "name",

        (MessageKind::Workout, 4) => "sport",
        (MessageKind::Workout, 5) => "capabilities",
        (MessageKind::Workout, 6) => "num_valid_steps",
        (MessageKind::Workout, 8) => "wkt_name",

        (MessageKind::WorkoutStep, 0) => "wkt_step_name",
        (MessageKind::WorkoutStep, 1) => "duration_type",
        (MessageKind::WorkoutStep, 2) => "duration_value",
        (MessageKind::WorkoutStep, 3) => "target_type",
        (MessageKind::WorkoutStep, 4) => "target_value",
        (MessageKind::WorkoutStep, 5) => "custom_target_value_low",
        (MessageKind::WorkoutStep, 6) => "custom_target_value_high",
        (MessageKind::WorkoutStep, 7) => "intensity",

        (MessageKind::Location, 0) => "name",
        (MessageKind::Location, 1) => "position_lat",
        (MessageKind::Location, 2) => "position_long",
        (MessageKind::Location, 3) => "symbol",
        (MessageKind::Location, 4) => "altitude",

        (MessageKind::TrainingFile, 0) => "type",
        (MessageKind::TrainingFile, 1) => "manufacturer",
        (MessageKind::TrainingFile, 2) => "product",
        (MessageKind::TrainingFile, 3) => "serial_number",
        (MessageKind::TrainingFile, 4) => "time_created",

        (MessageKind::Hrv, 0) => "time",

        (MessageKind::DeveloperDataId, 0) => "developer_id",
        (MessageKind::DeveloperDataId, 1) => "application_id",
        (MessageKind::DeveloperDataId, 2) => "manufacturer_id",
        (MessageKind::DeveloperDataId, 3) => "developer_data_index",
        (MessageKind::DeveloperDataId, 4) => "application_version",

        (MessageKind::FieldDescription, 0) => "developer_data_index",
        (MessageKind::FieldDescription, 1) => "field_definition_number",
        (MessageKind::FieldDescription, 2) => "fit_base_type_id",
        (MessageKind::FieldDescription, 3) => "field_name",
        (MessageKind::FieldDescription, 8) => "units",
        (MessageKind::FieldDescription, 14) => "native_mesg_num",
        (MessageKind::FieldDescription, 15) => "native_field_num",

        _ => return None,
    };
    Some(name)
}

/// Semicircles per degree, the FIT encoding for positions.
const SEMICIRCLES_PER_DEGREE: f64 = (1u64 << 31) as f64 / 180.0;

/// A scalar unit conversion applied at decode time: `raw / scale - offset`.
#[derive(Debug, Clone, Copy)]
pub struct Conversion {
    pub scale: f64,
    pub offset: f64,
}

impl Conversion {
    const fn scale(scale: f64) -> Self {
        Self { scale, offset: 0.0 }
    }

    /// Apply to a scalar, carrying arrays element-wise.
    pub fn apply(&self, value: Value) -> Value {
        match value {
            Value::Array(slots) => Value::Array(
                slots
                    .into_iter()
                    .map(|slot| slot.map(|v| self.apply(v)))
                    .collect(),
            ),
            other => match other.as_f64() {
                Some(f) => Value::Float(f / self.scale - self.offset),
                None => other,
            },
        }
    }
}

/// Unit conversion for a named field of a message, when the profile
/// defines one.
pub fn conversion(kind: MessageKind, name: &str) -> Option<Conversion> {
    let conv = match (kind, name) {
        (MessageKind::Record, "position_lat" | "position_long")
        | (MessageKind::Session | MessageKind::Lap, "start_position_lat")
        | (MessageKind::Session | MessageKind::Lap, "start_position_long")
        | (MessageKind::Lap, "end_position_lat" | "end_position_long")
        | (MessageKind::Location, "position_lat" | "position_long") => {
            Conversion::scale(SEMICIRCLES_PER_DEGREE)
        }

        (MessageKind::Record, "altitude") | (MessageKind::Location, "altitude") => Conversion {
            scale: 5.0,
            offset: 500.0,
        },
        (MessageKind::Record, "speed") => Conversion::scale(1000.0),
        (MessageKind::Record, "distance") => Conversion::scale(100.0),
        (MessageKind::Record, "grade") => Conversion::scale(100.0),
        (MessageKind::Record, "fractional_cadence") => Conversion::scale(128.0),
        (MessageKind::Record, "vertical_oscillation") => Conversion::scale(10.0),
        (MessageKind::Record, "stance_time") => Conversion::scale(10.0),
        (MessageKind::Record, "stance_time_percent") => Conversion::scale(100.0),
        (MessageKind::Record, "stance_time_balance") => Conversion::scale(100.0),

        (MessageKind::Session | MessageKind::Lap, "total_elapsed_time" | "total_timer_time")
        | (MessageKind::Length, "total_elapsed_time" | "total_timer_time")
        | (MessageKind::Activity, "total_timer_time") => Conversion::scale(1000.0),
        (MessageKind::Session | MessageKind::Lap, "total_distance") => Conversion::scale(100.0),
        (MessageKind::Session | MessageKind::Lap, "avg_speed" | "max_speed")
        | (MessageKind::Length, "avg_speed") => Conversion::scale(1000.0),
        (MessageKind::Session | MessageKind::Lap, "avg_stroke_distance") => {
            Conversion::scale(100.0)
        }
        (MessageKind::Session, "pool_length") => Conversion::scale(100.0),
        (
            MessageKind::Session,
            "avg_fractional_cadence" | "max_fractional_cadence",
        ) => Conversion::scale(128.0),

        (MessageKind::DeviceInfo, "software_version") => Conversion::scale(100.0),
        (MessageKind::DeviceInfo, "battery_voltage") => Conversion::scale(256.0),

        _ => return None,
    };
    Some(conv)
}

/// Sport types
///
/// Names and numeric values manually copied from Profile.xlsx in FIT SDK
/// 21.158.00.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, EnumString, strum::Display, Debug)]
#[strum(serialize_all = "snake_case")]
#[non_exhaustive]
pub enum Sport {
    Generic = 0u8,
    Running = 1u8,
    Cycling = 2u8,
    Transition = 3u8, // Multisport transition
    FitnessEquipment = 4u8,
    Swimming = 5u8,
    Basketball = 6u8,
    Soccer = 7u8,
    Tennis = 8u8,
    AmericanFootball = 9u8,
    Training = 10u8,
    Walking = 11u8,
    CrossCountrySkiing = 12u8,
    AlpineSkiing = 13u8,
    Snowboarding = 14u8,
    Rowing = 15u8,
    Mountaineering = 16u8,
    Hiking = 17u8,
    Multisport = 18u8,
    Paddling = 19u8,
    Flying = 20u8,
    EBiking = 21u8,
    Motorcycling = 22u8,
    Boating = 23u8,
    Driving = 24u8,
    Golf = 25u8,
    HangGliding = 26u8,
    HorsebackRiding = 27u8,
    Hunting = 28u8,
    Fishing = 29u8,
    InlineSkating = 30u8,
    RockClimbing = 31u8,
    Sailing = 32u8,
    IceSkating = 33u8,
    SkyDiving = 34u8,
    Snowshoeing = 35u8,
    Snowmobiling = 36u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_global_round_trip() {
        for global in [0u16, 12, 18, 19, 20, 21, 26, 27, 34, 49, 101, 206, 207] {
            assert_eq!(MessageKind::from_global(global).global(), global);
        }
        assert_eq!(MessageKind::from_global(9999), MessageKind::Other(9999));
    }

    #[test]
    fn test_common_field_names() {
        assert_eq!(field_name(MessageKind::Record, 253), Some("timestamp"));
        assert_eq!(field_name(MessageKind::Record, 4), Some("cadence"));
        assert_eq!(field_name(MessageKind::Session, 2), Some("start_time"));
        assert_eq!(field_name(MessageKind::Record, 200), None);
    }

    #[test]
    fn test_speed_conversion() {
        let conv = conversion(MessageKind::Record, "speed").unwrap();
        assert_eq!(conv.apply(Value::UInt(2500)), Value::Float(2.5));
    }

    #[test]
    fn test_altitude_conversion_has_offset() {
        let conv = conversion(MessageKind::Record, "altitude").unwrap();
        assert_eq!(conv.apply(Value::UInt(2500 + 2500)), Value::Float(500.0));
    }

    #[test]
    fn test_conversion_is_element_wise() {
        let conv = conversion(MessageKind::Record, "speed").unwrap();
        let value = Value::Array(vec![Some(Value::UInt(1000)), None]);
        assert_eq!(
            conv.apply(value),
            Value::Array(vec![Some(Value::Float(1.0)), None])
        );
    }

    #[test]
    fn test_sport_string_round_trip() {
        assert_eq!(Sport::from_str("cycling").unwrap(), Sport::Cycling);
        assert_eq!(Sport::Swimming.to_string(), "swimming");
    }
}
