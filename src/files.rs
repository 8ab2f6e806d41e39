//! File-kind specialisations over the encoder: workout, sport zone, and
//! settings files.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::profile::Sport;
use crate::types::{self, Value};
use crate::writer::{EncodeError, FileOptions, FileWriter, WriteField};

type Result<T> = std::result::Result<T, EncodeError>;

const FILE_TYPE_SETTINGS: u8 = 2;
const FILE_TYPE_SPORT: u8 = 3;
const FILE_TYPE_WORKOUT: u8 = 5;

/// One step of a workout.
///
/// Duration and target semantics follow the FIT profile: the type fields
/// select how the paired value fields are interpreted.
#[derive(Debug, Clone, Default)]
pub struct WorkoutStep {
    pub name: Option<String>,
    pub duration_type: u8,
    pub duration_value: Option<u32>,
    pub target_type: u8,
    pub target_value: Option<u32>,
    pub custom_target_low: Option<u32>,
    pub custom_target_high: Option<u32>,
    pub intensity: u8,
}

/// Writer for a WORKOUT file: a named sequence of steps.
pub struct WorkoutFile {
    writer: FileWriter,
    name: String,
    sport: Sport,
    steps: Vec<WorkoutStep>,
}

impl WorkoutFile {
    pub fn new(name: &str, sport: Sport, options: &FileOptions) -> Result<Self> {
        Ok(Self {
            writer: FileWriter::new(FILE_TYPE_WORKOUT, options)?,
            name: name.to_owned(),
            sport,
            steps: Vec::new(),
        })
    }

    /// Append a step. Steps are emitted in insertion order with
    /// auto-incrementing message indexes.
    pub fn add_step(&mut self, step: WorkoutStep) {
        self.steps.push(step);
    }

    pub fn finalise(mut self) -> Result<Vec<u8>> {
        let encoder = self.writer.encoder();
        encoder.put_definition(
            26,
            1,
            vec![
                WriteField::array("wkt_name", 8, &types::STRING, 16),
                WriteField::new("sport", 4, &types::ENUM),
                WriteField::new("num_valid_steps", 6, &types::UINT16),
            ],
        )?;
        encoder.put_message(
            26,
            &[
                ("wkt_name", Value::Text(self.name.clone())),
                ("sport", Value::UInt(self.sport as u64)),
                ("num_valid_steps", Value::UInt(self.steps.len() as u64)),
            ],
        )?;

        if !self.steps.is_empty() {
            encoder.put_definition(
                27,
                2,
                vec![
                    WriteField::new("message_index", 254, &types::UINT16),
                    WriteField::array("wkt_step_name", 0, &types::STRING, 16),
                    WriteField::new("duration_type", 1, &types::ENUM),
                    WriteField::new("duration_value", 2, &types::UINT32),
                    WriteField::new("target_type", 3, &types::ENUM),
                    WriteField::new("target_value", 4, &types::UINT32),
                    WriteField::new("custom_target_value_low", 5, &types::UINT32),
                    WriteField::new("custom_target_value_high", 6, &types::UINT32),
                    WriteField::new("intensity", 7, &types::ENUM),
                ],
            )?;
            for (index, step) in self.steps.iter().enumerate() {
                let mut data = vec![
                    ("message_index", Value::UInt(index as u64)),
                    ("duration_type", Value::UInt(u64::from(step.duration_type))),
                    ("target_type", Value::UInt(u64::from(step.target_type))),
                    ("intensity", Value::UInt(u64::from(step.intensity))),
                ];
                if let Some(name) = &step.name {
                    data.push(("wkt_step_name", Value::Text(name.clone())));
                }
                if let Some(duration) = step.duration_value {
                    data.push(("duration_value", Value::UInt(u64::from(duration))));
                }
                if let Some(target) = step.target_value {
                    data.push(("target_value", Value::UInt(u64::from(target))));
                }
                if let Some(low) = step.custom_target_low {
                    data.push(("custom_target_value_low", Value::UInt(u64::from(low))));
                }
                if let Some(high) = step.custom_target_high {
                    data.push(("custom_target_value_high", Value::UInt(u64::from(high))));
                }
                encoder.put_message(27, &data)?;
            }
        }
        self.writer.finalise()
    }
}

/// Writer for a SPORT file: sport selection plus zone tables.
pub struct SportFile {
    writer: FileWriter,
    sport: Sport,
    sub_sport: u8,
    max_heart_rate: Option<u8>,
    functional_threshold_power: Option<u16>,
    hr_zones: Vec<u8>,
    power_zones: Vec<u16>,
    speed_zones: Vec<f64>,
}

impl SportFile {
    pub fn new(sport: Sport, sub_sport: u8, options: &FileOptions) -> Result<Self> {
        Ok(Self {
            writer: FileWriter::new(FILE_TYPE_SPORT, options)?,
            sport,
            sub_sport,
            max_heart_rate: None,
            functional_threshold_power: None,
            hr_zones: Vec::new(),
            power_zones: Vec::new(),
            speed_zones: Vec::new(),
        })
    }

    pub fn set_max_heart_rate(&mut self, bpm: u8) {
        self.max_heart_rate = Some(bpm);
    }

    pub fn set_functional_threshold_power(&mut self, watts: u16) {
        self.functional_threshold_power = Some(watts);
    }

    /// Heart-rate zone upper bounds, in bpm.
    pub fn set_hr_zones(&mut self, zones: Vec<u8>) {
        self.hr_zones = zones;
    }

    /// Power zone upper bounds, in watts.
    pub fn set_power_zones(&mut self, zones: Vec<u16>) {
        self.power_zones = zones;
    }

    /// Speed zone upper bounds, in m/s. Encoded in mm/s.
    pub fn set_speed_zones(&mut self, zones: Vec<f64>) {
        self.speed_zones = zones;
    }

    pub fn finalise(mut self) -> Result<Vec<u8>> {
        let encoder = self.writer.encoder();

        encoder.put_definition(
            7,
            1,
            vec![
                WriteField::new("max_heart_rate", 1, &types::UINT8),
                WriteField::new("functional_threshold_power", 3, &types::UINT16),
                WriteField::new("hr_calc_type", 5, &types::ENUM),
                WriteField::new("pwr_calc_type", 7, &types::ENUM),
            ],
        )?;
        let mut zones_target = Vec::new();
        if let Some(bpm) = self.max_heart_rate {
            zones_target.push(("max_heart_rate", Value::UInt(u64::from(bpm))));
        }
        if let Some(watts) = self.functional_threshold_power {
            zones_target.push(("functional_threshold_power", Value::UInt(u64::from(watts))));
        }
        if !self.hr_zones.is_empty() {
            // zone bounds are given explicitly, so calculation is "custom"
            zones_target.push(("hr_calc_type", Value::UInt(0)));
        }
        if !self.power_zones.is_empty() {
            zones_target.push(("pwr_calc_type", Value::UInt(0)));
        }
        encoder.put_message(7, &zones_target)?;

        encoder.put_definition(
            12,
            2,
            vec![
                WriteField::new("sport", 0, &types::ENUM),
                WriteField::new("sub_sport", 1, &types::ENUM),
            ],
        )?;
        encoder.put_message(
            12,
            &[
                ("sport", Value::UInt(self.sport as u64)),
                ("sub_sport", Value::UInt(u64::from(self.sub_sport))),
            ],
        )?;

        if !self.hr_zones.is_empty() {
            encoder.put_definition(
                8,
                3,
                vec![
                    WriteField::new("message_index", 254, &types::UINT16),
                    WriteField::new("high_bpm", 1, &types::UINT8),
                ],
            )?;
            for (index, bpm) in self.hr_zones.iter().enumerate() {
                encoder.put_message(
                    8,
                    &[
                        ("message_index", Value::UInt(index as u64)),
                        ("high_bpm", Value::UInt(u64::from(*bpm))),
                    ],
                )?;
            }
        }

        if !self.power_zones.is_empty() {
            encoder.put_definition(
                9,
                4,
                vec![
                    WriteField::new("message_index", 254, &types::UINT16),
                    WriteField::new("high_value", 1, &types::UINT16),
                ],
            )?;
            for (index, watts) in self.power_zones.iter().enumerate() {
                encoder.put_message(
                    9,
                    &[
                        ("message_index", Value::UInt(index as u64)),
                        ("high_value", Value::UInt(u64::from(*watts))),
                    ],
                )?;
            }
        }

        if !self.speed_zones.is_empty() {
            encoder.put_definition(
                53,
                5,
                vec![
                    WriteField::new("message_index", 254, &types::UINT16),
                    WriteField::new("high_value", 0, &types::UINT16),
                ],
            )?;
            for (index, mps) in self.speed_zones.iter().enumerate() {
                let mm_per_s = (mps * 1000.0).round() as u64;
                encoder.put_message(
                    53,
                    &[
                        ("message_index", Value::UInt(index as u64)),
                        ("high_value", Value::UInt(mm_per_s)),
                    ],
                )?;
            }
        }

        self.writer.finalise()
    }
}

/// Athlete data carried by a SETTINGS file.
#[derive(Debug, Clone)]
pub struct UserProfile {
    /// 0 female, 1 male, per the FIT gender enum.
    pub gender: u8,
    pub date_of_birth: NaiveDate,
    /// Height in metres.
    pub height: f64,
    /// Weight in kilograms.
    pub weight: f64,
    /// Activity class on the 0-10 scale.
    pub activity_class: f64,
}

const SECONDS_PER_YEAR: i64 = 31_536_000;

/// Whole years elapsed between `date_of_birth` and `now`.
fn age_years(date_of_birth: NaiveDate, now: DateTime<Utc>) -> u64 {
    let dob = date_of_birth
        .and_hms_opt(0, 0, 0)
        .expect("midnight exists")
        .and_utc();
    let seconds = now.signed_duration_since(dob).num_seconds().max(0);
    (seconds / SECONDS_PER_YEAR) as u64
}

/// Writer for a SETTINGS file: user profile and HRM options.
pub struct SettingsFile {
    writer: FileWriter,
    profile: UserProfile,
    log_hrv: bool,
    time_created: DateTime<Utc>,
}

impl SettingsFile {
    /// The athlete's age is computed at the file's creation time.
    pub fn new(profile: UserProfile, log_hrv: bool, options: &FileOptions) -> Result<Self> {
        Ok(Self {
            writer: FileWriter::new(FILE_TYPE_SETTINGS, options)?,
            profile,
            log_hrv,
            time_created: options.time_created(),
        })
    }

    pub fn finalise(mut self) -> Result<Vec<u8>> {
        let encoder = self.writer.encoder();
        encoder.put_definition(
            3,
            1,
            vec![
                WriteField::new("gender", 1, &types::ENUM),
                WriteField::new("age", 2, &types::UINT8),
                WriteField::new("height", 3, &types::UINT8),
                WriteField::new("weight", 4, &types::UINT16),
                WriteField::new("activity_class", 17, &types::ENUM),
                WriteField::new("birth_year", 24, &types::UINT8),
            ],
        )?;
        let age = age_years(self.profile.date_of_birth, self.time_created);
        let birth_year = i64::from(self.profile.date_of_birth.year()) - 1900;
        encoder.put_message(
            3,
            &[
                ("gender", Value::UInt(u64::from(self.profile.gender))),
                ("age", Value::UInt(age)),
                ("height", Value::UInt((self.profile.height * 100.0).round() as u64)),
                ("weight", Value::UInt((self.profile.weight * 10.0).round() as u64)),
                (
                    "activity_class",
                    Value::UInt((self.profile.activity_class * 10.0).round() as u64),
                ),
                ("birth_year", Value::UInt(birth_year.max(0) as u64)),
            ],
        )?;

        encoder.put_definition(
            4,
            2,
            vec![WriteField::new("log_hrv", 2, &types::ENUM)],
        )?;
        encoder.put_message(4, &[("log_hrv", Value::UInt(u64::from(self.log_hrv)))])?;

        self.writer.finalise()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::compute_crc;
    use crate::decoder::{Message, RecordDecoder};
    use crate::profile::MessageKind;
    use crate::stream::FitStream;

    fn decode(buf: Vec<u8>) -> Vec<Message> {
        let mut stream = FitStream::from_bytes(buf).unwrap();
        let mut decoder = RecordDecoder::new();
        let mut messages = Vec::new();
        while !stream.is_eof() {
            if let Some(message) = decoder.next_message(&mut stream).unwrap() {
                messages.push(message);
            }
        }
        messages
    }

    #[test]
    fn test_workout_round_trip() -> Result<()> {
        let workout = WorkoutFile::new("Test", Sport::Running, &FileOptions::default())?;
        let buf = workout.finalise()?;
        assert_eq!(compute_crc(&buf), 0);

        let messages = decode(buf);
        assert_eq!(messages.len(), 3);

        let file_id = &messages[0];
        assert_eq!(file_id.get("type"), Some(&Value::UInt(5)));
        assert_eq!(file_id.get("manufacturer"), Some(&Value::UInt(1)));
        assert_eq!(file_id.get("product"), Some(&Value::UInt(65534)));

        let workout = &messages[2];
        assert_eq!(workout.kind, MessageKind::Workout);
        assert_eq!(workout.get("wkt_name"), Some(&Value::Text("Test".to_owned())));
        assert_eq!(workout.get("sport"), Some(&Value::UInt(1)));
        assert_eq!(workout.get("num_valid_steps"), Some(&Value::UInt(0)));
        Ok(())
    }

    #[test]
    fn test_workout_steps_get_sequential_indexes() -> Result<()> {
        let mut workout = WorkoutFile::new("Intervals", Sport::Cycling, &FileOptions::default())?;
        for watts in [200u32, 120] {
            workout.add_step(WorkoutStep {
                duration_type: 0, // time
                duration_value: Some(60_000),
                target_type: 4, // power
                target_value: Some(watts),
                ..WorkoutStep::default()
            });
        }
        let messages = decode(workout.finalise()?);
        let steps: Vec<&Message> = messages
            .iter()
            .filter(|m| m.kind == MessageKind::WorkoutStep)
            .collect();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].get("message_index"), Some(&Value::UInt(0)));
        assert_eq!(steps[1].get("message_index"), Some(&Value::UInt(1)));
        assert_eq!(steps[0].get("target_value"), Some(&Value::UInt(200)));
        let workout = messages
            .iter()
            .find(|m| m.kind == MessageKind::Workout)
            .unwrap();
        assert_eq!(workout.get("num_valid_steps"), Some(&Value::UInt(2)));
        Ok(())
    }

    #[test]
    fn test_sport_file_zones() -> Result<()> {
        let mut sport = SportFile::new(Sport::Cycling, 0, &FileOptions::default())?;
        sport.set_max_heart_rate(185);
        sport.set_functional_threshold_power(250);
        sport.set_hr_zones(vec![120, 140, 160, 175, 185]);
        sport.set_speed_zones(vec![2.5, 5.0, 10.0]);
        let messages = decode(sport.finalise()?);

        // max_heart_rate, functional_threshold_power, hr_calc_type; the
        // unset pwr_calc_type encodes as the invalid sentinel and elides.
        let zones_target = messages
            .iter()
            .find(|m| m.kind == MessageKind::Other(7))
            .unwrap();
        assert_eq!(zones_target.fields().len(), 3);

        let sport_message = messages
            .iter()
            .find(|m| m.kind == MessageKind::Sport)
            .unwrap();
        assert_eq!(sport_message.get("sport"), Some(&Value::UInt(2)));

        let hr_zones: Vec<&Message> = messages
            .iter()
            .filter(|m| m.kind == MessageKind::Other(8))
            .collect();
        assert_eq!(hr_zones.len(), 5);

        // Speed zones are encoded in mm/s.
        let speed_zones: Vec<&Message> = messages
            .iter()
            .filter(|m| m.kind == MessageKind::Other(53))
            .collect();
        assert_eq!(speed_zones.len(), 3);
        assert_eq!(speed_zones[0].fields()[1].1, Value::UInt(2500));
        Ok(())
    }

    #[test]
    fn test_settings_file() -> Result<()> {
        let options = FileOptions::default().with_time_created(
            "2020-06-15T00:00:00Z".parse().unwrap(),
        );
        let profile = UserProfile {
            gender: 1,
            date_of_birth: NaiveDate::from_ymd_opt(1985, 3, 10).unwrap(),
            height: 1.80,
            weight: 74.5,
            activity_class: 7.0,
        };
        let settings = SettingsFile::new(profile, true, &options)?;
        let messages = decode(settings.finalise()?);

        let user = messages
            .iter()
            .find(|m| m.kind == MessageKind::Other(3))
            .unwrap();
        // gender, age, height*100, weight*10, activity_class*10, birth_year
        let values: Vec<&Value> = user.fields().iter().map(|(_, v)| v).collect();
        assert_eq!(values[0], &Value::UInt(1));
        assert_eq!(values[1], &Value::UInt(35));
        assert_eq!(values[2], &Value::UInt(180));
        assert_eq!(values[3], &Value::UInt(745));
        assert_eq!(values[4], &Value::UInt(70));
        assert_eq!(values[5], &Value::UInt(85));

        let hrm = messages
            .iter()
            .find(|m| m.kind == MessageKind::Other(4))
            .unwrap();
        assert_eq!(hrm.fields()[0].1, Value::UInt(1));
        Ok(())
    }

    #[test]
    fn test_age_years() {
        let dob = NaiveDate::from_ymd_opt(1985, 3, 10).unwrap();
        let now = "2020-06-15T00:00:00Z".parse().unwrap();
        assert_eq!(age_years(dob, now), 35);
        let now = "1985-03-11T00:00:00Z".parse().unwrap();
        assert_eq!(age_years(dob, now), 0);
    }
}
