//! Encoding of FIT output files.
//!
//! The encoder owns a growing buffer whose first fourteen bytes are
//! reserved for the file header. Message definitions are registered under
//! their global number and emitted as definition records; data records
//! encode field values in definition order, substituting each type's
//! invalid sentinel for anything the caller leaves out. `finalise` fills
//! in the header and appends the trailing CRC.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;
use tracing::debug;

use crate::codec::{self, CodecError, compute_crc};
use crate::types::{self, BaseType, Value};

/// The version of the Garmin SDK from which we obtain our profile
/// information.
///
/// Represented in base 10 as two digits for the major version, followed
/// by three for the minor.
pub const PROFILE_VERSION: u16 = 21158;

const PROTOCOL_VERSION: u8 = 0x10;
const HEADER_LEN: usize = 14;

/// Manufacturer id written into `file_id` preambles.
const MANUFACTURER_GARMIN: u64 = 1;
/// Product id written into `file_id` preambles (Garmin Connect).
const PRODUCT_CONNECT: u64 = 65534;

static FIT_EPOCH: LazyLock<DateTime<Utc>> =
    LazyLock::new(|| "1989-12-31T00:00:00Z".parse::<DateTime<Utc>>().unwrap());

/// Seconds since the FIT epoch of 1989-12-31T00:00:00Z.
pub fn fit_timestamp(time: DateTime<Utc>) -> u64 {
    time.signed_duration_since(*FIT_EPOCH).num_seconds().max(0) as u64
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("write of {len} bytes at offset {pos} overruns the buffer")]
    WritePastEnd { pos: usize, len: usize },
    #[error("data record for global message {0} has no registered definition")]
    UndefinedMessage(u16),
}

impl From<CodecError> for EncodeError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::OutOfBounds { pos, len, .. } => EncodeError::WritePastEnd { pos, len },
        }
    }
}

type Result<T> = std::result::Result<T, EncodeError>;

/// One field slot of an outgoing message definition.
#[derive(Debug, Clone)]
pub struct WriteField {
    pub name: &'static str,
    pub number: u8,
    pub base: &'static BaseType,
    pub count: usize,
}

impl WriteField {
    pub fn new(name: &'static str, number: u8, base: &'static BaseType) -> Self {
        Self {
            name,
            number,
            base,
            count: 1,
        }
    }

    /// A field spanning `count` elements (or bytes, for strings).
    pub fn array(name: &'static str, number: u8, base: &'static BaseType, count: usize) -> Self {
        Self {
            name,
            number,
            base,
            count,
        }
    }

    fn size(&self) -> usize {
        self.count * self.base.width
    }
}

#[derive(Debug, Clone)]
struct Definition {
    local: u8,
    fields: Vec<WriteField>,
}

/// Growing FIT output buffer with a definition table.
pub struct Encoder {
    buf: Vec<u8>,
    mark: usize,
    big_endian: bool,
    definitions: HashMap<u16, Definition>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            buf: vec![0; HEADER_LEN],
            mark: HEADER_LEN,
            big_endian: true,
            definitions: HashMap::new(),
        }
    }

    /// Bytes emitted so far, header included.
    pub fn mark(&self) -> usize {
        self.mark
    }

    /// Emit a definition record for `global` under `local`, and register
    /// it for subsequent data records.
    ///
    /// Registration is keyed on the global number, so definitions may
    /// alias on local id; a replaced definition is simply no longer
    /// reachable for new data records.
    pub fn put_definition(
        &mut self,
        global: u16,
        local: u8,
        fields: Vec<WriteField>,
    ) -> Result<()> {
        let size = 6 + 3 * fields.len();
        if self.mark + size > self.buf.len() {
            self.buf.resize(self.mark + size, 0);
        }
        let mut pos = self.mark;
        pos = codec::write_uint(&mut self.buf, pos, u64::from(0x40 | (local & 0x0F)), 1, false)?;
        pos = codec::write_uint(&mut self.buf, pos, 0, 1, false)?; // reserved
        pos = codec::write_uint(&mut self.buf, pos, u64::from(self.big_endian), 1, false)?;
        pos = codec::write_uint(&mut self.buf, pos, u64::from(global), 2, self.big_endian)?;
        pos = codec::write_uint(&mut self.buf, pos, fields.len() as u64, 1, false)?;
        for field in &fields {
            pos = codec::write_uint(&mut self.buf, pos, u64::from(field.number), 1, false)?;
            pos = codec::write_uint(&mut self.buf, pos, field.size() as u64, 1, false)?;
            pos = codec::write_uint(&mut self.buf, pos, u64::from(field.base.code), 1, false)?;
        }
        self.mark = pos;
        debug!(global, local, n_fields = fields.len(), "definition record");
        self.definitions.insert(global, Definition { local, fields });
        Ok(())
    }

    /// Emit a data record for `global`, looking each defined field up by
    /// name in `data`. Missing entries encode as the invalid sentinel.
    pub fn put_message(&mut self, global: u16, data: &[(&str, Value)]) -> Result<()> {
        let def = self
            .definitions
            .get(&global)
            .ok_or(EncodeError::UndefinedMessage(global))?;
        let size = 1 + def.fields.iter().map(WriteField::size).sum::<usize>();
        if self.mark + size > self.buf.len() {
            self.buf.resize(self.mark + size, 0);
        }
        let mut pos = self.mark;
        pos = codec::write_uint(&mut self.buf, pos, u64::from(def.local & 0x0F), 1, false)?;
        for field in &def.fields {
            let value = data
                .iter()
                .find(|(name, _)| *name == field.name)
                .map(|(_, value)| value);
            pos = types::write_value(
                &mut self.buf,
                pos,
                value,
                field.base,
                field.size(),
                self.big_endian,
            )?;
        }
        self.mark = pos;
        Ok(())
    }

    /// Fill in the header, append the trailing CRC, and return the
    /// finished file.
    pub fn finalise(mut self) -> Result<Vec<u8>> {
        self.buf.truncate(self.mark);
        let data_len = self.mark - HEADER_LEN;
        self.buf[0] = HEADER_LEN as u8;
        self.buf[1] = PROTOCOL_VERSION;
        codec::write_uint(&mut self.buf, 2, u64::from(PROFILE_VERSION), 2, false)?;
        codec::write_uint(&mut self.buf, 4, data_len as u64, 4, false)?;
        self.buf[8..12].copy_from_slice(b".FIT");
        let header_crc = compute_crc(&self.buf[..12]);
        codec::write_uint(&mut self.buf, 12, u64::from(header_crc), 2, false)?;
        let crc = compute_crc(&self.buf);
        self.buf.push((crc & 0xFF) as u8);
        self.buf.push((crc >> 8) as u8);
        debug!(bytes = self.buf.len(), "finalised FIT output");
        Ok(self.buf)
    }
}

/// Options shared by every file-writing specialisation.
#[derive(Clone, Debug)]
pub struct FileOptions {
    serial_number: u32,
    time_created: DateTime<Utc>,
    number: Option<u16>,
    software_version: u16,
    hardware_version: u8,
}

impl FileOptions {
    /// Set the device serial number written to the `file_id` message.
    pub fn with_serial_number(mut self, serial_number: u32) -> Self {
        self.serial_number = serial_number;
        self
    }

    /// Set the creation time written to the `file_id` message.
    ///
    /// An arbitrary, but consistent and reproducible, time is used if
    /// left unset.
    pub fn with_time_created(mut self, time_created: DateTime<Utc>) -> Self {
        self.time_created = time_created;
        self
    }

    /// Set the `file_id` file number.
    pub fn with_number(mut self, number: u16) -> Self {
        self.number = Some(number);
        self
    }

    /// Set the software version written to the `file_creator` message.
    pub fn with_software_version(mut self, software_version: u16) -> Self {
        self.software_version = software_version;
        self
    }

    /// Set the hardware version written to the `file_creator` message.
    pub fn with_hardware_version(mut self, hardware_version: u8) -> Self {
        self.hardware_version = hardware_version;
        self
    }

    pub fn time_created(&self) -> DateTime<Utc> {
        self.time_created
    }
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            serial_number: 1,
            // Defaulting to Utc::now() would mean FIT writes aren't
            // reproducible, so pin an arbitrary consistent date.
            time_created: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            number: None,
            software_version: 100,
            hardware_version: 0,
        }
    }
}

/// An encoder whose `file_id` / `file_creator` preamble has already been
/// written.
///
/// Both preamble messages go out under local id 0, which is never reused
/// afterwards by the file-kind specialisations.
pub struct FileWriter {
    encoder: Encoder,
}

impl FileWriter {
    pub fn new(file_type: u8, options: &FileOptions) -> Result<Self> {
        let mut encoder = Encoder::new();
        encoder.put_definition(
            0,
            0,
            vec![
                WriteField::new("type", 0, &types::ENUM),
                WriteField::new("manufacturer", 1, &types::UINT16),
                WriteField::new("product", 2, &types::UINT16),
                WriteField::new("serial_number", 3, &types::UINT32Z),
                WriteField::new("time_created", 4, &types::UINT32),
                WriteField::new("number", 5, &types::UINT16),
            ],
        )?;
        let mut file_id = vec![
            ("type", Value::UInt(u64::from(file_type))),
            ("manufacturer", Value::UInt(MANUFACTURER_GARMIN)),
            ("product", Value::UInt(PRODUCT_CONNECT)),
            (
                "serial_number",
                Value::UInt(u64::from(options.serial_number)),
            ),
            (
                "time_created",
                Value::UInt(fit_timestamp(options.time_created)),
            ),
        ];
        if let Some(number) = options.number {
            file_id.push(("number", Value::UInt(u64::from(number))));
        }
        encoder.put_message(0, &file_id)?;

        encoder.put_definition(
            49,
            0,
            vec![
                WriteField::new("software_version", 0, &types::UINT16),
                WriteField::new("hardware_version", 1, &types::UINT8),
            ],
        )?;
        encoder.put_message(
            49,
            &[
                (
                    "software_version",
                    Value::UInt(u64::from(options.software_version)),
                ),
                (
                    "hardware_version",
                    Value::UInt(u64::from(options.hardware_version)),
                ),
            ],
        )?;
        Ok(Self { encoder })
    }

    pub fn encoder(&mut self) -> &mut Encoder {
        &mut self.encoder
    }

    pub fn finalise(self) -> Result<Vec<u8>> {
        self.encoder.finalise()
    }
}
