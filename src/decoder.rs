//! Decoding of FIT records into named field values.
//!
//! Definition records describe the wire layout of the data records that
//! follow them, keyed by a small local id that devices reuse freely. The
//! decoder keeps the live definition table, turns each data record into an
//! ordered list of named values, and maintains the developer-field
//! correlation state fed by `developer_data_id` and `field_description`
//! messages.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::profile::{self, MessageKind};
use crate::stream::{FitStream, StreamError};
use crate::types::{BaseType, Value};
use crate::xdata::{self, DevFieldTable, DEV_TYPE_OFFSET};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("data record references undefined local id {0}")]
    UnknownMessageDefinition(u8),
    #[error("unknown developer field (index {index}, number {number})")]
    UnknownDevField { index: u8, number: u8 },
    #[error("definition references unknown base type {0:#04x}")]
    UnknownBaseType(u8),
    #[error("impossible record header byte {0:#04x}")]
    BadHeaderByte(u8),
}

type Result<T> = std::result::Result<T, DecodeError>;

/// Identifier of a field within a decoded message.
///
/// Known profile fields carry their symbolic name, unknown ones their
/// numeric field number, and developer fields the stable key derived from
/// their field description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Sym(&'static str),
    Num(u8),
    Dev(String),
}

impl FieldKey {
    /// Whether this key names the given field.
    pub fn is(&self, name: &str) -> bool {
        match self {
            FieldKey::Sym(s) => *s == name,
            FieldKey::Dev(s) => s == name,
            FieldKey::Num(_) => false,
        }
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKey::Sym(s) => f.write_str(s),
            FieldKey::Num(n) => write!(f, "field_{n}"),
            FieldKey::Dev(s) => f.write_str(s),
        }
    }
}

/// A decoded message: its kind plus an insertion-ordered field list.
///
/// Lookups return the first entry with a matching name, so a developer
/// field sharing a name with a native field never shadows it once the
/// native entry is in front.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    fields: Vec<(FieldKey, Value)>,
}

impl Message {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    pub fn fields(&self) -> &[(FieldKey, Value)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(key, _)| key.is(name))
            .map(|(_, value)| value)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The record's timestamp field, as raw FIT-epoch seconds.
    pub fn timestamp(&self) -> Option<u64> {
        self.get("timestamp").and_then(Value::as_u64)
    }

    pub fn push(&mut self, key: FieldKey, value: Value) {
        self.fields.push((key, value));
    }

    /// Drop every entry stored under `name`.
    pub fn remove(&mut self, name: &str) {
        self.fields.retain(|(key, _)| !key.is(name));
    }

    /// Replace the value of the first entry named `name` in place, or
    /// append a new entry when absent.
    pub fn replace(&mut self, name: &'static str, value: Value) {
        match self.fields.iter_mut().find(|(key, _)| key.is(name)) {
            Some((_, slot)) => *slot = value,
            None => self.push(FieldKey::Sym(name), value),
        }
    }

    /// Remove any entries named like `entries` and insert the new ones at
    /// the front, preserving their order.
    pub fn prepend(&mut self, entries: Vec<(FieldKey, Value)>) {
        for (key, _) in &entries {
            if let FieldKey::Sym(name) = key {
                self.remove(name);
            }
        }
        self.fields.splice(0..0, entries);
    }

    /// Append another message's fields, keeping existing entries in front.
    pub fn merge(&mut self, other: Message) {
        self.fields.extend(other.fields);
    }
}

/// One field slot of a message definition.
#[derive(Debug, Clone)]
struct FieldDef {
    key: FieldKey,
    number: u8,
    size: u8,
    /// Base type code, or `DEV_TYPE_OFFSET + developer-data-index` for
    /// developer fields.
    type_code: u16,
}

/// Wire layout for one local id.
#[derive(Debug, Clone)]
struct MessageDefinition {
    kind: MessageKind,
    big_endian: bool,
    fields: Vec<FieldDef>,
}

enum RecordHeader {
    Definition { local: u8, developer: bool },
    Data { local: u8 },
    CompressedData { local: u8, offset: u8 },
}

impl RecordHeader {
    fn parse(byte: u8) -> Result<RecordHeader> {
        if byte & 0x80 != 0 {
            return Ok(RecordHeader::CompressedData {
                local: (byte >> 5) & 0x03,
                offset: byte & 0x1F,
            });
        }
        let local = byte & 0x0F;
        let definition = byte & 0x40 != 0;
        let developer = byte & 0x20 != 0;
        if developer && !definition {
            // The developer flag is only meaningful on definitions.
            return Err(DecodeError::BadHeaderByte(byte));
        }
        if definition {
            Ok(RecordHeader::Definition { local, developer })
        } else {
            Ok(RecordHeader::Data { local })
        }
    }
}

/// Streaming decoder of definition and data records.
#[derive(Default)]
pub struct RecordDecoder {
    definitions: HashMap<u8, MessageDefinition>,
    dev_fields: DevFieldTable,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next record. Definition records update internal state
    /// and yield `None`; data records yield the decoded message.
    pub fn next_message(&mut self, stream: &mut FitStream) -> Result<Option<Message>> {
        match RecordHeader::parse(stream.read_u8()?)? {
            RecordHeader::Definition { local, developer } => {
                self.read_definition(stream, local, developer)?;
                Ok(None)
            }
            RecordHeader::Data { local } => self.read_data(stream, local, None).map(Some),
            RecordHeader::CompressedData { local, offset } => {
                self.read_data(stream, local, Some(offset)).map(Some)
            }
        }
    }

    fn read_definition(
        &mut self,
        stream: &mut FitStream,
        local: u8,
        developer: bool,
    ) -> Result<()> {
        let _reserved = stream.read_u8()?;
        let big_endian = stream.read_u8()? != 0;
        let global = stream.read_uint(2, big_endian)? as u16;
        let kind = MessageKind::from_global(global);

        let count = stream.read_u8()?;
        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let number = stream.read_u8()?;
            let size = stream.read_u8()?;
            let type_code = stream.read_u8()?;
            if BaseType::from_code(type_code).is_none() {
                return Err(DecodeError::UnknownBaseType(type_code));
            }
            let key = match profile::field_name(kind, number) {
                Some(name) => FieldKey::Sym(name),
                None => FieldKey::Num(number),
            };
            fields.push(FieldDef {
                key,
                number,
                size,
                type_code: u16::from(type_code),
            });
        }

        if developer {
            let dev_count = stream.read_u8()?;
            for _ in 0..dev_count {
                let number = stream.read_u8()?;
                let size = stream.read_u8()?;
                let index = stream.read_u8()?;
                fields.push(FieldDef {
                    key: FieldKey::Num(number),
                    number,
                    size,
                    type_code: DEV_TYPE_OFFSET + u16::from(index),
                });
            }
        }

        debug!(local, %kind, n_fields = fields.len(), "message definition");
        // Redefinition of a live local id replaces the previous layout.
        self.definitions.insert(
            local,
            MessageDefinition {
                kind,
                big_endian,
                fields,
            },
        );
        Ok(())
    }

    fn read_data(
        &mut self,
        stream: &mut FitStream,
        local: u8,
        time_offset: Option<u8>,
    ) -> Result<Message> {
        let def = self
            .definitions
            .get(&local)
            .ok_or(DecodeError::UnknownMessageDefinition(local))?;

        let mut message = Message::new(def.kind);
        for fd in &def.fields {
            let (key, ty) = if fd.type_code >= DEV_TYPE_OFFSET {
                let dev = self.dev_fields.lookup(fd.type_code, fd.number).ok_or(
                    DecodeError::UnknownDevField {
                        index: (fd.type_code - DEV_TYPE_OFFSET) as u8,
                        number: fd.number,
                    },
                )?;
                (FieldKey::Dev(dev.key.clone()), dev.base_type)
            } else {
                let ty = BaseType::from_code(fd.type_code as u8)
                    .ok_or(DecodeError::UnknownBaseType(fd.type_code as u8))?;
                (fd.key.clone(), ty)
            };

            // Invalid sentinels surface as None here and are elided.
            let value = stream.read_next(ty, Some(fd.size as usize), def.big_endian)?;
            if let Some(mut value) = value {
                if let FieldKey::Sym(name) = &key {
                    if let Some(conv) = profile::conversion(def.kind, name) {
                        value = conv.apply(value);
                    }
                }
                message.push(key, value);
            }
        }

        if let Some(offset) = time_offset {
            message.push(
                FieldKey::Sym("compressed_timestamp"),
                Value::UInt(u64::from(offset)),
            );
        }

        match message.kind {
            MessageKind::DeveloperDataId => self.note_developer_data_id(&mut message),
            MessageKind::FieldDescription => self.note_field_description(&mut message)?,
            _ => {}
        }
        Ok(message)
    }

    /// Rewrite the raw id byte strings of a `developer_data_id` message as
    /// lowercase hex and remember the application guid for its index.
    fn note_developer_data_id(&mut self, message: &mut Message) {
        if let Some(bytes) = message.get("developer_id").and_then(Value::as_bytes) {
            let hex = xdata::hex_string(bytes);
            message.replace("developer_id", Value::Text(hex));
        }
        let guid = message
            .get("application_id")
            .and_then(Value::as_bytes)
            .map(xdata::hex_string);
        if let Some(guid) = guid {
            message.replace("application_id", Value::Text(guid.clone()));
            match message.get("developer_data_index").and_then(Value::as_u64) {
                Some(index) => self
                    .dev_fields
                    .register_application(index as u8, guid),
                None => warn!("developer_data_id without developer_data_index"),
            }
        }
    }

    /// Register a `field_description` message and stamp the stable key
    /// into it for downstream lookup.
    fn note_field_description(&mut self, message: &mut Message) -> Result<()> {
        let index = message.get("developer_data_index").and_then(Value::as_u64);
        let number = message
            .get("field_definition_number")
            .and_then(Value::as_u64);
        let base_code = message.get("fit_base_type_id").and_then(Value::as_u64);
        let (Some(index), Some(number), Some(base_code)) = (index, number, base_code) else {
            warn!("incomplete field_description; skipping registration");
            return Ok(());
        };
        let base = BaseType::from_code(base_code as u8)
            .ok_or(DecodeError::UnknownBaseType(base_code as u8))?;
        let name = message
            .get("field_name")
            .and_then(Value::as_text)
            .unwrap_or("")
            .to_owned();
        let key = self
            .dev_fields
            .describe_field(index as u8, number as u8, base, &name);
        message.push(FieldKey::Sym("field_key"), Value::Text(key));
        Ok(())
    }
}
