//! Developer ("XDATA") field bookkeeping.
//!
//! Third-party applications introduce fields at runtime through
//! `developer_data_id` and `field_description` messages. This module
//! correlates the two into stable string keys used to name developer
//! values in decoded records, and hosts the application-wide registry that
//! maps those keys to series metadata.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::RwLock;

use crate::types::BaseType;

/// Developer fields are distinguished from native ones by adding this
/// offset to the developer data index in a definition's type code.
pub const DEV_TYPE_OFFSET: u16 = 1000;

/// A resolved developer field: its stable key and true base type.
#[derive(Debug, Clone)]
pub struct DevField {
    pub key: String,
    pub base_type: &'static BaseType,
}

/// Per-file table correlating application ids and field descriptions.
#[derive(Debug, Default)]
pub struct DevFieldTable {
    fields: HashMap<(u16, u8), DevField>,
    applications: HashMap<u8, String>,
}

impl DevFieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the application guid declared for a developer data index.
    pub fn register_application(&mut self, index: u8, guid: String) {
        self.applications.insert(index, guid);
    }

    pub fn application(&self, index: u8) -> Option<&str> {
        self.applications.get(&index).map(String::as_str)
    }

    /// Register a field description, returning the stable key under which
    /// values of the field will be emitted.
    ///
    /// The key is `<application-guid>-<field-number>` when the
    /// application id is known, the raw field name otherwise.
    pub fn describe_field(
        &mut self,
        index: u8,
        number: u8,
        base_type: &'static BaseType,
        name: &str,
    ) -> String {
        let key = match self.applications.get(&index) {
            Some(guid) => format!("{guid}-{number}"),
            None => name.to_owned(),
        };
        self.fields.insert(
            (DEV_TYPE_OFFSET + u16::from(index), number),
            DevField {
                key: key.clone(),
                base_type,
            },
        );
        key
    }

    /// Resolve a developer-typed definition entry to its field.
    pub fn lookup(&self, type_code: u16, number: u8) -> Option<&DevField> {
        self.fields.get(&(type_code, number))
    }
}

/// Lowercase hex rendering of raw id bytes, as used for application guids.
pub fn hex_string(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        // Writing to a String cannot fail.
        let _ = write!(&mut s, "{b:02x}");
    }
    s
}

/// Metadata attached to one developer field series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XdataSeries {
    pub key: String,
    pub name: String,
    pub units: Option<String>,
}

/// Application-wide registry of developer field series, keyed by stable
/// key.
///
/// Writes are serialised behind a lock; readers observe a consistent
/// snapshot per lookup. `reset` drops everything, which the owning
/// controller calls when the backing store changes.
#[derive(Debug, Default)]
pub struct XdataRegistry {
    inner: RwLock<HashMap<String, XdataSeries>>,
}

impl XdataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, series: XdataSeries) {
        let mut inner = self.inner.write().expect("xdata registry poisoned");
        inner.insert(series.key.clone(), series);
    }

    pub fn lookup(&self, key: &str) -> Option<XdataSeries> {
        let inner = self.inner.read().expect("xdata registry poisoned");
        inner.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().expect("xdata registry poisoned");
        inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every registered series.
    pub fn reset(&self) {
        let mut inner = self.inner.write().expect("xdata registry poisoned");
        inner.clear();
    }
}
