//! Byte-stream access to a FIT file.
//!
//! Owns the raw file bytes, validates the header and whole-file CRC up
//! front, then exposes positional typed reads limited to the data window
//! between the header and the trailing CRC.

use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::codec::{self, CodecError};
use crate::types::{self, BaseType, Value};

/// The minimum legal header length. Headers of 14 bytes add an optional
/// header CRC; anything 12 or larger is accepted and skipped over.
const MIN_HEADER_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("reading input")]
    Io(#[from] std::io::Error),
    #[error("bad FIT header: {0}")]
    BadHeader(&'static str),
    #[error("whole-file CRC check failed (residue {0:#06x})")]
    BadCrc(u16),
    #[error("file truncated: need {expected} bytes, have {actual}")]
    TruncatedData { expected: usize, actual: usize },
    #[error("read past end of data at offset {0}")]
    ReadPastEnd(usize),
}

impl From<CodecError> for StreamError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::OutOfBounds { pos, .. } => StreamError::ReadPastEnd(pos),
        }
    }
}

type Result<T> = std::result::Result<T, StreamError>;

/// A validated FIT file with a read cursor over its data records.
pub struct FitStream {
    data: Vec<u8>,
    pos: usize,
    data_end: usize,
    protocol_version: u8,
    profile_version: u16,
}

impl FitStream {
    /// Validate a FIT file held in memory and position the cursor on its
    /// first record.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() < MIN_HEADER_LEN {
            return Err(StreamError::BadHeader("shorter than a FIT header"));
        }
        let header_len = data[0] as usize;
        if header_len < MIN_HEADER_LEN {
            return Err(StreamError::BadHeader("header length below 12"));
        }
        if data.len() < header_len {
            return Err(StreamError::BadHeader("header length exceeds file"));
        }
        let protocol_version = data[1];
        let (profile_version, _) = codec::read_uint(&data, 2, 2, false)?;
        let (data_len, _) = codec::read_uint(&data, 4, 4, false)?;
        if &data[8..12] != b".FIT" {
            return Err(StreamError::BadHeader("missing .FIT signature"));
        }

        let data_len = data_len as usize;
        // Header, records, trailing CRC. A longer buffer means a chained
        // sub-file follows; it is accepted but never decoded.
        let expected = header_len + data_len + 2;
        if data.len() < expected {
            return Err(StreamError::TruncatedData {
                expected,
                actual: data.len(),
            });
        }

        let residue = codec::compute_crc(&data[..expected]);
        if residue != 0 {
            return Err(StreamError::BadCrc(residue));
        }

        debug!(
            header_len,
            data_len,
            protocol = protocol_version,
            profile = profile_version,
            "accepted FIT stream"
        );
        Ok(Self {
            data,
            pos: header_len,
            data_end: header_len + data_len,
            protocol_version,
            profile_version: profile_version as u16,
        })
    }

    /// Read and validate a FIT file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn protocol_version(&self) -> u8 {
        self.protocol_version
    }

    pub fn profile_version(&self) -> u16 {
        self.profile_version
    }

    /// True once every data record byte has been consumed.
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data_end
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, len: usize) -> Result<usize> {
        if self.pos + len > self.data_end {
            return Err(StreamError::ReadPastEnd(self.pos));
        }
        let at = self.pos;
        self.pos += len;
        Ok(at)
    }

    /// Next raw byte of the record stream.
    pub fn read_u8(&mut self) -> Result<u8> {
        let at = self.take(1)?;
        Ok(self.data[at])
    }

    /// Next unsigned integer of `width` bytes.
    pub fn read_uint(&mut self, width: usize, big_endian: bool) -> Result<u64> {
        let at = self.take(width)?;
        let (value, _) = codec::read_uint(&self.data, at, width, big_endian)?;
        Ok(value)
    }

    /// Next value of base type `ty`, spanning `size` bytes when given
    /// (multi-element fields), one type width otherwise.
    pub fn read_next(
        &mut self,
        ty: &BaseType,
        size: Option<usize>,
        big_endian: bool,
    ) -> Result<Option<Value>> {
        let size = size.unwrap_or(ty.width);
        let at = self.take(size)?;
        let (value, _) = types::read_value(&self.data, at, size, ty, big_endian)?;
        Ok(value)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::codec::compute_crc;

    /// Wrap record bytes in a 14-byte header and trailing CRC.
    pub(crate) fn build_file(records: &[u8]) -> Vec<u8> {
        let mut buf = vec![
            14u8,
            0x10,
            0x2a,
            0x05, // profile version 1322
        ];
        buf.extend_from_slice(&(records.len() as u32).to_le_bytes());
        buf.extend_from_slice(b".FIT");
        let header_crc = compute_crc(&buf);
        buf.extend_from_slice(&header_crc.to_le_bytes());
        buf.extend_from_slice(records);
        let crc = compute_crc(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    #[test]
    fn test_minimal_file_is_eof_immediately() -> Result<()> {
        let buf = build_file(&[]);
        assert_eq!(buf.len(), 16);
        let stream = FitStream::from_bytes(buf)?;
        assert!(stream.is_eof());
        assert_eq!(stream.profile_version(), 1322);
        Ok(())
    }

    #[test]
    fn test_rejects_missing_signature() {
        let mut buf = build_file(&[]);
        buf[8] = b'!';
        assert!(matches!(
            FitStream::from_bytes(buf),
            Err(StreamError::BadHeader(_))
        ));
    }

    #[test]
    fn test_rejects_bad_crc() {
        let mut buf = build_file(&[]);
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        assert!(matches!(
            FitStream::from_bytes(buf),
            Err(StreamError::BadCrc(_))
        ));
    }

    #[test]
    fn test_rejects_truncated_data() {
        let mut buf = build_file(&[1, 2, 3, 4]);
        buf.truncate(buf.len() - 3);
        assert!(matches!(
            FitStream::from_bytes(buf),
            Err(StreamError::TruncatedData { .. })
        ));
    }

    #[test]
    fn test_accepts_trailing_chained_chunk() -> Result<()> {
        let mut buf = build_file(&[0xAA]);
        // A second chained sub-file is tolerated but never decoded.
        buf.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let mut stream = FitStream::from_bytes(buf)?;
        assert_eq!(stream.read_u8()?, 0xAA);
        assert!(stream.is_eof());
        assert!(matches!(
            stream.read_u8(),
            Err(StreamError::ReadPastEnd(_))
        ));
        Ok(())
    }

    #[test]
    fn test_read_past_end() {
        let buf = build_file(&[]);
        let mut stream = FitStream::from_bytes(buf).unwrap();
        assert!(matches!(
            stream.read_u8(),
            Err(StreamError::ReadPastEnd(_))
        ));
    }
}
