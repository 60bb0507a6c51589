//! Container-level validation of GRIB2 files.
//!
//! A valid file is a sequence of edition 2 messages that tile the file
//! exactly: each starts with `GRIB`, declares its total length in section 0,
//! and that length ends on the `7777` end section. This is checked before a
//! download is published and before an existing grid file is reused.

use std::path::Path;

use crate::error::Grib2Error;

/// Length of section 0.
pub const INDICATOR_LEN: usize = 16;

/// Location of one message within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSpan {
    pub offset: usize,
    pub length: usize,
}

impl MessageSpan {
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.offset..self.offset + self.length]
    }
}

/// Read the total message length from a section 0 starting at `offset`.
pub fn read_indicator(data: &[u8], offset: usize) -> Result<(u8, usize), Grib2Error> {
    let available = data.len().saturating_sub(offset);
    if available < INDICATOR_LEN {
        return Err(Grib2Error::Truncated {
            offset,
            needed: INDICATOR_LEN,
            available,
        });
    }

    let header = &data[offset..offset + INDICATOR_LEN];
    if &header[0..4] != b"GRIB" {
        return Err(Grib2Error::InvalidFormat(format!(
            "missing GRIB magic at offset {}",
            offset
        )));
    }

    let edition = header[7];
    if edition != 2 {
        return Err(Grib2Error::InvalidFormat(format!(
            "expected GRIB edition 2 at offset {}, got {}",
            offset, edition
        )));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&header[8..16]);
    let length = u64::from_be_bytes(len_bytes);
    let length = usize::try_from(length).map_err(|_| {
        Grib2Error::InvalidFormat(format!("message length {} too large", length))
    })?;

    Ok((header[6], length))
}

/// Validate the framing of a whole file and return every message span.
pub fn validate_framing(data: &[u8]) -> Result<Vec<MessageSpan>, Grib2Error> {
    if data.is_empty() {
        return Err(Grib2Error::InvalidFormat("empty file".to_string()));
    }

    let mut spans = Vec::new();
    let mut offset = 0usize;

    while offset < data.len() {
        let (_, length) = read_indicator(data, offset)?;
        if length < INDICATOR_LEN + 4 {
            return Err(Grib2Error::InvalidFormat(format!(
                "message at offset {} declares impossible length {}",
                offset, length
            )));
        }

        let available = data.len() - offset;
        if length > available {
            return Err(Grib2Error::Truncated {
                offset,
                needed: length,
                available,
            });
        }

        let end = offset + length;
        if &data[end - 4..end] != b"7777" {
            return Err(Grib2Error::InvalidFormat(format!(
                "message at offset {} does not end with 7777",
                offset
            )));
        }

        spans.push(MessageSpan { offset, length });
        offset = end;
    }

    Ok(spans)
}

/// Read a file and validate its framing.
pub fn validate_file(path: &Path) -> Result<Vec<MessageSpan>, Grib2Error> {
    let data = std::fs::read(path)?;
    validate_framing(&data)
}
