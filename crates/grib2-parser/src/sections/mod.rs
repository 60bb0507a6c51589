//! GRIB2 section parsing.
//!
//! A message is walked section by section from the end of section 0 up to
//! the `7777` end marker. Sections 1, 3, 4, 5, 6 and 7 are decoded into the
//! structs below; section 2 (local use) is skipped. When a message repeats
//! sections 2-7 for further fields, only the first field is parsed.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use forecast_common::{GridSpec, ScanMode};

use crate::error::Grib2Error;
use crate::framing::{read_indicator, INDICATOR_LEN};

/// Value used by GRIB2 for "missing" in 4-octet fields.
const MISSING_U32: u32 = 0xFFFF_FFFF;

/// Section 0: Indicator Section (16 bytes)
#[derive(Debug, Clone)]
pub struct Indicator {
    pub discipline: u8,
    pub edition: u8,
    pub message_length: usize,
}

/// Section 1: Identification Section
#[derive(Debug, Clone)]
pub struct Identification {
    pub center: u16,
    pub sub_center: u16,
    pub table_version: u8,
    pub local_table_version: u8,
    pub significance_of_reference_time: u8,
    pub reference_time: DateTime<Utc>,
    pub production_status: u8,
    pub data_type: u8,
}

/// Section 3: Grid Definition Section (template 3.0, regular lat/lon)
#[derive(Debug, Clone)]
pub struct GridDefinition {
    pub template: u16,
    pub num_data_points: u32,
    pub earth_shape: u8,
    /// Points along a parallel
    pub ni: u32,
    /// Points along a meridian
    pub nj: u32,
    pub first_latitude: f64,
    pub first_longitude: f64,
    pub last_latitude: f64,
    pub last_longitude: f64,
    /// i direction (longitude) increment in degrees
    pub i_increment: f64,
    /// j direction (latitude) increment in degrees
    pub j_increment: f64,
    pub scanning_mode: u8,
}

impl GridDefinition {
    /// Grid spec in storage order.
    pub fn to_grid_spec(&self) -> Result<GridSpec, Grib2Error> {
        if self.template != 0 {
            return Err(Grib2Error::UnsupportedTemplate {
                section: 3,
                template: self.template,
            });
        }
        Ok(GridSpec::new(
            self.ni as usize,
            self.nj as usize,
            self.first_latitude,
            self.first_longitude,
            self.j_increment.abs(),
            self.i_increment.abs(),
            ScanMode::from_grib2_flag(self.scanning_mode),
        )?)
    }
}

/// Section 4: Product Definition Section
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub template: u16,
    pub parameter_category: u8,
    pub parameter_number: u8,
    /// Forecast time in hours (end of the interval for statistical products)
    pub forecast_hour: u32,
    pub level_type: u8,
    pub level_value: f64,
}

/// Section 5: Data Representation Section
#[derive(Debug, Clone)]
pub struct DataRepresentation {
    pub num_data_points: u32,
    pub template: u16,
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
    pub original_data_type: u8,
}

/// Section 6: Bitmap Section
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub indicator: u8,
    pub data: Bytes,
}

/// Section 7: Data Section
#[derive(Debug, Clone)]
pub struct DataSection {
    pub data: Bytes,
}

/// One parsed GRIB2 message.
#[derive(Debug, Clone)]
pub struct Grib2Message {
    /// Byte offset of the message within its file
    pub offset: usize,
    pub indicator: Indicator,
    pub identification: Identification,
    pub grid_definition: GridDefinition,
    pub product_definition: ProductDefinition,
    pub data_representation: DataRepresentation,
    /// Present only when section 6 carries an explicit bitmap
    pub bitmap: Option<Bitmap>,
    pub data_section: DataSection,
    /// The complete message bytes
    pub raw: Bytes,
}

impl Grib2Message {
    pub fn length(&self) -> usize {
        self.indicator.message_length
    }

    pub fn discipline(&self) -> u8 {
        self.indicator.discipline
    }
}

/// Sequential reader over the messages of a GRIB2 file.
pub struct Grib2Reader {
    data: Bytes,
    offset: usize,
}

impl Grib2Reader {
    pub fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    /// Parse the next message, or `None` at end of data.
    pub fn next_message(&mut self) -> Result<Option<Grib2Message>, Grib2Error> {
        if self.offset >= self.data.len() {
            return Ok(None);
        }

        let (_, length) = read_indicator(&self.data, self.offset)?;
        let available = self.data.len() - self.offset;
        if length > available || length < INDICATOR_LEN + 4 {
            return Err(Grib2Error::Truncated {
                offset: self.offset,
                needed: length,
                available,
            });
        }

        let raw = self.data.slice(self.offset..self.offset + length);
        let message = parse_message(raw, self.offset)?;
        self.offset += length;
        Ok(Some(message))
    }

    /// Parse every remaining message.
    pub fn read_all(&mut self) -> Result<Vec<Grib2Message>, Grib2Error> {
        let mut messages = Vec::new();
        while let Some(message) = self.next_message()? {
            messages.push(message);
        }
        Ok(messages)
    }
}

/// Parse a complete message (section 0 through `7777`).
pub fn parse_message(raw: Bytes, offset: usize) -> Result<Grib2Message, Grib2Error> {
    let indicator = parse_indicator(&raw)?;
    if indicator.message_length != raw.len() {
        return Err(Grib2Error::InvalidFormat(format!(
            "message at offset {} declares {} bytes but spans {}",
            offset,
            indicator.message_length,
            raw.len()
        )));
    }

    let mut identification = None;
    let mut grid_definition = None;
    let mut product_definition = None;
    let mut data_representation = None;
    let mut bitmap_section: Option<(u8, Bytes)> = None;
    let mut data_section = None;

    let end = raw.len() - 4;
    let mut pos = INDICATOR_LEN;
    while pos < end {
        if pos + 5 > end {
            return Err(Grib2Error::InvalidFormat(format!(
                "dangling bytes before end marker at offset {}",
                offset + pos
            )));
        }
        let section_length = read_u32(&raw, pos) as usize;
        let number = raw[pos + 4];
        if section_length < 5 || pos + section_length > end {
            return Err(Grib2Error::InvalidSection {
                section: number,
                reason: format!("invalid section length {}", section_length),
            });
        }
        let section = &raw[pos..pos + section_length];

        match number {
            1 => identification = Some(parse_identification(section)?),
            2 => {}
            3 => grid_definition = Some(parse_grid_definition(section)?),
            4 => {
                if data_section.is_some() {
                    // Further fields in the same message
                    break;
                }
                product_definition = Some(parse_product_definition(section)?);
            }
            5 => data_representation = Some(parse_data_representation(section)?),
            6 => {
                if section.len() < 6 {
                    return Err(Grib2Error::InvalidSection {
                        section: 6,
                        reason: "section too short".to_string(),
                    });
                }
                bitmap_section = Some((section[5], raw.slice(pos + 6..pos + section_length)));
            }
            7 => data_section = Some(parse_data_section(raw.slice(pos..pos + section_length))),
            other => {
                return Err(Grib2Error::InvalidSection {
                    section: other,
                    reason: "unexpected section number".to_string(),
                })
            }
        }

        pos += section_length;
    }

    let missing = |section: u8| Grib2Error::InvalidSection {
        section,
        reason: "section missing".to_string(),
    };

    let bitmap = match bitmap_section {
        Some((0, data)) => Some(Bitmap { indicator: 0, data }),
        Some((255, _)) | None => None,
        Some((indicator, _)) => {
            return Err(Grib2Error::InvalidSection {
                section: 6,
                reason: format!("unsupported bitmap indicator {}", indicator),
            })
        }
    };

    Ok(Grib2Message {
        offset,
        indicator,
        identification: identification.ok_or_else(|| missing(1))?,
        grid_definition: grid_definition.ok_or_else(|| missing(3))?,
        product_definition: product_definition.ok_or_else(|| missing(4))?,
        data_representation: data_representation.ok_or_else(|| missing(5))?,
        bitmap,
        data_section: data_section.ok_or_else(|| missing(7))?,
        raw,
    })
}

// ===== Parsing Functions =====

/// Parse Section 0 (Indicator) from the start of a message.
pub fn parse_indicator(data: &[u8]) -> Result<Indicator, Grib2Error> {
    let (discipline, message_length) = read_indicator(data, 0)?;
    Ok(Indicator {
        discipline,
        edition: 2,
        message_length,
    })
}

/// Parse Section 1 (Identification).
pub fn parse_identification(section: &[u8]) -> Result<Identification, Grib2Error> {
    if section.len() < 21 {
        return Err(Grib2Error::InvalidSection {
            section: 1,
            reason: format!("need 21 bytes, got {}", section.len()),
        });
    }

    let year = u16::from_be_bytes([section[12], section[13]]);
    let (month, day, hour, minute, second) =
        (section[14], section[15], section[16], section[17], section[18]);

    let reference_time = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or_else(|| Grib2Error::InvalidSection {
            section: 1,
            reason: format!(
                "invalid date: {}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ),
        })?;

    Ok(Identification {
        center: u16::from_be_bytes([section[5], section[6]]),
        sub_center: u16::from_be_bytes([section[7], section[8]]),
        table_version: section[9],
        local_table_version: section[10],
        significance_of_reference_time: section[11],
        reference_time: DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc),
        production_status: section[19],
        data_type: section[20],
    })
}

/// Parse Section 3 (Grid Definition).
///
/// Only template 3.0 carries coordinates; other templates keep their
/// dimensions so the message can still be indexed.
pub fn parse_grid_definition(section: &[u8]) -> Result<GridDefinition, Grib2Error> {
    if section.len() < 14 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: format!("need at least 14 bytes, got {}", section.len()),
        });
    }

    let num_data_points = read_u32(section, 6);
    let template = u16::from_be_bytes([section[12], section[13]]);

    if template != 0 {
        return Ok(GridDefinition {
            template,
            num_data_points,
            earth_shape: section.get(14).copied().unwrap_or(255),
            ni: 0,
            nj: 0,
            first_latitude: 0.0,
            first_longitude: 0.0,
            last_latitude: 0.0,
            last_longitude: 0.0,
            i_increment: 0.0,
            j_increment: 0.0,
            scanning_mode: 0,
        });
    }

    if section.len() < 72 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: format!("template 3.0 needs 72 bytes, got {}", section.len()),
        });
    }

    let ni = read_u32(section, 30);
    let nj = read_u32(section, 34);
    let basic_angle = read_u32(section, 38);
    let subdivisions = read_u32(section, 42);

    // Angles are in microdegrees unless a basic angle is given
    let unit = if basic_angle == 0 || basic_angle == MISSING_U32 || subdivisions == 0
        || subdivisions == MISSING_U32
    {
        1e-6
    } else {
        basic_angle as f64 / subdivisions as f64
    };

    Ok(GridDefinition {
        template,
        num_data_points,
        earth_shape: section[14],
        ni,
        nj,
        first_latitude: read_signed_u32(section, 46) as f64 * unit,
        first_longitude: read_signed_u32(section, 50) as f64 * unit,
        last_latitude: read_signed_u32(section, 55) as f64 * unit,
        last_longitude: read_signed_u32(section, 59) as f64 * unit,
        i_increment: read_u32(section, 63) as f64 * unit,
        j_increment: read_u32(section, 67) as f64 * unit,
        scanning_mode: section[71],
    })
}

/// Parse Section 4 (Product Definition).
///
/// Templates 4.0 through 4.15 share the layout of the fields read here.
pub fn parse_product_definition(section: &[u8]) -> Result<ProductDefinition, Grib2Error> {
    if section.len() < 11 {
        return Err(Grib2Error::InvalidSection {
            section: 4,
            reason: format!("need at least 11 bytes, got {}", section.len()),
        });
    }

    let template = u16::from_be_bytes([section[7], section[8]]);
    let parameter_category = section[9];
    let parameter_number = section[10];

    if template > 15 || section.len() < 28 {
        return Ok(ProductDefinition {
            template,
            parameter_category,
            parameter_number,
            forecast_hour: 0,
            level_type: 255,
            level_value: 0.0,
        });
    }

    let unsupported_unit = |unit: u8| Grib2Error::InvalidSection {
        section: 4,
        reason: format!("unsupported time range unit {}", unit),
    };

    let time_unit = section[17];
    let mut forecast_hour = forecast_time_to_hours(time_unit, read_u32(section, 18))
        .ok_or_else(|| unsupported_unit(time_unit))?;

    // Template 4.8 (statistical over an interval): report the interval end
    if template == 8 && section.len() >= 53 {
        let range_unit = section[48];
        forecast_hour += forecast_time_to_hours(range_unit, read_u32(section, 49))
            .ok_or_else(|| unsupported_unit(range_unit))?;
    }

    let level_type = section[22];
    let scale_factor = sign_magnitude_i8(section[23]);
    let scaled_value = read_u32(section, 24);
    let level_value = if scaled_value == MISSING_U32 || level_type == 255 {
        0.0
    } else {
        scaled_value as f64 / 10f64.powi(scale_factor as i32)
    };

    Ok(ProductDefinition {
        template,
        parameter_category,
        parameter_number,
        forecast_hour,
        level_type,
        level_value,
    })
}

/// Parse Section 5 (Data Representation).
pub fn parse_data_representation(section: &[u8]) -> Result<DataRepresentation, Grib2Error> {
    if section.len() < 21 {
        return Err(Grib2Error::InvalidSection {
            section: 5,
            reason: format!("need 21 bytes, got {}", section.len()),
        });
    }

    // Templates 5.0, 5.2, 5.3, 5.40 and 5.41 start with the same fields
    Ok(DataRepresentation {
        num_data_points: read_u32(section, 5),
        template: u16::from_be_bytes([section[9], section[10]]),
        reference_value: f32::from_be_bytes([section[11], section[12], section[13], section[14]]),
        binary_scale_factor: sign_magnitude_i16(section[15], section[16]),
        decimal_scale_factor: sign_magnitude_i16(section[17], section[18]),
        bits_per_value: section[19],
        original_data_type: section[20],
    })
}

/// Parse Section 7 (Data).
pub fn parse_data_section(section: Bytes) -> DataSection {
    DataSection {
        data: section.slice(5..),
    }
}

// ===== Helper Functions =====

fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

/// GRIB2 signed integers use a sign bit, not two's complement.
fn read_signed_u32(data: &[u8], pos: usize) -> i64 {
    let raw = read_u32(data, pos);
    let magnitude = (raw & 0x7FFF_FFFF) as i64;
    if raw & 0x8000_0000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn sign_magnitude_i16(hi: u8, lo: u8) -> i16 {
    let raw = u16::from_be_bytes([hi, lo]);
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn sign_magnitude_i8(raw: u8) -> i8 {
    let magnitude = (raw & 0x7F) as i8;
    if raw & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Convert a forecast time to hours (GRIB2 Code Table 4.4).
fn forecast_time_to_hours(unit: u8, value: u32) -> Option<u32> {
    match unit {
        0 => Some(value / 60),
        1 => Some(value),
        2 => Some(value * 24),
        10 => Some(value * 3),
        11 => Some(value * 6),
        12 => Some(value * 12),
        13 => Some(value / 3600),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_magnitude() {
        assert_eq!(sign_magnitude_i16(0x80, 0x02), -2);
        assert_eq!(sign_magnitude_i16(0x00, 0x02), 2);
        assert_eq!(sign_magnitude_i8(0x81), -1);
        assert_eq!(read_signed_u32(&[0x85, 0x5D, 0x4A, 0x80], 0), -90_000_000);
    }

    #[test]
    fn test_forecast_time_units() {
        assert_eq!(forecast_time_to_hours(1, 6), Some(6));
        assert_eq!(forecast_time_to_hours(2, 1), Some(24));
        assert_eq!(forecast_time_to_hours(0, 360), Some(6));
        assert_eq!(forecast_time_to_hours(99, 1), None);
    }

    #[test]
    fn test_identification_rejects_bad_date() {
        let mut section = vec![0u8; 21];
        section[3] = 21;
        section[4] = 1;
        section[12..14].copy_from_slice(&2026u16.to_be_bytes());
        section[14] = 13;
        section[15] = 1;
        assert!(parse_identification(&section).is_err());

        section[14] = 1;
        let id = parse_identification(&section).unwrap();
        assert_eq!(id.reference_time.to_rfc3339(), "2026-01-01T00:00:00+00:00");
    }
}
