//! GRIB2 data unpacking.
//!
//! Simple packing (template 5.0) with an optional bitmap is unpacked here.
//! Complex packing, spatial differencing, JPEG2000 and PNG packings are
//! handed to the `grib` crate, which decodes the complete message.

use std::io::Cursor;

use tracing::debug;

use crate::error::Grib2Error;
use crate::sections::{DataRepresentation, Grib2Message, GridDefinition};

/// Largest grid accepted for unpacking. A 0.25 degree global grid has
/// about 1.04 million points.
pub const MAX_GRID_POINTS: usize = 1 << 24;

/// Point count declared by section 3, checked against the grid dimensions
/// and [`MAX_GRID_POINTS`] before anything is allocated.
pub fn checked_point_count(grid: &GridDefinition) -> Result<usize, Grib2Error> {
    let total = grid.num_data_points as usize;
    if grid.template == 0 {
        let dims = grid.ni as u64 * grid.nj as u64;
        if dims != grid.num_data_points as u64 {
            return Err(Grib2Error::UnpackingError(format!(
                "grid declares {} points but is {}x{}",
                grid.num_data_points, grid.ni, grid.nj
            )));
        }
    }
    if total > MAX_GRID_POINTS {
        return Err(Grib2Error::UnpackingError(format!(
            "grid of {} points exceeds limit of {}",
            total, MAX_GRID_POINTS
        )));
    }
    Ok(total)
}

/// Unpack a message into one value per grid point, in storage order.
/// Points masked out by the bitmap are `NaN`.
pub fn unpack_message(message: &Grib2Message) -> Result<Vec<f32>, Grib2Error> {
    let total = checked_point_count(&message.grid_definition)?;

    match message.data_representation.template {
        0 => unpack_simple(
            &message.data_section.data,
            &message.data_representation,
            message.bitmap.as_ref().map(|b| b.data.as_ref()),
            total,
        ),
        template => {
            debug!(
                template = template,
                offset = message.offset,
                "Unpacking with grib crate"
            );
            unpack_with_grib_crate(&message.raw, total)
        }
    }
}

/// Unpack simple packed data.
///
/// value = (R + X * 2^E) / 10^D
pub fn unpack_simple(
    packed_data: &[u8],
    repr: &DataRepresentation,
    bitmap: Option<&[u8]>,
    total_points: usize,
) -> Result<Vec<f32>, Grib2Error> {
    let packed_points = repr.num_data_points as usize;

    if total_points > MAX_GRID_POINTS || packed_points > total_points {
        return Err(Grib2Error::UnpackingError(format!(
            "{} packed values for {} grid points (limit {})",
            packed_points, total_points, MAX_GRID_POINTS
        )));
    }

    if let Some(bm) = bitmap {
        if bm.len() * 8 < total_points {
            return Err(Grib2Error::UnpackingError(format!(
                "bitmap covers {} points, grid has {}",
                bm.len() * 8,
                total_points
            )));
        }
        let present = (0..total_points).filter(|&i| bitmap_bit(bm, i)).count();
        if present != packed_points {
            return Err(Grib2Error::UnpackingError(format!(
                "bitmap marks {} points present, section 5 declares {}",
                present, packed_points
            )));
        }
    } else if packed_points != total_points {
        return Err(Grib2Error::UnpackingError(format!(
            "{} packed values for {} grid points",
            packed_points, total_points
        )));
    }

    let bits = repr.bits_per_value as usize;
    if bits > 32 {
        return Err(Grib2Error::UnpackingError(format!(
            "invalid bits per value: {}",
            bits
        )));
    }
    let needed_bytes = (packed_points * bits).div_ceil(8);
    if packed_data.len() < needed_bytes {
        return Err(Grib2Error::UnpackingError(format!(
            "data section holds {} bytes, {} needed",
            packed_data.len(),
            needed_bytes
        )));
    }

    let reference = repr.reference_value as f64;
    let binary_scale = 2f64.powi(repr.binary_scale_factor as i32);
    let decimal_scale = 10f64.powi(-(repr.decimal_scale_factor as i32));

    let mut reader = BitReader::new(packed_data);
    let mut values = Vec::with_capacity(total_points);
    for i in 0..total_points {
        if let Some(bm) = bitmap {
            if !bitmap_bit(bm, i) {
                values.push(f32::NAN);
                continue;
            }
        }
        let packed = if bits == 0 { 0 } else { reader.read(bits) };
        values.push(((reference + packed as f64 * binary_scale) * decimal_scale) as f32);
    }

    Ok(values)
}

/// Decode a complete message with the `grib` crate.
pub fn unpack_with_grib_crate(raw: &[u8], total_points: usize) -> Result<Vec<f32>, Grib2Error> {
    let grib2 = grib::from_reader(Cursor::new(raw))
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate could not read message: {:?}", e)))?;

    let (_, submessage) = grib2
        .iter()
        .next()
        .ok_or_else(|| Grib2Error::UnpackingError("grib crate found no submessage".to_string()))?;

    let decoder = grib::Grib2SubmessageDecoder::from(submessage)
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate decoder: {:?}", e)))?;
    let values: Vec<f32> = decoder
        .dispatch()
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate dispatch: {:?}", e)))?
        .collect();

    if values.len() != total_points {
        return Err(Grib2Error::UnpackingError(format!(
            "grib crate produced {} values for {} grid points",
            values.len(),
            total_points
        )));
    }
    Ok(values)
}

fn bitmap_bit(bitmap: &[u8], i: usize) -> bool {
    (bitmap[i / 8] >> (7 - (i % 8))) & 1 == 1
}

/// MSB-first bit reader. Callers check the data length up front.
struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    fn read(&mut self, num_bits: usize) -> u32 {
        let mut result = 0u64;
        let mut remaining = num_bits;
        while remaining > 0 {
            let byte = self.data[self.bit_pos / 8];
            let bit_offset = self.bit_pos % 8;
            let take = remaining.min(8 - bit_offset);
            let shift = 8 - bit_offset - take;
            let bits = (byte >> shift) & ((1u16 << take) - 1) as u8;
            result = (result << take) | bits as u64;
            self.bit_pos += take;
            remaining -= take;
        }
        result as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repr(points: u32, bits: u8, reference: f32, e: i16, d: i16) -> DataRepresentation {
        DataRepresentation {
            num_data_points: points,
            template: 0,
            reference_value: reference,
            binary_scale_factor: e,
            decimal_scale_factor: d,
            bits_per_value: bits,
            original_data_type: 0,
        }
    }

    #[test]
    fn test_bit_reader() {
        let data = [0b1011_0101, 0b1100_0000];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read(2), 0b10);
        assert_eq!(reader.read(2), 0b11);
        assert_eq!(reader.read(6), 0b0101_11);
    }

    #[test]
    fn test_simple_unpacking() {
        let values = unpack_simple(&[100, 200], &repr(2, 8, 0.0, 0, 0), None, 2).unwrap();
        assert_eq!(values, vec![100.0, 200.0]);
    }

    #[test]
    fn test_scale_factors() {
        // (10 + 3 * 2^1) / 10^1 = 1.6
        let values = unpack_simple(&[3], &repr(1, 8, 10.0, 1, 1), None, 1).unwrap();
        assert!((values[0] - 1.6).abs() < 1e-6);
    }

    #[test]
    fn test_constant_field() {
        let values = unpack_simple(&[], &repr(4, 0, 288.15, 0, 0), None, 4).unwrap();
        assert!(values.iter().all(|v| (*v - 288.15).abs() < 1e-4));
    }

    #[test]
    fn test_bitmap_marks_missing_points() {
        // Points 0 and 2 present, 1 and 3 missing
        let bitmap = [0b1010_0000];
        let values = unpack_simple(&[7, 9], &repr(2, 8, 0.0, 0, 0), Some(&bitmap), 4).unwrap();
        assert_eq!(values[0], 7.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 9.0);
        assert!(values[3].is_nan());
    }

    #[test]
    fn test_short_data_is_an_error() {
        assert!(unpack_simple(&[1], &repr(2, 8, 0.0, 0, 0), None, 2).is_err());
        assert!(unpack_simple(&[1, 2], &repr(2, 8, 0.0, 0, 0), None, 3).is_err());
    }

    fn grid(ni: u32, nj: u32, points: u32) -> GridDefinition {
        GridDefinition {
            template: 0,
            num_data_points: points,
            earth_shape: 6,
            ni,
            nj,
            first_latitude: 90.0,
            first_longitude: 0.0,
            last_latitude: -90.0,
            last_longitude: 359.75,
            i_increment: 0.25,
            j_increment: 0.25,
            scanning_mode: 0,
        }
    }

    #[test]
    fn test_point_count_matches_dimensions() {
        assert_eq!(checked_point_count(&grid(1440, 721, 1_038_240)).unwrap(), 1_038_240);
        assert!(checked_point_count(&grid(1440, 721, 4)).is_err());
    }

    #[test]
    fn test_oversized_grid_is_rejected() {
        assert!(checked_point_count(&grid(65_536, 65_536, u32::MAX)).is_err());
        let square = 1u32 << 13;
        assert!(checked_point_count(&grid(square, square, square * square)).is_err());
    }

    #[test]
    fn test_constant_field_of_huge_size_is_rejected() {
        // Zero bits per value needs no data bytes, so only the cap stops it
        let huge = MAX_GRID_POINTS as u32 + 1;
        assert!(unpack_simple(&[], &repr(huge, 0, 0.0, 0, 0), None, huge as usize).is_err());
    }
}
