//! Decoding named fields from a grid file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use forecast_common::{Field, ForecastHour};
use tracing::{debug, warn};

use crate::catalog::{CatalogEntry, FieldCatalog, FieldSource};
use crate::error::{DecodeError, Grib2Error};
use crate::framing::validate_framing;
use crate::index::MessageIndex;
use crate::sections::{Grib2Message, Grib2Reader};
use crate::tables::Grib2Tables;
use crate::unpacking::unpack_message;

/// Fields decoded from one grid file.
#[derive(Debug)]
pub struct DecodedFile {
    pub path: PathBuf,
    /// Decoded fields by catalogue name
    pub fields: BTreeMap<String, Field>,
    /// Requested fields absent from the file
    pub missing: Vec<String>,
}

impl DecodedFile {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Fail with `FieldNotFound` for the first missing field.
    pub fn require_all(&self) -> Result<(), DecodeError> {
        match self.missing.first() {
            Some(field) => Err(DecodeError::FieldNotFound {
                field: field.clone(),
                path: self.path.display().to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Decode `field_names` from the GRIB2 file at `path`.
///
/// Any framing, section or unpacking failure yields
/// [`DecodeError::CorruptFile`]; requested fields that are simply not in the
/// file are listed in [`DecodedFile::missing`].
pub fn decode<S: AsRef<str>>(
    path: &Path,
    field_names: &[S],
    catalog: &FieldCatalog,
) -> Result<DecodedFile, DecodeError> {
    let path_str = path.display().to_string();
    let corrupt = |source: Grib2Error| DecodeError::CorruptFile {
        path: path_str.clone(),
        source,
    };

    // Validate names before touching the file
    for name in field_names {
        catalog.lookup(name.as_ref())?;
    }

    let data = std::fs::read(path).map_err(|source| DecodeError::Io {
        path: path_str.clone(),
        source,
    })?;
    validate_framing(&data).map_err(corrupt)?;

    let messages = Grib2Reader::new(Bytes::from(data))
        .read_all()
        .map_err(corrupt)?;
    let index = MessageIndex::from_messages(&messages);
    debug!(path = %path_str, messages = index.len(), "Indexed grid file");

    let mut decoder = FileDecoder {
        catalog,
        messages: &messages,
        index: &index,
        tables: Grib2Tables::ncep(),
        components: BTreeMap::new(),
    };

    let mut fields = BTreeMap::new();
    let mut missing = Vec::new();

    for name in field_names {
        let name = name.as_ref();
        let entry = catalog.lookup(name)?;
        match decoder.field(entry).map_err(corrupt)? {
            Some(field) => {
                fields.insert(name.to_string(), field);
            }
            None => {
                warn!(path = %path_str, field = name, "Field not found in grid file");
                missing.push(name.to_string());
            }
        }
    }

    Ok(DecodedFile {
        path: path.to_path_buf(),
        fields,
        missing,
    })
}

struct FileDecoder<'a> {
    catalog: &'a FieldCatalog,
    messages: &'a [Grib2Message],
    index: &'a MessageIndex,
    tables: Grib2Tables,
    /// Decoded GRIB2-backed fields, reused by derived fields
    components: BTreeMap<&'static str, Option<Field>>,
}

impl<'a> FileDecoder<'a> {
    fn field(&mut self, entry: &CatalogEntry) -> Result<Option<Field>, Grib2Error> {
        match &entry.source {
            FieldSource::Grib { .. } => self.component(entry),
            FieldSource::WindSpeed { u, v } => {
                let catalog = self.catalog;
                let (Some(u_entry), Some(v_entry)) = (catalog.get(u), catalog.get(v))
                else {
                    return Ok(None);
                };
                let (Some(u), Some(v)) = (self.component(u_entry)?, self.component(v_entry)?)
                else {
                    return Ok(None);
                };
                wind_speed(entry, &u, &v).map(Some)
            }
        }
    }

    fn component(&mut self, entry: &CatalogEntry) -> Result<Option<Field>, Grib2Error> {
        if let Some(cached) = self.components.get(entry.name) {
            return Ok(cached.clone());
        }
        let decoded = self.decode_message(entry)?;
        self.components.insert(entry.name, decoded.clone());
        Ok(decoded)
    }

    fn decode_message(&self, entry: &CatalogEntry) -> Result<Option<Field>, Grib2Error> {
        let FieldSource::Grib { id, conversion } = &entry.source else {
            return Ok(None);
        };

        let Some(position) = self.index.position(|record| id.matches(record)) else {
            return Ok(None);
        };
        let message = &self.messages[position];
        let record = &self.index.records()[position];

        let grid = message.grid_definition.to_grid_spec()?;
        let raw_values = unpack_message(message)?;
        let mut values = grid.scan_mode.normalize(&raw_values, grid.nx, grid.ny)?;
        for v in values.iter_mut() {
            *v = conversion.apply(*v);
        }

        let forecast_hour = u16::try_from(record.forecast_hour).map_err(|_| {
            Grib2Error::InvalidSection {
                section: 4,
                reason: format!("forecast hour {} out of range", record.forecast_hour),
            }
        })?;

        debug!(
            field = entry.name,
            key = %record.inventory_key(&self.tables),
            offset = record.offset,
            packing = record.packing_template,
            "Decoded field"
        );

        Ok(Some(Field::new(
            entry.name,
            entry.units,
            entry.description,
            message.identification.reference_time,
            ForecastHour::new(forecast_hour),
            grid.normalized(),
            values,
        )?))
    }
}

fn wind_speed(entry: &CatalogEntry, u: &Field, v: &Field) -> Result<Field, Grib2Error> {
    if u.grid != v.grid {
        return Err(Grib2Error::InvalidFormat(format!(
            "{} and {} are on different grids",
            u.name, v.name
        )));
    }

    let values = u
        .values
        .iter()
        .zip(&v.values)
        .map(|(a, b)| (a * a + b * b).sqrt())
        .collect();

    Ok(Field::new(
        entry.name,
        entry.units,
        entry.description,
        u.reference_time,
        u.forecast_hour,
        u.grid,
        values,
    )?)
}
