//! Field catalogue: the named fields the pipeline can decode.
//!
//! Each entry maps a short field name (`t2m`, `prmsl`, ...) to the GRIB2
//! identity of its message, the unit conversion applied after unpacking,
//! and the units/description carried on the decoded [`forecast_common::Field`].
//! Derived fields name the catalogue entries they are computed from.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::index::MessageRecord;
use crate::tables::Grib2Tables;

/// Canonical identity of a GRIB2 field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldId {
    pub discipline: u8,
    pub category: u8,
    pub number: u8,
    pub level_type: u8,
    pub level_value: f64,
}

impl FieldId {
    pub const fn new(discipline: u8, category: u8, number: u8, level_type: u8, level_value: f64) -> Self {
        Self {
            discipline,
            category,
            number,
            level_type,
            level_value,
        }
    }

    pub fn matches(&self, record: &MessageRecord) -> bool {
        self.discipline == record.discipline
            && self.category == record.category
            && self.number == record.number
            && self.level_type == record.level_type
            && (self.level_value - record.level_value).abs() < 1e-6
    }

    /// The `PARAM:level` pair an `.idx` inventory lists for this field.
    pub fn inventory_key(&self, tables: &Grib2Tables) -> InventoryKey {
        InventoryKey {
            param: tables.parameter_name(self.discipline, self.category, self.number),
            level: tables.level_description(self.level_type, self.level_value),
        }
    }
}

/// Variable and level columns of an inventory line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InventoryKey {
    pub param: String,
    pub level: String,
}

impl fmt::Display for InventoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.param, self.level)
    }
}

/// Conversion applied to unpacked values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitConversion {
    None,
    KelvinToCelsius,
    PascalToHectopascal,
}

impl UnitConversion {
    pub fn apply(&self, value: f32) -> f32 {
        match self {
            UnitConversion::None => value,
            UnitConversion::KelvinToCelsius => value - 273.15,
            UnitConversion::PascalToHectopascal => value / 100.0,
        }
    }
}

/// Where a field's values come from.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSource {
    /// A single GRIB2 message
    Grib {
        id: FieldId,
        conversion: UnitConversion,
    },
    /// Vector magnitude of two other catalogue fields
    WindSpeed { u: &'static str, v: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub description: &'static str,
    /// Units after conversion
    pub units: &'static str,
    pub source: FieldSource,
    /// Accumulated over the forecast interval, so absent from analysis files
    pub accumulated: bool,
}

/// Immutable table of decodable fields, keyed by name.
#[derive(Debug, Clone)]
pub struct FieldCatalog {
    entries: BTreeMap<&'static str, CatalogEntry>,
}

impl FieldCatalog {
    /// Surface fields of the AIGFS `sfc` files.
    pub fn aigfs() -> Self {
        let entries = [
            CatalogEntry {
                name: "t2m",
                description: "Temperature (2m)",
                units: "°C",
                source: FieldSource::Grib {
                    id: FieldId::new(0, 0, 0, 103, 2.0),
                    conversion: UnitConversion::KelvinToCelsius,
                },
                accumulated: false,
            },
            CatalogEntry {
                name: "u10",
                description: "U Wind (10m)",
                units: "m/s",
                source: FieldSource::Grib {
                    id: FieldId::new(0, 2, 2, 103, 10.0),
                    conversion: UnitConversion::None,
                },
                accumulated: false,
            },
            CatalogEntry {
                name: "v10",
                description: "V Wind (10m)",
                units: "m/s",
                source: FieldSource::Grib {
                    id: FieldId::new(0, 2, 3, 103, 10.0),
                    conversion: UnitConversion::None,
                },
                accumulated: false,
            },
            CatalogEntry {
                name: "prmsl",
                description: "MSL Pressure",
                units: "hPa",
                source: FieldSource::Grib {
                    id: FieldId::new(0, 3, 1, 101, 0.0),
                    conversion: UnitConversion::PascalToHectopascal,
                },
                accumulated: false,
            },
            CatalogEntry {
                name: "tp",
                description: "Total Precipitation",
                units: "mm",
                source: FieldSource::Grib {
                    id: FieldId::new(0, 1, 8, 1, 0.0),
                    conversion: UnitConversion::None,
                },
                accumulated: true,
            },
            CatalogEntry {
                name: "wind10",
                description: "Wind Speed (10m)",
                units: "m/s",
                source: FieldSource::WindSpeed { u: "u10", v: "v10" },
                accumulated: false,
            },
        ];

        Self {
            entries: entries.into_iter().map(|e| (e.name, e)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    pub fn lookup(&self, name: &str) -> Result<&CatalogEntry, DecodeError> {
        self.get(name)
            .ok_or_else(|| DecodeError::UnknownField(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// The GRIB2-backed entries needed to produce `names`, derived fields
    /// expanded into their components. Sorted and deduplicated.
    pub fn grib_components<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&CatalogEntry>, DecodeError> {
        let mut component_names = BTreeSet::new();
        for name in names {
            let entry = self.lookup(name.as_ref())?;
            match &entry.source {
                FieldSource::Grib { .. } => {
                    component_names.insert(entry.name);
                }
                FieldSource::WindSpeed { u, v } => {
                    component_names.insert(self.lookup(u)?.name);
                    component_names.insert(self.lookup(v)?.name);
                }
            }
        }
        component_names.into_iter().map(|n| self.lookup(n)).collect()
    }

    /// Inventory keys an `.idx` file must list for `names` to be decodable.
    pub fn inventory_keys<S: AsRef<str>>(
        &self,
        names: &[S],
        tables: &Grib2Tables,
    ) -> Result<BTreeSet<InventoryKey>, DecodeError> {
        Ok(self
            .grib_components(names)?
            .into_iter()
            .filter_map(|entry| match &entry.source {
                FieldSource::Grib { id, .. } => Some(id.inventory_key(tables)),
                FieldSource::WindSpeed { .. } => None,
            })
            .collect())
    }

    /// Inventory keys the analysis (`f000`) inventory must list for
    /// `names`; accumulated fields only appear from the first forecast step.
    pub fn analysis_inventory_keys<S: AsRef<str>>(
        &self,
        names: &[S],
        tables: &Grib2Tables,
    ) -> Result<BTreeSet<InventoryKey>, DecodeError> {
        Ok(self
            .grib_components(names)?
            .into_iter()
            .filter(|entry| !entry.accumulated)
            .filter_map(|entry| match &entry.source {
                FieldSource::Grib { id, .. } => Some(id.inventory_key(tables)),
                FieldSource::WindSpeed { .. } => None,
            })
            .collect())
    }
}

impl Default for FieldCatalog {
    fn default() -> Self {
        Self::aigfs()
    }
}
