//! GRIB2 parameter and level names.
//!
//! Translates numeric codes into the short names and level strings used in
//! NOMADS `.idx` inventories (`TMP`, `2 m above ground`, ...), so messages
//! can be matched against an inventory and logged readably.

use std::collections::HashMap;

/// Lookup key for parameter: (discipline, category, number)
pub type ParamKey = (u8, u8, u8);

/// Level description - either static text or a template with {value} placeholder
#[derive(Debug, Clone)]
pub enum LevelDescription {
    /// Static description (e.g., "surface", "mean sea level")
    Static(&'static str),
    /// Template with `{value}` or `{value_mb}` placeholder
    Template(&'static str),
}

impl LevelDescription {
    pub fn format(&self, value: f64) -> String {
        match self {
            LevelDescription::Static(s) => s.to_string(),
            LevelDescription::Template(t) => t
                .replace("{value_mb}", &format_number(value / 100.0))
                .replace("{value}", &format_number(value)),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// GRIB2 parameter and level lookup tables.
#[derive(Debug, Clone, Default)]
pub struct Grib2Tables {
    parameters: HashMap<ParamKey, &'static str>,
    levels: HashMap<u8, LevelDescription>,
}

impl Grib2Tables {
    pub fn new() -> Self {
        Self::default()
    }

    /// NCEP names for the surface products found in AIGFS/GFS files.
    pub fn ncep() -> Self {
        let mut tables = Self::new();

        for (key, name) in [
            ((0, 0, 0), "TMP"),
            ((0, 0, 6), "DPT"),
            ((0, 1, 1), "RH"),
            ((0, 1, 3), "PWAT"),
            ((0, 1, 8), "APCP"),
            ((0, 2, 2), "UGRD"),
            ((0, 2, 3), "VGRD"),
            ((0, 2, 8), "VVEL"),
            ((0, 3, 0), "PRES"),
            ((0, 3, 1), "PRMSL"),
            ((0, 3, 5), "HGT"),
            ((0, 1, 0), "SPFH"),
            ((0, 2, 22), "GUST"),
            ((0, 6, 1), "TCDC"),
            ((0, 7, 6), "CAPE"),
        ] {
            tables.add_parameter(key, name);
        }

        tables.add_level(1, LevelDescription::Static("surface"));
        tables.add_level(100, LevelDescription::Template("{value_mb} mb"));
        tables.add_level(101, LevelDescription::Static("mean sea level"));
        tables.add_level(102, LevelDescription::Template("{value} m above mean sea level"));
        tables.add_level(103, LevelDescription::Template("{value} m above ground"));
        tables.add_level(200, LevelDescription::Static("entire atmosphere"));

        tables
    }

    pub fn add_parameter(&mut self, key: ParamKey, name: &'static str) {
        self.parameters.insert(key, name);
    }

    pub fn add_level(&mut self, level_type: u8, description: LevelDescription) {
        self.levels.insert(level_type, description);
    }

    /// Short name, or "var discipline=D category=C number=N" as wgrib2 prints
    /// unknown parameters.
    pub fn parameter_name(&self, discipline: u8, category: u8, number: u8) -> String {
        self.parameters
            .get(&(discipline, category, number))
            .map(|name| name.to_string())
            .unwrap_or_else(|| {
                format!(
                    "var discipline={} category={} number={}",
                    discipline, category, number
                )
            })
    }

    pub fn level_description(&self, level_type: u8, level_value: f64) -> String {
        match self.levels.get(&level_type) {
            Some(desc) => desc.format(level_value),
            None => format!("level type {} value {}", level_type, format_number(level_value)),
        }
    }
}
