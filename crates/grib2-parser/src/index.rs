//! Message index of a GRIB2 file and `.idx` inventory parsing.
//!
//! The message index is built from the parsed messages and is what the
//! decoder searches. Inventories are the text files NOMADS publishes next
//! to each GRIB2 file (`1:0:d=2026010300:TMP:2 m above ground:anl:`); the
//! run resolver validates them before trusting a run.

use std::collections::BTreeSet;

use crate::catalog::InventoryKey;
use crate::error::Grib2Error;
use crate::sections::Grib2Message;
use crate::tables::Grib2Tables;

/// Identity and location of one message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub offset: usize,
    pub length: usize,
    pub discipline: u8,
    pub category: u8,
    pub number: u8,
    pub level_type: u8,
    pub level_value: f64,
    pub forecast_hour: u32,
    pub packing_template: u16,
}

impl MessageRecord {
    pub fn from_message(message: &Grib2Message) -> Self {
        let product = &message.product_definition;
        Self {
            offset: message.offset,
            length: message.length(),
            discipline: message.discipline(),
            category: product.parameter_category,
            number: product.parameter_number,
            level_type: product.level_type,
            level_value: product.level_value,
            forecast_hour: product.forecast_hour,
            packing_template: message.data_representation.template,
        }
    }

    pub fn inventory_key(&self, tables: &Grib2Tables) -> InventoryKey {
        InventoryKey {
            param: tables.parameter_name(self.discipline, self.category, self.number),
            level: tables.level_description(self.level_type, self.level_value),
        }
    }
}

/// Ordered index over the messages of one file.
#[derive(Debug, Clone, Default)]
pub struct MessageIndex {
    records: Vec<MessageRecord>,
}

impl MessageIndex {
    pub fn from_messages(messages: &[Grib2Message]) -> Self {
        Self {
            records: messages.iter().map(MessageRecord::from_message).collect(),
        }
    }

    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Position of the first record satisfying `pred`.
    pub fn position(&self, pred: impl Fn(&MessageRecord) -> bool) -> Option<usize> {
        self.records.iter().position(pred)
    }
}

/// One line of an `.idx` inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    /// Message number (`3` or `3.2` for submessages)
    pub number: String,
    pub offset: u64,
    /// Reference time as `YYYYMMDDHH`
    pub date: String,
    pub param: String,
    pub level: String,
    pub forecast: String,
}

impl InventoryEntry {
    pub fn key(&self) -> InventoryKey {
        InventoryKey {
            param: self.param.clone(),
            level: self.level.clone(),
        }
    }
}

/// A parsed `.idx` inventory.
#[derive(Debug, Clone)]
pub struct Inventory {
    entries: Vec<InventoryEntry>,
}

impl Inventory {
    /// Parse inventory text. Every non-empty line must have the
    /// `n:offset:d=YYYYMMDDHH:PARAM:level:forecast:` shape and offsets must
    /// not decrease.
    pub fn parse(text: &str) -> Result<Self, Grib2Error> {
        let mut entries: Vec<InventoryEntry> = Vec::new();

        for (i, line) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let invalid = |reason: &str| Grib2Error::InvalidInventory {
                line: line_no,
                reason: reason.to_string(),
            };

            let parts: Vec<&str> = line.splitn(6, ':').collect();
            if parts.len() < 6 {
                return Err(invalid("expected at least six ':'-separated columns"));
            }

            let number = parts[0];
            let valid_number = !number.is_empty()
                && number.split('.').all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
            if !valid_number {
                return Err(invalid("message number is not numeric"));
            }

            let offset: u64 = parts[1]
                .parse()
                .map_err(|_| invalid("byte offset is not numeric"))?;
            if let Some(prev) = entries.last() {
                if offset < prev.offset {
                    return Err(invalid("byte offsets decrease"));
                }
            }

            let date = parts[2]
                .strip_prefix("d=")
                .filter(|d| d.len() == 10 && d.bytes().all(|b| b.is_ascii_digit()))
                .ok_or_else(|| invalid("reference date is not d=YYYYMMDDHH"))?;

            if parts[3].is_empty() {
                return Err(invalid("variable name is empty"));
            }

            entries.push(InventoryEntry {
                number: number.to_string(),
                offset,
                date: date.to_string(),
                param: parts[3].to_string(),
                level: parts[4].to_string(),
                forecast: parts[5].trim_end_matches(':').to_string(),
            });
        }

        if entries.is_empty() {
            return Err(Grib2Error::InvalidInventory {
                line: 0,
                reason: "inventory is empty".to_string(),
            });
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[InventoryEntry] {
        &self.entries
    }

    /// The single reference date shared by every line, if consistent.
    pub fn reference_date(&self) -> Option<&str> {
        let first = self.entries.first()?.date.as_str();
        self.entries
            .iter()
            .all(|e| e.date == first)
            .then_some(first)
    }

    pub fn keys(&self) -> BTreeSet<InventoryKey> {
        self.entries.iter().map(InventoryEntry::key).collect()
    }

    pub fn contains(&self, key: &InventoryKey) -> bool {
        self.entries
            .iter()
            .any(|e| e.param == key.param && e.level == key.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
1:0:d=2026010300:PRMSL:mean sea level:anl:
2:1043:d=2026010300:TMP:2 m above ground:anl:
3:2210:d=2026010300:UGRD:10 m above ground:anl:
3.2:2210:d=2026010300:VGRD:10 m above ground:anl:
";

    #[test]
    fn test_parse_inventory() {
        let inv = Inventory::parse(SAMPLE).unwrap();
        assert_eq!(inv.entries().len(), 4);
        assert_eq!(inv.reference_date(), Some("2026010300"));
        assert!(inv.contains(&InventoryKey {
            param: "TMP".to_string(),
            level: "2 m above ground".to_string(),
        }));
        assert_eq!(inv.entries()[1].forecast, "anl");
    }

    #[test]
    fn test_rejects_html_error_page() {
        let err = Inventory::parse("<html><body>Not Found</body></html>").unwrap_err();
        assert!(matches!(err, Grib2Error::InvalidInventory { line: 1, .. }));
    }

    #[test]
    fn test_rejects_decreasing_offsets() {
        let text = "1:100:d=2026010300:TMP:2 m above ground:anl:\n2:50:d=2026010300:RH:2 m above ground:anl:\n";
        assert!(Inventory::parse(text).is_err());
    }

    #[test]
    fn test_rejects_empty_inventory() {
        assert!(Inventory::parse("\n\n").is_err());
    }

    #[test]
    fn test_mixed_dates_have_no_reference_date() {
        let text = "1:0:d=2026010300:TMP:2 m above ground:anl:\n2:10:d=2026010306:RH:2 m above ground:anl:\n";
        let inv = Inventory::parse(text).unwrap();
        assert_eq!(inv.reference_date(), None);
    }
}
