//! GRIB2 parser implementation (WMO FM 92 GRIB Edition 2).
//!
//! Covers what the AIGFS map pipeline needs: container framing checks,
//! section parsing, a message index, `.idx` inventory parsing, simple
//! packing (other packings through the `grib` crate) and decoding of the
//! named fields in the [`FieldCatalog`].

pub mod catalog;
pub mod decode;
pub mod error;
pub mod framing;
pub mod index;
pub mod sections;
pub mod tables;
pub mod unpacking;

pub use catalog::{CatalogEntry, FieldCatalog, FieldId, FieldSource, InventoryKey, UnitConversion};
pub use decode::{decode, DecodedFile};
pub use error::{DecodeError, Grib2Error};
pub use framing::{validate_file, validate_framing, MessageSpan};
pub use index::{Inventory, InventoryEntry, MessageIndex, MessageRecord};
pub use sections::{Grib2Message, Grib2Reader};
pub use tables::Grib2Tables;
