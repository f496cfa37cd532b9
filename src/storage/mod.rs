//! Storage Module
//!
//! Flat-file persistence for the catalog and the ledger.
//!
//! ## Responsibilities
//! - Encode/decode one record per line
//! - Rewrite each file in full on every save
//! - Treat a missing file as an empty collection
//! - Skip rows with the wrong field count, reject rows with bad timestamps
//!
//! ## File Format
//! UTF-8 text, one record per line, five tab-separated fields, `\n` terminated.
//! ```text
//! catalog (library_data.txt)
//! ┌────────────┬─────────┬─────────────┬──────────────┬────────────────┐
//! │ identifier │  title  │ attribution │ true / false │ holder / null  │
//! └────────────┴─────────┴─────────────┴──────────────┴────────────────┘
//!
//! ledger (borrowing_records.txt)
//! ┌───────────┬─────────┬────────┬─────────────────────┬─────────────────────┐
//! │ record id │ item id │ holder │ yyyy-MM-dd HH:mm:ss │ timestamp / null    │
//! └───────────┴─────────┴────────┴─────────────────────┴─────────────────────┘
//! ```
//!
//! ## Write Protocol
//! Each file is written to `<name>.tmp` and renamed over the original, so a
//! crash mid-write leaves either the old or the new file, never half of one.
//! The catalog is written before the ledger.

mod codec;
mod store;

pub use codec::{
    decode_item, decode_record, encode_item, encode_record, format_timestamp, parse_timestamp,
    ItemRow, RowError, RowOutcome, FIELD_COUNT, FIELD_SEPARATOR, NULL_LITERAL, TIMESTAMP_FORMAT,
};
pub use store::{FileReport, LoadReport, PersistenceStore};
