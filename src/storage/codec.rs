//! Row codec
//!
//! Encoding and decoding of single catalog/ledger lines.
//!
//! Lines handed to the decoders carry no terminator; a trailing `\r` left by
//! an editor on another platform is tolerated.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::catalog::Item;
use crate::ledger::LoanRecord;

/// Separator between fields of a row
pub const FIELD_SEPARATOR: char = '\t';

/// Number of fields in every valid row
pub const FIELD_COUNT: usize = 5;

/// Stored in place of an absent holder or return timestamp
pub const NULL_LITERAL: &str = "null";

/// `yyyy-MM-dd HH:mm:ss`, local time, no zone
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Result of decoding one line
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome<T> {
    /// The line held a record
    Parsed(T),

    /// The line did not have exactly five fields and was ignored
    Skipped { fields: usize },
}

/// A decoded catalog row
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub item: Item,

    /// The stored loan flag disagreed with the stored holder
    pub flag_mismatch: bool,
}

/// Why a five-field ledger row could not be decoded
#[derive(Debug, Error)]
pub enum RowError {
    #[error("bad {field} timestamp '{value}': {source}")]
    BadTimestamp {
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("return timestamp precedes borrow timestamp")]
    ReturnBeforeBorrow,
}

// =============================================================================
// Timestamps
// =============================================================================

pub fn format_timestamp(instant: NaiveDateTime) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
}

// =============================================================================
// Catalog Rows
// =============================================================================

/// Encode an item as a catalog line (no terminator)
pub fn encode_item(item: &Item) -> String {
    [
        item.id(),
        item.title(),
        item.attribution(),
        if item.is_on_loan() { "true" } else { "false" },
        item.holder().unwrap_or(NULL_LITERAL),
    ]
    .join("\t")
}

/// Decode a catalog line
///
/// The loan flag is read like a lenient boolean: `true` in any case means
/// on loan, anything else means available. The holder column is what the item
/// keeps; a flag that disagrees with it is reported through `flag_mismatch`.
pub fn decode_item(line: &str) -> RowOutcome<ItemRow> {
    let fields = match split_row(line) {
        Ok(fields) => fields,
        Err(count) => return RowOutcome::Skipped { fields: count },
    };
    let [id, title, attribution, flag, holder] = fields;

    let flagged = flag.eq_ignore_ascii_case("true");
    let holder = (holder != NULL_LITERAL).then(|| holder.to_string());
    let flag_mismatch = flagged != holder.is_some();

    RowOutcome::Parsed(ItemRow {
        item: Item::new(id, title, attribution).with_holder(holder),
        flag_mismatch,
    })
}

// =============================================================================
// Ledger Rows
// =============================================================================

/// Encode a loan record as a ledger line (no terminator)
pub fn encode_record(record: &LoanRecord) -> String {
    let borrowed = format_timestamp(record.borrowed_at());
    let returned = record
        .returned_at()
        .map(format_timestamp)
        .unwrap_or_else(|| NULL_LITERAL.to_string());

    [
        record.record_id(),
        record.item_id(),
        record.holder(),
        borrowed.as_str(),
        returned.as_str(),
    ]
    .join("\t")
}

/// Decode a ledger line
pub fn decode_record(line: &str) -> Result<RowOutcome<LoanRecord>, RowError> {
    let fields = match split_row(line) {
        Ok(fields) => fields,
        Err(count) => return Ok(RowOutcome::Skipped { fields: count }),
    };
    let [record_id, item_id, holder, borrowed, returned] = fields;

    let borrowed_at = parse_timestamp(borrowed).map_err(|source| RowError::BadTimestamp {
        field: "borrow",
        value: borrowed.to_string(),
        source,
    })?;

    let returned_at = if returned == NULL_LITERAL {
        None
    } else {
        Some(
            parse_timestamp(returned).map_err(|source| RowError::BadTimestamp {
                field: "return",
                value: returned.to_string(),
                source,
            })?,
        )
    };

    LoanRecord::from_parts(record_id, item_id, holder, borrowed_at, returned_at)
        .map(RowOutcome::Parsed)
        .ok_or(RowError::ReturnBeforeBorrow)
}

/// Split into exactly five fields, or report how many there were
///
/// Trailing empty fields are not counted, so a row whose holder or return
/// column is blank is short and gets skipped.
fn split_row(line: &str) -> Result<[&str; FIELD_COUNT], usize> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.len() > 1 {
        while fields.last() == Some(&"") {
            fields.pop();
        }
    }
    <[&str; FIELD_COUNT]>::try_from(fields.as_slice()).map_err(|_| fields.len())
}
