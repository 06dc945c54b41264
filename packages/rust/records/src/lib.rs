//! Assignment-specification records and their flat and card renderings.
//!
//! This crate provides:
//! - [`record`]: [`SearchHit`] / [`DetailRecord`] wrappers with lenient nested lookup
//! - [`row`]: the published table header and record to [`FlatRow`] transform
//! - [`card`]: contact / organisation vCards and their placement on disk
//! - [`flatten`]: dotted-key flattening of nested search hits

pub mod card;
pub mod flatten;
pub mod record;
pub mod row;

pub use card::{CardKind, ContactCard, organisation_uid, save_card};
pub use flatten::{cells_for, flatten, union_columns};
pub use record::{Assignment, DetailRecord, Flag, SearchHit};
pub use row::{COLUMN_COUNT, FlatRow, PUBLISHED_HEADER, to_row, write_record_cards};
