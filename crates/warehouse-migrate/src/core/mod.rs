//! Core types shared by every stage of the pipeline.
//!
//! - [`table`]: table identity and result column metadata
//! - [`value`]: cell values and the loader's [`Batch`]
//! - [`identifier`]: identifier validation and quoting

pub mod identifier;
pub mod table;
pub mod value;

pub use identifier::{qualify, qualify_schema, quote_ident, quote_literal};
pub use table::{ColumnDescriptor, TableRef};
pub use value::{Batch, SqlValue};
