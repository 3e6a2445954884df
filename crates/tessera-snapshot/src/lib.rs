//! Portable, versioned snapshots of the ledger.
//!
//! A snapshot is a JSON document with one array of rows per table.
//! Ids may be numbers or numeric strings; they are normalized when
//! the document is read.

mod error;
pub use error::SnapshotError;

mod model;
pub use model::*;

mod export;
pub use export::{export_single_member, export_snapshot};

mod import;
pub use import::{import_snapshot, ImportSummary};
