pub mod compliance;
pub mod datetime;
pub mod ledger;
pub mod reports;

pub use compliance::{compute_arrears, is_enrolled, PaymentStatus};
pub use ledger::Ledger;
pub use reports::{AgeCategory, ReportError, StatusFilter};
