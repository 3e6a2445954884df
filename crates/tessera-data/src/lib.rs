// Operations
mod operations;
pub use operations::*;

// Validation and id normalization
pub mod ids;
pub use ids::{check_year, parse_id, parse_year, ValidationError, MAX_YEAR, MIN_YEAR};

// Models
mod members;
pub use members::*;

mod payments;
pub use payments::*;

mod settings;
pub use settings::*;

mod changelog;
pub use changelog::*;
