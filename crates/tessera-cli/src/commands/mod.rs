mod backup;
pub use backup::*;

mod log;
pub use log::*;

mod members;
pub use members::*;

mod payments;
pub use payments::*;

mod reports;
pub use reports::*;

mod settings;
pub use settings::*;

mod snapshot;
pub use snapshot::*;
