
pub mod connection;
pub use connection::Connection;

pub mod results;
pub use results::QueryError;

pub mod schema;
pub use schema::SCHEMA_VERSION;

pub mod changelog;
pub mod members;
pub mod payments;
pub mod settings;
