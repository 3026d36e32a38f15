pub mod intermediate;
pub mod provider;
pub mod sqlite;
pub mod swap;
