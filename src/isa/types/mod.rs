pub mod schema;
pub mod word;
