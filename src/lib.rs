pub mod api;
pub mod catalog;
pub mod core;
pub mod error;
pub mod share;
pub mod store;

pub use error::FireError;
