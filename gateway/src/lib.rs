pub mod command;
pub mod core;

pub use crate::core::routes::router;
