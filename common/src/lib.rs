pub mod catalog;
pub mod constants;
pub mod error;
pub mod file_utils;
pub mod key_utils;
pub mod kvdb;
pub mod model;
pub mod registry;
pub mod remote_store;
pub mod retry;
pub mod schemas;
pub mod store;
pub mod telemetry;
pub mod time_utils;
pub mod trace_middleware;
pub mod url_utils;
