pub mod config;
pub mod download;
pub mod meta_routes;
pub mod placement;
pub mod proxy;
pub mod routes;
pub mod state;
pub mod sweeper;
