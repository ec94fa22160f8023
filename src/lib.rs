pub mod config;
pub mod constants;
pub mod detection;
pub mod extractors;
pub mod logging;
pub mod response;
pub mod routes;
pub mod spam;
pub mod state;
pub mod store;
