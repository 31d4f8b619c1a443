pub mod app_config;
pub mod error;
pub mod model;
