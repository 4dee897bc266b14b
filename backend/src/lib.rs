pub mod cli_support;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod observability;
pub mod services;
pub mod telemetry;
