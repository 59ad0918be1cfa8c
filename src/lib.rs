pub mod cache;
pub mod client;
pub mod config;
pub mod controller;
pub mod cron;
pub mod error;
pub mod limits;
pub mod models;
pub mod plugin;
pub mod scheduler;
pub mod server;
pub mod shutdown;
