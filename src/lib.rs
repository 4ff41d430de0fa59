pub mod config;
pub mod console;
pub mod error;
pub mod interpreter;
pub mod logger;
pub mod model;
pub mod platform;
pub mod sink;
pub mod store;
pub mod tracker;
