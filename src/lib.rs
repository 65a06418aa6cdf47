pub mod api;
pub mod cache;
pub mod config;
pub mod console;
pub mod controller;
pub mod error;
pub mod models;
pub mod normalize;
pub mod poller;
pub mod progress;
