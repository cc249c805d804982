pub mod api;
#[cfg(feature = "cli")]
pub mod app;
pub mod auth;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod duration;
pub mod error;
pub mod format;
pub mod fs;
pub mod models;
pub mod output;
pub mod region;
pub mod service;
