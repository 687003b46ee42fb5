// Public API for integration tests and embedding the registry elsewhere

pub mod abuse;
pub mod api;
pub mod auth;
pub mod broadcast;
pub mod command;
pub mod config;
pub mod error;
pub mod protocol;
pub mod state;
pub mod store;
pub mod types;
pub mod ws;
