pub mod api;
pub mod asset;
pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod exit;
pub mod fetcher;
pub mod logs;
pub mod platform;
pub mod poll;
pub mod signer;
pub mod state;
pub mod store;
pub mod transform;
pub mod ui;
