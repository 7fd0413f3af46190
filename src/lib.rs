pub mod analytics;
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod keys;
pub mod links;
pub mod models;
pub mod redirect;
pub mod storage;
