// Library exports for the feed server
// This allows integration tests and the binary to share modules

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod routes;
pub mod state;
pub mod storage;
