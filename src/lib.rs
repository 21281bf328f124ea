pub mod auth;
pub mod cleanup;
pub mod client;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod siwe;
pub mod storage;
pub mod wallet;
