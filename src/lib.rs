pub mod app;
pub mod auth;
pub mod config;
pub mod database;
pub mod entitlements;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod plans;

#[cfg(test)]
pub mod testing;
