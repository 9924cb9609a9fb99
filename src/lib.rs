//! Test orchestrator library.
//!
//! Queues single test-set runs, fans "run all" requests out over a bounded
//! worker pool, persists results and serves the combined listing and report
//! artifacts over HTTP.

pub mod api;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
