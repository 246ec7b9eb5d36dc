// ===============================
// src/lib.rs
// ===============================
pub mod config;
pub mod domain;
pub mod engine;
pub mod market;
pub mod metrics;
pub mod patterns;
pub mod profiles;
pub mod sink;
pub mod stats;
