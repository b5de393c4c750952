//! # SignalKit Library
//!
//! Engineering health sensors over GitHub pull request activity: the GitHub
//! client and login flow, ingestion into the event store, the sensors
//! themselves, and the HTTP server that exposes them.

pub mod auth;
pub mod cleanup;
pub mod config;
pub mod connectors;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod normalization;
pub mod repositories;
pub mod sensors;
pub mod server;
pub mod telemetry;
pub use migration;
