//! Worker-side crates: credit execution against inference endpoints.
//!
//! The [`worker::Worker`] service consumes credit drops, fetches
//! conversation turns, formats endpoint payloads through the
//! [`endpoints::EndpointRegistry`], sends requests (unary or SSE
//! streaming), and pushes raw results. The [`manager::WorkerManager`]
//! sizes the pool and tracks worker health.

pub mod client;
pub mod endpoints;
pub mod health;
pub mod manager;
pub mod sse;
pub mod worker;

pub use client::{HttpInferenceClient, InferenceClient};
pub use manager::WorkerManager;
pub use worker::Worker;
