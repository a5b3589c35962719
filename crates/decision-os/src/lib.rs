//! Deterministic decision scoring with explanations, governance gating, stress testing,
//! and a hash-chained audit history.

pub mod config;
pub mod decisions;
pub mod error;
pub mod telemetry;
