//! Domain layer: models and ports for the Pentecter orchestration engine.

pub mod error;
pub mod models;
pub mod ports;
