//! Concrete adapters for the domain ports: configuration loading, logging
//! setup, on-disk memory persistence, tool-output parsers, and the
//! substrates (Brain, CommandRunner) that drive a real or dry-run session.

pub mod config;
pub mod logging;
pub mod memory;
pub mod parsers;
pub mod substrates;
