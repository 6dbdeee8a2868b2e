//! Pentecter: an orchestration engine that drives autonomous penetration
//! testing sessions against one or more targets.
//!
//! The crate is layered `domain` (state machines and port traits),
//! `application` (the `Loop`/`Team`/`TaskManager`/`ReconRunner`
//! orchestration logic), and `infrastructure` (concrete adapters: config
//! loading, logging, on-disk memory, tool-output parsers, and the
//! `Brain`/`CommandRunner` substrates a binary wires up at startup).

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
