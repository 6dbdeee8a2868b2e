//! Concrete parsers for the external tools SmartSubAgents invoke, plus the
//! dispatcher that routes a finished command's output to the right one.

pub mod curl;
pub mod dispatch;
pub mod ffuf;
pub mod nmap;

pub use dispatch::dispatch;
