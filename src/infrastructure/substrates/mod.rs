//! Concrete `Brain`/`CommandRunner` implementations a binary wires up at
//! startup. This crate never defines a reasoning strategy for the Brain —
//! `MockBrain` is the only implementation available here, driven by a
//! script supplied by the caller (dry runs, tests, or a CLI user typing
//! commands by hand through `stdin`).

pub mod mock_brain;
pub mod shell_runner;

pub use mock_brain::MockBrain;
pub use shell_runner::ShellCommandRunner;
