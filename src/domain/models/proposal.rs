//! A Brain-emitted action that must pass human approval before execution.

use serde::{Deserialize, Serialize};

/// A command the Brain wants to run but which requires human sign-off.
///
/// Created by the Brain as `action = propose`, set on a `Target` (which
/// forces it to `Paused`), and cleared once the approval channel produces
/// `true`/`false` or the owning context is cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub description: String,
    pub command: String,
    pub args: Vec<String>,
}

impl Proposal {
    pub fn new(description: impl Into<String>, command: impl Into<String>) -> Self {
        let command = command.into();
        let args = shell_words_lossy(&command);
        Self {
            description: description.into(),
            command,
            args,
        }
    }
}

/// Best-effort whitespace tokenizer for rendering a proposal's argument
/// list to the UI. Not a shell parser: quoting is not unescaped, since the
/// argument list here is informational only — execution always goes
/// through the command runner's own parsing of `command`.
fn shell_words_lossy(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_argument_list() {
        let p = Proposal::new("exploit", "msfconsole -r exploit.rc");
        assert_eq!(p.args, vec!["msfconsole", "-r", "exploit.rc"]);
    }
}
