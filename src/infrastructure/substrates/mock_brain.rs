//! A scripted `Brain`: returns actions from a fixed queue, falling back to
//! `Complete` once exhausted. Used for dry runs and for exercising the
//! orchestration core without a real reasoning backend.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::models::{Action, BrainInput};
use crate::domain::ports::{Brain, BrainError};

/// Replays a fixed sequence of actions, one per `decide` call.
pub struct MockBrain {
    script: Mutex<Vec<Action>>,
}

impl MockBrain {
    pub fn new(script: Vec<Action>) -> Self {
        Self { script: Mutex::new(script) }
    }

    /// A Brain that completes the target on its very first turn.
    pub fn immediate_complete() -> Self {
        Self::new(vec![Action::Complete { thought: Some("dry run".to_string()) }])
    }
}

#[async_trait]
impl Brain for MockBrain {
    async fn decide(&self, input: BrainInput) -> Result<Action, BrainError> {
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            debug!(turn = input.turn_count, "mock brain script exhausted, completing");
            return Ok(Action::Complete { thought: Some("mock brain script exhausted".to_string()) });
        }
        Ok(script.remove(0))
    }
}
