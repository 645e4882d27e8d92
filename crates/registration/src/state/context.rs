use std::time::{Duration, Instant};
use tracing::info;

use crate::error::WorkflowError;

/// Steps of a provisioning run, in the only order they may occur
#[derive(Debug, Clone)]
pub enum WorkflowState {
    Started,
    FormFilled,
    PasswordEntered,
    MailRetrieved,
    ConfirmationVisited,
    Completed,
    Failed(WorkflowError),
}

impl WorkflowState {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Started => "started",
            WorkflowState::FormFilled => "form_filled",
            WorkflowState::PasswordEntered => "password_entered",
            WorkflowState::MailRetrieved => "mail_retrieved",
            WorkflowState::ConfirmationVisited => "confirmation_visited",
            WorkflowState::Completed => "completed",
            WorkflowState::Failed(_) => "failed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            WorkflowState::Started => 0,
            WorkflowState::FormFilled => 1,
            WorkflowState::PasswordEntered => 2,
            WorkflowState::MailRetrieved => 3,
            WorkflowState::ConfirmationVisited => 4,
            WorkflowState::Completed => 5,
            WorkflowState::Failed(_) => 6,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: &'static str,
    pub to: &'static str,
    pub elapsed: Duration,
}

/// Tracks where a run is and how it got there
#[derive(Debug)]
pub struct WorkflowContext {
    pub state: WorkflowState,
    pub transitions: Vec<StateTransition>,
    pub started_at: Instant,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self {
            state: WorkflowState::Started,
            transitions: Vec::new(),
            started_at: Instant::now(),
        }
    }

    /// Move forward to `next`. Backward moves and moves out of a terminal state are ignored.
    pub fn transition(&mut self, next: WorkflowState) -> bool {
        if self.state.is_terminal() || next.rank() <= self.state.rank() {
            return false;
        }

        let from = self.state.name();
        self.state = next;
        self.transitions.push(StateTransition {
            from,
            to: self.state.name(),
            elapsed: self.started_at.elapsed(),
        });

        info!(from, to = self.state.name(), "workflow state changed");
        true
    }

    pub fn fail(&mut self, error: WorkflowError) -> bool {
        self.transition(WorkflowState::Failed(error))
    }

    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for WorkflowContext {
    fn default() -> Self {
        Self::new()
    }
}
