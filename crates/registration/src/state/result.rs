use megagen_core::Identity;
use std::time::Duration;

use super::context::*;
use crate::error::WorkflowError;

/// Outcome of one provisioning run together with how it unfolded
#[derive(Debug)]
pub struct ProvisioningReport {
    pub result: Result<Identity, WorkflowError>,
    pub transitions: Vec<StateTransition>,
    pub duration: Duration,
}

impl ProvisioningReport {
    pub fn new(result: Result<Identity, WorkflowError>, context: WorkflowContext) -> Self {
        Self {
            result,
            duration: context.duration(),
            transitions: context.transitions,
        }
    }

    /// Last state reached before the run ended
    pub fn last_state(&self) -> &'static str {
        self.transitions.last().map(|t| t.to).unwrap_or("started")
    }

    pub fn summary(&self) -> String {
        let path: Vec<&str> = std::iter::once("started")
            .chain(self.transitions.iter().map(|t| t.to))
            .collect();

        match &self.result {
            Ok(identity) => format!(
                "provisioned {} in {}ms ({})",
                identity.email,
                self.duration.as_millis(),
                path.join(" -> ")
            ),
            Err(e) => format!(
                "provisioning failed: {} (duration: {}ms, {})",
                e,
                self.duration.as_millis(),
                path.join(" -> ")
            ),
        }
    }
}
