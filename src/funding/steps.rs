//! Step Tracker: user-visible progress derived from a [`FundingPlan`].

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use strum::Display;

use super::plan::FundingPlan;
use crate::routing::{LegStatus, LegUpdate};

/// Label of the settlement-token approval on a direct plan.
pub const LABEL_APPROVE: &str = "Approve settlement token";
/// Label of the settlement-token approval after a route.
pub const LABEL_APPROVE_DESTINATION: &str = "Approve settlement token on destination";
/// Label of the settlement call.
pub const LABEL_PLACE: &str = "Place position";
/// Label of a cross-chain leg.
pub const LABEL_BRIDGE: &str = "Swap & bridge to destination";
/// Label of a same-chain leg.
pub const LABEL_SWAP: &str = "Swap tokens";
/// Suffix for the leg that carries the embedded settlement call.
pub const LABEL_EMBEDDED_SUFFIX: &str = " & place position";
/// Label of the verification step.
pub const LABEL_VERIFYING: &str = "Verifying position";

/// Status of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StepStatus {
    /// Not started.
    Pending,
    /// In progress.
    Active,
    /// Finished.
    Complete,
    /// Failed.
    Error,
    /// Waiting for on-chain confirmation of the position.
    Verifying,
}

/// One user-visible step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionStep {
    /// Step label.
    pub label: String,
    /// Current status.
    pub status: StepStatus,
    /// Transaction hash, once submitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Explorer link for the transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_link: Option<String>,
    /// Failure or result message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PositionStep {
    fn new(label: impl Into<String>, status: StepStatus) -> Self {
        Self {
            label: label.into(),
            status,
            tx_hash: None,
            tx_link: None,
            message: None,
        }
    }

    /// Pending step.
    pub fn pending(label: impl Into<String>) -> Self {
        Self::new(label, StepStatus::Pending)
    }
}

impl fmt::Display for PositionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status, self.label)?;
        if let Some(hash) = &self.tx_hash {
            write!(f, " ({})", hash)?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

/// Step list for a plan.
///
/// Deterministic: the same plan always yields the same labels and count.
pub fn steps_for_plan(plan: &FundingPlan) -> Vec<PositionStep> {
    match plan {
        FundingPlan::Noop(_) => vec![PositionStep::new(LABEL_PLACE, StepStatus::Complete)],
        FundingPlan::Direct(_) => vec![
            PositionStep::pending(LABEL_APPROVE),
            PositionStep::pending(LABEL_PLACE),
        ],
        FundingPlan::Routed(routed) => {
            let mut steps: Vec<PositionStep> = routed
                .itinerary
                .legs
                .iter()
                .map(|leg| {
                    PositionStep::pending(if leg.is_cross_chain() {
                        LABEL_BRIDGE
                    } else {
                        LABEL_SWAP
                    })
                })
                .collect();

            if routed.embeds_settlement() {
                match steps.last_mut() {
                    Some(last) => last.label.push_str(LABEL_EMBEDDED_SUFFIX),
                    None => steps.push(PositionStep::pending(LABEL_PLACE)),
                }
            } else {
                steps.push(PositionStep::pending(LABEL_APPROVE_DESTINATION));
                steps.push(PositionStep::pending(LABEL_PLACE));
            }
            steps
        }
    }
}

/// Receives a snapshot of the step list after every change.
pub trait ProgressSink: Send + Sync {
    /// Called with the full, current step list.
    fn on_steps(&self, steps: &[PositionStep]);
}

impl<F> ProgressSink for F
where
    F: Fn(&[PositionStep]) + Send + Sync,
{
    fn on_steps(&self, steps: &[PositionStep]) {
        self(steps)
    }
}

/// Mutable step list for one execution attempt.
///
/// Updates never move a step backwards: a `Complete` step stays complete,
/// and at most one step is `Active` at a time.
pub struct StepTracker {
    steps: Vec<PositionStep>,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl fmt::Debug for StepTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepTracker").field("steps", &self.steps).finish()
    }
}

impl StepTracker {
    /// Tracker for a plan; the sink sees the initial list immediately.
    pub fn new(plan: &FundingPlan, sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self::from_steps(steps_for_plan(plan), sink)
    }

    /// Tracker over an explicit step list.
    pub fn from_steps(steps: Vec<PositionStep>, sink: Option<Arc<dyn ProgressSink>>) -> Self {
        let tracker = Self { steps, sink };
        tracker.emit();
        tracker
    }

    /// Current steps.
    pub fn steps(&self) -> &[PositionStep] {
        &self.steps
    }

    /// Consume the tracker.
    pub fn into_steps(self) -> Vec<PositionStep> {
        self.steps
    }

    /// Index of the active step.
    pub fn active(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status == StepStatus::Active)
    }

    /// Hash of the last step that carries one.
    pub fn last_tx_hash(&self) -> Option<&str> {
        self.steps.iter().rev().find_map(|s| s.tx_hash.as_deref())
    }

    fn emit(&self) {
        if let Some(sink) = &self.sink {
            sink.on_steps(&self.steps);
        }
    }

    fn set_active(&mut self, index: usize) -> bool {
        if self.active().is_some_and(|i| i != index) {
            return false;
        }
        match self.steps.get_mut(index) {
            Some(step) if step.status == StepStatus::Pending => {
                step.status = StepStatus::Active;
                true
            }
            _ => false,
        }
    }

    /// Mark a pending step active.
    pub fn activate(&mut self, index: usize) {
        if self.set_active(index) {
            self.emit();
        }
    }

    /// Record a transaction on a step without changing its status.
    pub fn attach_tx(&mut self, index: usize, tx_hash: String, tx_link: Option<String>) {
        if let Some(step) = self.steps.get_mut(index) {
            if step.status != StepStatus::Error {
                step.tx_hash = Some(tx_hash);
                step.tx_link = tx_link;
                self.emit();
            }
        }
    }

    /// Mark a step complete, keeping any hash it already has when none is given.
    pub fn complete(&mut self, index: usize, tx_hash: Option<String>, tx_link: Option<String>) {
        let Some(step) = self.steps.get_mut(index) else {
            return;
        };
        if matches!(step.status, StepStatus::Error | StepStatus::Complete) {
            return;
        }

        step.status = StepStatus::Complete;
        if tx_hash.is_some() {
            step.tx_hash = tx_hash;
            step.tx_link = tx_link;
        }
        self.emit();
    }

    /// Mark the failing step as errored and return its index.
    ///
    /// A step that already failed keeps its message. Otherwise the active
    /// step fails, or the first step that has not completed.
    pub fn fail(&mut self, message: impl Into<String>) -> Option<usize> {
        if let Some(failed) = self.steps.iter().position(|s| s.status == StepStatus::Error) {
            return Some(failed);
        }
        let index = self.active().or_else(|| {
            self.steps
                .iter()
                .position(|s| !matches!(s.status, StepStatus::Complete))
        })?;
        self.fail_at(index, message);
        Some(index)
    }

    fn fail_at(&mut self, index: usize, message: impl Into<String>) {
        if let Some(step) = self.steps.get_mut(index) {
            if step.status != StepStatus::Complete {
                step.status = StepStatus::Error;
                step.message = Some(message.into());
                self.emit();
            }
        }
    }

    /// Apply a routing-engine progress event to the matching leg step.
    pub fn apply_leg(&mut self, update: LegUpdate) {
        match update.status {
            LegStatus::Pending => {
                self.activate(update.index);
                if let Some(hash) = update.tx_hash {
                    self.attach_tx(update.index, hash, update.tx_link);
                }
            }
            LegStatus::Done => self.complete(update.index, update.tx_hash, update.tx_link),
            LegStatus::Failed => self.fail_at(
                update.index,
                update.message.unwrap_or_else(|| "Step failed".to_string()),
            ),
        }
    }

    /// Complete every step that has not failed.
    pub fn complete_remaining(&mut self) {
        let mut changed = false;
        for step in &mut self.steps {
            if matches!(step.status, StepStatus::Pending | StepStatus::Active) {
                step.status = StepStatus::Complete;
                changed = true;
            }
        }
        if changed {
            self.emit();
        }
    }

    /// Append the verification step.
    pub fn begin_verifying(&mut self) -> usize {
        self.steps
            .push(PositionStep::new(LABEL_VERIFYING, StepStatus::Verifying));
        self.emit();
        self.steps.len() - 1
    }

    /// Close the verification step with its outcome.
    pub fn finish_verifying(&mut self, index: usize, label: impl Into<String>) {
        if let Some(step) = self.steps.get_mut(index) {
            if step.status == StepStatus::Verifying {
                step.label = label.into();
                step.status = StepStatus::Complete;
                self.emit();
            }
        }
    }
}
