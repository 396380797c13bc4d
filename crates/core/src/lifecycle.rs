//! Refund request lifecycle: status semantics and the transition function.
//!
//! Everything here is pure. Persisting a [`TransitionOutcome`] (the updated
//! request together with its activity entry) is the storage layer's job.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::activity::{ActivityEntry, ActivityType};
use crate::domain::refund::{RefundRequest, RefundStatus};
use crate::errors::DomainError;

pub const DEFAULT_ESTIMATED_RESOLUTION_DAYS: u32 = 40;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    /// Days added to the submission date to estimate when a request resolves.
    pub estimated_resolution_days: u32,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self { estimated_resolution_days: DEFAULT_ESTIMATED_RESOLUTION_DAYS }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub to: RefundStatus,
    pub actor: String,
    pub approved_amount: Option<Decimal>,
    pub note: Option<String>,
}

impl Transition {
    pub fn to(status: RefundStatus, actor: impl Into<String>) -> Self {
        Self { to: status, actor: actor.into(), approved_amount: None, note: None }
    }

    pub fn with_approved_amount(mut self, amount: Decimal) -> Self {
        self.approved_amount = Some(amount);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RefundStatus,
    pub request: RefundRequest,
    pub activity: ActivityEntry,
}

pub fn label_for(code: &str) -> Result<&'static str, DomainError> {
    RefundStatus::parse(code).map(|status| status.label())
}

pub fn progress_for(code: &str) -> Result<u8, DomainError> {
    RefundStatus::parse(code).map(|status| status.progress())
}

pub fn allowed_transitions(status: RefundStatus) -> &'static [RefundStatus] {
    status.allowed_transitions()
}

pub fn status_change_description(status: RefundStatus) -> String {
    format!("Estado actualizado a: {}", status.label())
}

pub fn apply_transition(
    request: &RefundRequest,
    transition: Transition,
    policy: &LifecyclePolicy,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, DomainError> {
    let from = request.status;
    let to = transition.to;

    if !from.can_transition_to(to) {
        return Err(DomainError::InvalidTransition { from, to });
    }
    if transition.actor.trim().is_empty() {
        return Err(DomainError::InvariantViolation("transition actor is required".to_owned()));
    }

    // The activity log must never go backwards, even when clocks disagree.
    let timestamp = now.max(request.updated_at);
    let mut updated = request.clone();
    updated.status = to;
    updated.updated_at = timestamp;

    match to {
        RefundStatus::Enviado => {
            let submitted_at = *updated.submission_date.get_or_insert(timestamp);
            updated.estimated_completion_date = Some(
                submitted_at + Duration::days(i64::from(policy.estimated_resolution_days)),
            );
        }
        RefundStatus::Aprobado => {
            let approved = transition.approved_amount.unwrap_or(request.requested_amount);
            if approved < Decimal::ZERO || approved > request.requested_amount {
                return Err(DomainError::InvariantViolation(format!(
                    "approved_amount must be in range 0..={}, got {approved}",
                    request.requested_amount
                )));
            }
            updated.approved_amount = approved.round_dp(2);
        }
        RefundStatus::Completado | RefundStatus::Rechazado => {
            updated.completion_date = Some(timestamp);
        }
        RefundStatus::Borrador | RefundStatus::EnProceso => {}
    }

    if to != RefundStatus::Aprobado && transition.approved_amount.is_some() {
        return Err(DomainError::InvariantViolation(format!(
            "approved_amount can only be set when approving, not when moving to {to}"
        )));
    }

    let mut activity = ActivityEntry::new(
        updated.id.clone(),
        ActivityType::StatusChange,
        status_change_description(to),
        transition.actor.trim(),
        timestamp,
    )
    .with_metadata("from", from.as_str())
    .with_metadata("to", to.as_str())
    .with_metadata("progress", to.progress().to_string());

    if to == RefundStatus::Aprobado {
        activity = activity.with_metadata("approved_amount", updated.approved_amount.to_string());
    }
    if let Some(note) = transition.note.map(|note| note.trim().to_owned()) {
        if !note.is_empty() {
            activity = activity.with_metadata("note", note);
        }
    }

    Ok(TransitionOutcome { from, request: updated, activity })
}

impl RefundRequest {
    pub fn transition_to(
        &self,
        next: RefundStatus,
        actor: impl Into<String>,
    ) -> Result<TransitionOutcome, DomainError> {
        apply_transition(self, Transition::to(next, actor), &LifecyclePolicy::default(), Utc::now())
    }
}
