use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::refund::{Folio, RefundRequest, RefundStatus, RefundType};

/// What a dashboard card needs to render one refund request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RefundCard {
    pub folio: Folio,
    pub status: RefundStatus,
    pub label: &'static str,
    pub progress: u8,
    pub is_terminal: bool,
    pub refund_type: RefundType,
    pub requested_amount: Decimal,
    pub approved_amount: Decimal,
    pub documents_count: u32,
}

impl From<&RefundRequest> for RefundCard {
    fn from(request: &RefundRequest) -> Self {
        Self {
            folio: request.folio.clone(),
            status: request.status,
            label: request.status.label(),
            progress: request.status.progress(),
            is_terminal: request.status.is_terminal(),
            refund_type: request.refund_type,
            requested_amount: request.requested_amount,
            approved_amount: request.approved_amount,
            documents_count: request.documents_count,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundFilter {
    pub owner_id: Option<String>,
    pub status: Option<RefundStatus>,
    pub refund_type: Option<RefundType>,
    pub tax_year: Option<i32>,
    /// Case-insensitive substring over folio and description.
    pub search: Option<String>,
}

impl RefundFilter {
    pub fn matches(&self, request: &RefundRequest) -> bool {
        if self.owner_id.as_deref().is_some_and(|owner| owner != request.owner_id) {
            return false;
        }
        if self.status.is_some_and(|status| status != request.status) {
            return false;
        }
        if self.refund_type.is_some_and(|refund_type| refund_type != request.refund_type) {
            return false;
        }
        if self.tax_year.is_some_and(|year| year != request.tax_year) {
            return false;
        }

        match self.search_term() {
            Some(term) => {
                request.folio.0.to_lowercase().contains(&term)
                    || request
                        .description
                        .as_deref()
                        .is_some_and(|description| description.to_lowercase().contains(&term))
            }
            None => true,
        }
    }

    fn search_term(&self) -> Option<String> {
        self.search.as_deref().map(str::trim).filter(|term| !term.is_empty()).map(str::to_lowercase)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub total: usize,
    pub active: usize,
    pub by_status: BTreeMap<RefundStatus, usize>,
    pub total_requested: Decimal,
    pub total_approved: Decimal,
    pub average_progress: u8,
}

impl DashboardSummary {
    pub fn from_requests<'a>(requests: impl IntoIterator<Item = &'a RefundRequest>) -> Self {
        let mut by_status: BTreeMap<RefundStatus, usize> =
            RefundStatus::ALL.iter().map(|status| (*status, 0)).collect();
        let mut total = 0usize;
        let mut active = 0usize;
        let mut progress_sum = 0u64;
        let mut total_requested = Decimal::ZERO;
        let mut total_approved = Decimal::ZERO;

        for request in requests {
            total += 1;
            *by_status.entry(request.status).or_insert(0) += 1;
            if !request.status.is_terminal() {
                active += 1;
            }
            progress_sum += u64::from(request.status.progress());
            total_requested += request.requested_amount;
            if matches!(request.status, RefundStatus::Aprobado | RefundStatus::Completado) {
                total_approved += request.approved_amount;
            }
        }

        let average_progress = if total == 0 {
            0
        } else {
            u8::try_from(progress_sum / total as u64).unwrap_or(100)
        };

        Self { total, active, by_status, total_requested, total_approved, average_progress }
    }
}
