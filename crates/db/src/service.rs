use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use devolucion_core::dashboard::{DashboardSummary, RefundCard, RefundFilter};
use devolucion_core::domain::activity::ActivityEntry;
use devolucion_core::domain::refund::{
    Folio, NewRefundRequest, RefundRequest, RefundRequestId, RefundStatus,
};
use devolucion_core::errors::ApplicationError;
use devolucion_core::folio::{FolioGenerator, RandomFolioGenerator};
use devolucion_core::lifecycle::{apply_transition, LifecyclePolicy, Transition, TransitionOutcome};

use crate::repositories::{RefundRepository, RepositoryError};

pub const MAX_FOLIO_ATTEMPTS: usize = 5;

#[derive(Clone, Debug, Serialize)]
pub struct Dashboard {
    pub summary: DashboardSummary,
    pub cards: Vec<RefundCard>,
}

/// Creates refund requests and runs status updates against a repository.
pub struct RefundService<R, G = RandomFolioGenerator> {
    repository: R,
    folios: G,
    policy: LifecyclePolicy,
}

impl<R, G> RefundService<R, G>
where
    R: RefundRepository,
    G: FolioGenerator,
{
    pub fn new(repository: R, folios: G, policy: LifecyclePolicy) -> Self {
        Self { repository, folios, policy }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub async fn create_request(
        &self,
        new: NewRefundRequest,
    ) -> Result<RefundRequest, ApplicationError> {
        for attempt in 1..=MAX_FOLIO_ATTEMPTS {
            let folio = self.folios.next_folio(new.tax_year);
            let (request, activity) = RefundRequest::create(new.clone(), folio, Utc::now())?;

            match self.repository.create(&request, &activity).await {
                Ok(()) => {
                    info!(
                        event_name = "refund.request_created",
                        folio = %request.folio,
                        refund_id = %request.id.0,
                        owner_id = %request.owner_id,
                        refund_type = request.refund_type.as_str(),
                        "refund request created"
                    );
                    return Ok(request);
                }
                Err(RepositoryError::DuplicateFolio(folio)) => {
                    warn!(
                        event_name = "refund.folio_collision",
                        folio = %folio,
                        attempt,
                        "generated folio already in use; retrying"
                    );
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(ApplicationError::Persistence(format!(
            "could not allocate a unique folio after {MAX_FOLIO_ATTEMPTS} attempts"
        )))
    }

    /// Looks a request up by folio first, then by id.
    pub async fn find(&self, reference: &str) -> Result<RefundRequest, ApplicationError> {
        let reference = reference.trim();
        if let Some(request) = self.repository.find_by_folio(&Folio(reference.to_owned())).await? {
            return Ok(request);
        }
        self.repository
            .find_by_id(&RefundRequestId(reference.to_owned()))
            .await?
            .ok_or_else(|| ApplicationError::NotFound(reference.to_owned()))
    }

    /// Applies a status change and persists it together with its activity entry.
    ///
    /// A storage conflict is retried once, and only while the request still has
    /// the status the caller first read. A request that moved on in the
    /// meantime is reported as a concurrent modification, never overwritten.
    pub async fn update_refund_status(
        &self,
        reference: &str,
        transition: Transition,
    ) -> Result<TransitionOutcome, ApplicationError> {
        let mut first_read: Option<RefundStatus> = None;

        loop {
            let current = self.find(reference).await?;
            if let Some(expected) = first_read {
                if current.status != expected {
                    warn!(
                        event_name = "refund.concurrent_modification",
                        folio = %current.folio,
                        expected = expected.as_str(),
                        found = current.status.as_str(),
                        "refund moved on since it was read; not retrying"
                    );
                    return Err(ApplicationError::ConcurrentModification {
                        id: current.id.0,
                        expected,
                    });
                }
            }

            let outcome =
                match apply_transition(&current, transition.clone(), &self.policy, Utc::now()) {
                    Ok(outcome) => outcome,
                    Err(error) => {
                        warn!(
                            event_name = "refund.transition_rejected",
                            folio = %current.folio,
                            from = current.status.as_str(),
                            to = transition.to.as_str(),
                            actor = %transition.actor,
                            error = %error,
                            "refund status transition rejected"
                        );
                        return Err(error.into());
                    }
                };

            match self.repository.commit_transition(&outcome).await {
                Ok(()) => {
                    info!(
                        event_name = "refund.status_updated",
                        folio = %outcome.request.folio,
                        from = outcome.from.as_str(),
                        to = outcome.request.status.as_str(),
                        progress = outcome.request.status.progress(),
                        actor = %outcome.activity.actor,
                        "refund status updated"
                    );
                    return Ok(outcome);
                }
                Err(RepositoryError::ConcurrentModification { id, expected })
                    if first_read.is_none() =>
                {
                    warn!(
                        event_name = "refund.concurrent_modification",
                        folio = %current.folio,
                        refund_id = %id,
                        expected = expected.as_str(),
                        "refund write conflicted; retrying once"
                    );
                    first_read = Some(current.status);
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    pub async fn timeline(&self, reference: &str) -> Result<Vec<ActivityEntry>, ApplicationError> {
        let request = self.find(reference).await?;
        Ok(self.repository.list_activity(&request.id).await?)
    }

    pub async fn list(
        &self,
        filter: &RefundFilter,
    ) -> Result<Vec<RefundRequest>, ApplicationError> {
        Ok(self.repository.list(filter).await?)
    }

    pub async fn dashboard(&self, filter: &RefundFilter) -> Result<Dashboard, ApplicationError> {
        let requests = self.repository.list(filter).await?;
        Ok(Dashboard {
            summary: DashboardSummary::from_requests(&requests),
            cards: requests.iter().map(RefundCard::from).collect(),
        })
    }
}
