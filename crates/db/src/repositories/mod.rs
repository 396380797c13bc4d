use async_trait::async_trait;
use thiserror::Error;

use devolucion_core::dashboard::RefundFilter;
use devolucion_core::domain::activity::ActivityEntry;
use devolucion_core::domain::refund::{Folio, RefundRequest, RefundRequestId, RefundStatus};
use devolucion_core::errors::{ApplicationError, DomainError};
use devolucion_core::lifecycle::TransitionOutcome;

pub mod memory;
pub mod refund;

pub use memory::InMemoryRefundRepository;
pub use refund::SqlRefundRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("stored data violates the domain vocabulary: {0}")]
    InvalidData(#[from] DomainError),
    #[error("folio `{0}` is already in use")]
    DuplicateFolio(String),
    #[error("refund request {id} no longer has status {expected}")]
    ConcurrentModification { id: RefundRequestId, expected: RefundStatus },
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::InvalidData(error) => {
                ApplicationError::Persistence(format!("stored refund data is corrupt: {error}"))
            }
            RepositoryError::ConcurrentModification { id, expected } => {
                ApplicationError::ConcurrentModification { id: id.0, expected }
            }
            other => ApplicationError::Persistence(other.to_string()),
        }
    }
}

/// Storage collaborator for refund requests and their activity timeline.
///
/// Writes are all-or-nothing: a request is never stored without its matching
/// activity entry, and a transition only commits while the stored status
/// still equals the status it was computed from.
#[async_trait]
pub trait RefundRepository: Send + Sync {
    async fn find_by_id(&self, id: &RefundRequestId)
        -> Result<Option<RefundRequest>, RepositoryError>;

    async fn find_by_folio(&self, folio: &Folio) -> Result<Option<RefundRequest>, RepositoryError>;

    /// Newest first.
    async fn list(&self, filter: &RefundFilter) -> Result<Vec<RefundRequest>, RepositoryError>;

    /// Insertion order.
    async fn list_activity(
        &self,
        id: &RefundRequestId,
    ) -> Result<Vec<ActivityEntry>, RepositoryError>;

    async fn create(
        &self,
        request: &RefundRequest,
        activity: &ActivityEntry,
    ) -> Result<(), RepositoryError>;

    async fn commit_transition(&self, outcome: &TransitionOutcome) -> Result<(), RepositoryError>;
}
