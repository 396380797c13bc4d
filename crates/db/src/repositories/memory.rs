use std::collections::HashMap;

use tokio::sync::RwLock;

use devolucion_core::dashboard::RefundFilter;
use devolucion_core::domain::activity::ActivityEntry;
use devolucion_core::domain::refund::{Folio, RefundRequest, RefundRequestId};
use devolucion_core::lifecycle::TransitionOutcome;

use super::{RefundRepository, RepositoryError};

#[derive(Default)]
struct Store {
    requests: HashMap<String, RefundRequest>,
    activity: Vec<ActivityEntry>,
}

/// Same contract as the SQL store, with one lock guarding requests and log together.
#[derive(Default)]
pub struct InMemoryRefundRepository {
    store: RwLock<Store>,
}

#[async_trait::async_trait]
impl RefundRepository for InMemoryRefundRepository {
    async fn find_by_id(
        &self,
        id: &RefundRequestId,
    ) -> Result<Option<RefundRequest>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store.requests.get(&id.0).cloned())
    }

    async fn find_by_folio(&self, folio: &Folio) -> Result<Option<RefundRequest>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store.requests.values().find(|request| request.folio == *folio).cloned())
    }

    async fn list(&self, filter: &RefundFilter) -> Result<Vec<RefundRequest>, RepositoryError> {
        let store = self.store.read().await;
        let mut requests: Vec<RefundRequest> =
            store.requests.values().filter(|request| filter.matches(request)).cloned().collect();
        requests.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| left.folio.0.cmp(&right.folio.0))
        });
        Ok(requests)
    }

    async fn list_activity(
        &self,
        id: &RefundRequestId,
    ) -> Result<Vec<ActivityEntry>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store.activity.iter().filter(|entry| entry.refund_request_id == *id).cloned().collect())
    }

    async fn create(
        &self,
        request: &RefundRequest,
        activity: &ActivityEntry,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        if store.requests.values().any(|existing| existing.folio == request.folio) {
            return Err(RepositoryError::DuplicateFolio(request.folio.0.clone()));
        }
        store.requests.insert(request.id.0.clone(), request.clone());
        store.activity.push(activity.clone());
        Ok(())
    }

    async fn commit_transition(&self, outcome: &TransitionOutcome) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        let current = store.requests.get(&outcome.request.id.0).map(|request| request.status);
        if current != Some(outcome.from) {
            return Err(RepositoryError::ConcurrentModification {
                id: outcome.request.id.clone(),
                expected: outcome.from,
            });
        }
        store.requests.insert(outcome.request.id.0.clone(), outcome.request.clone());
        store.activity.push(outcome.activity.clone());
        Ok(())
    }
}
