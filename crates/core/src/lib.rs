pub mod config;
pub mod dashboard;
pub mod domain;
pub mod errors;
pub mod folio;
pub mod lifecycle;
pub mod vocabulary;

pub use dashboard::{DashboardSummary, RefundCard, RefundFilter};
pub use domain::activity::{ActivityEntry, ActivityId, ActivityType};
pub use domain::refund::{
    Folio, NewRefundRequest, RefundRequest, RefundRequestId, RefundStatus, RefundType,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use folio::{FolioGenerator, RandomFolioGenerator};
pub use lifecycle::{
    allowed_transitions, apply_transition, label_for, progress_for, LifecyclePolicy, Transition,
    TransitionOutcome,
};
