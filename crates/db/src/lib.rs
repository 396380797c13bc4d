pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod service;

pub use connection::{connect_with_config, connect_with_settings, DbPool};
pub use repositories::{
    InMemoryRefundRepository, RefundRepository, RepositoryError, SqlRefundRepository,
};
pub use service::{Dashboard, RefundService};
