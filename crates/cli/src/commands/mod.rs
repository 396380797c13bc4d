pub mod config;
pub mod doctor;
pub mod migrate;
pub mod refund;

use std::future::Future;

use devolucion_core::config::{AppConfig, LoadOptions};
use devolucion_core::errors::{ApplicationError, InterfaceError};
use devolucion_core::folio::RandomFolioGenerator;
use devolucion_db::{connect_with_config, migrations, RefundService, SqlRefundRepository};
use serde::Serialize;
use serde_json::Value;

pub type SqlRefundService = RefundService<SqlRefundRepository, RandomFolioGenerator>;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::emit(command, "ok", None, message.into(), None, 0)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: impl Serialize,
    ) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self::emit(command, "ok", None, message.into(), Some(data), 0),
            Err(error) => Self::failure(
                command,
                "serialization",
                format!("could not serialize command output: {error}"),
                1,
            ),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::emit(command, "error", Some(error_class), message.into(), None, exit_code)
    }

    fn emit(
        command: &str,
        status: &str,
        error_class: Option<&str>,
        message: String,
        data: Option<Value>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: status.to_string(),
            error_class: error_class.map(str::to_string),
            message,
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Maps an application failure onto the CLI error classes and exit codes.
pub fn application_failure(command: &str, error: ApplicationError) -> CommandResult {
    let interface = error.into_interface(correlation_id());
    let (error_class, exit_code) = match &interface {
        InterfaceError::BadRequest { .. } => ("validation", 6),
        InterfaceError::NotFound { .. } => ("not_found", 7),
        InterfaceError::Conflict { .. } => ("conflict", 8),
        InterfaceError::ServiceUnavailable { .. } => ("persistence", 4),
        InterfaceError::Internal { .. } => ("internal", 1),
    };
    tracing::warn!(
        event_name = "cli.command_failed",
        command,
        error_class,
        correlation_id = interface.correlation_id(),
        error = %interface,
        "command failed"
    );
    CommandResult::failure(
        command,
        error_class,
        format!("{} ({interface})", interface.user_message()),
        exit_code,
    )
}

pub fn correlation_id() -> String {
    format!("cli-{}", std::process::id())
}

/// Loads config, opens the migrated database and hands a service to `action`.
pub fn with_service<F, Fut>(command: &str, action: F) -> CommandResult
where
    F: FnOnce(SqlRefundService) -> Fut,
    Fut: Future<Output = Result<CommandResult, ApplicationError>>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    runtime.block_on(async move {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return CommandResult::failure(command, "db_connectivity", error.to_string(), 4)
            }
        };
        if let Err(error) = migrations::run_pending(&pool).await {
            pool.close().await;
            return CommandResult::failure(command, "migration", error.to_string(), 5);
        }

        let service = RefundService::new(
            SqlRefundRepository::new(pool.clone()),
            RandomFolioGenerator::new(config.lifecycle.folio_prefix.clone()),
            config.lifecycle.policy(),
        );
        let result = match action(service).await {
            Ok(result) => result,
            Err(error) => application_failure(command, error),
        };
        pool.close().await;
        result
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
