use std::str::FromStr;

use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;

use devolucion_core::dashboard::{RefundCard, RefundFilter};
use devolucion_core::domain::activity::ActivityEntry;
use devolucion_core::domain::refund::{NewRefundRequest, RefundRequest, RefundStatus, RefundType};
use devolucion_core::errors::{ApplicationError, DomainError};
use devolucion_core::lifecycle::Transition;
use devolucion_core::vocabulary::{status_options, type_options, SelectOption};

use crate::commands::{application_failure, with_service, CommandResult};

#[derive(Debug, Args)]
pub struct CreateArgs {
    #[arg(long, help = "Taxpayer that owns the request")]
    pub owner: String,
    #[arg(long = "type", help = "Refund type code, e.g. sueldos_salarios")]
    pub refund_type: String,
    #[arg(long, help = "Fiscal year the refund refers to")]
    pub year: i32,
    #[arg(long, help = "Tax period within the year, e.g. anual or 03")]
    pub period: String,
    #[arg(long, help = "Requested amount in MXN")]
    pub amount: String,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Debug, Args)]
pub struct TransitionArgs {
    #[arg(help = "Folio or id of the request")]
    pub reference: String,
    #[arg(help = "Target status code")]
    pub status: String,
    #[arg(long, default_value = "cli", help = "Who performed the change")]
    pub actor: String,
    #[arg(long, help = "Approved amount in MXN; only valid when approving")]
    pub approved_amount: Option<String>,
    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Debug, Default, Args)]
pub struct FilterArgs {
    #[arg(long)]
    pub owner: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long = "type")]
    pub refund_type: Option<String>,
    #[arg(long)]
    pub year: Option<i32>,
    #[arg(long, help = "Case-insensitive match on folio or description")]
    pub search: Option<String>,
}

impl FilterArgs {
    fn into_filter(self) -> Result<RefundFilter, DomainError> {
        Ok(RefundFilter {
            owner_id: self.owner,
            status: self.status.as_deref().map(RefundStatus::parse).transpose()?,
            refund_type: self.refund_type.as_deref().map(RefundType::parse).transpose()?,
            tax_year: self.year,
            search: self.search,
        })
    }
}

#[derive(Debug, Serialize)]
struct RefundDetail {
    label: &'static str,
    progress: u8,
    allowed_transitions: Vec<&'static str>,
    request: RefundRequest,
    timeline: Vec<ActivityEntry>,
}

#[derive(Debug, Serialize)]
struct TransitionView {
    from: RefundStatus,
    to: RefundStatus,
    label: &'static str,
    progress: u8,
    request: RefundRequest,
    activity: ActivityEntry,
}

#[derive(Debug, Serialize)]
struct Vocabulary {
    statuses: Vec<SelectOption>,
    refund_types: Vec<SelectOption>,
}

pub fn create(args: CreateArgs) -> CommandResult {
    const COMMAND: &str = "create";

    let refund_type = match RefundType::parse(&args.refund_type) {
        Ok(refund_type) => refund_type,
        Err(error) => return application_failure(COMMAND, error.into()),
    };
    let requested_amount = match parse_amount("amount", &args.amount) {
        Ok(amount) => amount,
        Err(error) => return application_failure(COMMAND, error.into()),
    };
    let new = NewRefundRequest {
        owner_id: args.owner,
        refund_type,
        tax_year: args.year,
        tax_period: args.period,
        requested_amount,
        description: args.description,
    };

    with_service(COMMAND, move |service| async move {
        let request = service.create_request(new).await?;
        let message = format!("created refund request {}", request.folio);
        Ok::<_, ApplicationError>(CommandResult::success_with_data(COMMAND, message, request))
    })
}

pub fn transition(args: TransitionArgs) -> CommandResult {
    const COMMAND: &str = "transition";

    let status = match RefundStatus::parse(&args.status) {
        Ok(status) => status,
        Err(error) => return application_failure(COMMAND, error.into()),
    };
    let mut transition = Transition::to(status, args.actor);
    if let Some(raw) = args.approved_amount.as_deref() {
        match parse_amount("approved_amount", raw) {
            Ok(amount) => transition = transition.with_approved_amount(amount),
            Err(error) => return application_failure(COMMAND, error.into()),
        }
    }
    if let Some(note) = args.note {
        transition = transition.with_note(note);
    }
    let reference = args.reference;

    with_service(COMMAND, move |service| async move {
        let outcome = service.update_refund_status(&reference, transition).await?;
        let request = outcome.request;
        let message = format!(
            "{} moved from {} to {}",
            request.folio,
            outcome.from.as_str(),
            request.status.as_str()
        );
        let view = TransitionView {
            from: outcome.from,
            to: request.status,
            label: request.status.label(),
            progress: request.status.progress(),
            request,
            activity: outcome.activity,
        };
        Ok::<_, ApplicationError>(CommandResult::success_with_data(COMMAND, message, view))
    })
}

pub fn show(reference: String) -> CommandResult {
    const COMMAND: &str = "show";

    with_service(COMMAND, move |service| async move {
        let request = service.find(&reference).await?;
        let timeline = service.timeline(&request.id.0).await?;
        let detail = RefundDetail {
            label: request.status.label(),
            progress: request.status.progress(),
            allowed_transitions: request
                .status
                .allowed_transitions()
                .iter()
                .map(|status| status.as_str())
                .collect(),
            request,
            timeline,
        };
        let message = format!("{} is {}", detail.request.folio, detail.label);
        Ok::<_, ApplicationError>(CommandResult::success_with_data(COMMAND, message, detail))
    })
}

pub fn list(args: FilterArgs) -> CommandResult {
    const COMMAND: &str = "list";

    let filter = match args.into_filter() {
        Ok(filter) => filter,
        Err(error) => return application_failure(COMMAND, error.into()),
    };

    with_service(COMMAND, move |service| async move {
        let cards: Vec<RefundCard> =
            service.list(&filter).await?.iter().map(RefundCard::from).collect();
        let message = format!("{} refund request(s)", cards.len());
        Ok::<_, ApplicationError>(CommandResult::success_with_data(COMMAND, message, cards))
    })
}

pub fn summary(owner: Option<String>) -> CommandResult {
    const COMMAND: &str = "summary";

    let filter = RefundFilter { owner_id: owner, ..RefundFilter::default() };
    with_service(COMMAND, move |service| async move {
        let dashboard = service.dashboard(&filter).await?;
        let message = format!(
            "{} request(s), {} active",
            dashboard.summary.total, dashboard.summary.active
        );
        Ok::<_, ApplicationError>(CommandResult::success_with_data(COMMAND, message, dashboard))
    })
}

pub fn vocabulary() -> CommandResult {
    CommandResult::success_with_data(
        "vocabulary",
        "refund statuses and types",
        Vocabulary { statuses: status_options(), refund_types: type_options() },
    )
}

fn parse_amount(field: &str, raw: &str) -> Result<Decimal, DomainError> {
    Decimal::from_str(raw.trim()).map_err(|error| {
        DomainError::InvariantViolation(format!("{field} `{raw}` is not a valid amount: {error}"))
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use devolucion_core::domain::refund::{RefundStatus, RefundType};
    use devolucion_core::errors::DomainError;

    use super::{parse_amount, FilterArgs};

    #[test]
    fn filter_args_parse_codes_into_typed_filter() {
        let filter = FilterArgs {
            owner: Some("u-1".to_owned()),
            status: Some("en_proceso".to_owned()),
            refund_type: Some("honorarios".to_owned()),
            year: Some(2024),
            search: None,
        }
        .into_filter()
        .expect("valid filter");

        assert_eq!(filter.status, Some(RefundStatus::EnProceso));
        assert_eq!(filter.refund_type, Some(RefundType::Honorarios));
        assert_eq!(filter.tax_year, Some(2024));
    }

    #[test]
    fn filter_args_reject_unknown_status() {
        let error = FilterArgs { status: Some("pendiente".to_owned()), ..FilterArgs::default() }
            .into_filter()
            .expect_err("unknown status");

        assert_eq!(error, DomainError::UnknownStatus("pendiente".to_owned()));
    }

    #[test]
    fn parse_amount_accepts_decimal_text() {
        assert_eq!(parse_amount("amount", " 1500.50 ").expect("amount"), Decimal::new(150_050, 2));
        assert!(parse_amount("amount", "mil pesos").is_err());
    }
}
