use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::activity::{ActivityEntry, ActivityType};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefundRequestId(pub String);

impl RefundRequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RefundRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-facing reference for a refund request, analogous to an order number.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Folio(pub String);

impl fmt::Display for Folio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a refund request. Declaration order is lifecycle order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Borrador,
    Enviado,
    EnProceso,
    Aprobado,
    Completado,
    Rechazado,
}

impl RefundStatus {
    pub const ALL: [RefundStatus; 6] = [
        Self::Borrador,
        Self::Enviado,
        Self::EnProceso,
        Self::Aprobado,
        Self::Completado,
        Self::Rechazado,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Borrador => "borrador",
            Self::Enviado => "enviado",
            Self::EnProceso => "en_proceso",
            Self::Aprobado => "aprobado",
            Self::Completado => "completado",
            Self::Rechazado => "rechazado",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "borrador" => Ok(Self::Borrador),
            "enviado" => Ok(Self::Enviado),
            "en_proceso" => Ok(Self::EnProceso),
            "aprobado" => Ok(Self::Aprobado),
            "completado" => Ok(Self::Completado),
            "rechazado" => Ok(Self::Rechazado),
            _ => Err(DomainError::UnknownStatus(value.to_owned())),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Borrador => "Borrador",
            Self::Enviado => "Enviado",
            Self::EnProceso => "En Proceso",
            Self::Aprobado => "Aprobado",
            Self::Completado => "Completado",
            Self::Rechazado => "Rechazado",
        }
    }

    /// Completion percentage shown on progress bars. Depends on status only.
    pub fn progress(&self) -> u8 {
        match self {
            Self::Borrador => 10,
            Self::Enviado => 25,
            Self::EnProceso => 65,
            Self::Aprobado => 90,
            Self::Completado => 100,
            Self::Rechazado => 0,
        }
    }

    pub fn allowed_transitions(&self) -> &'static [RefundStatus] {
        match self {
            Self::Borrador => &[Self::Enviado, Self::Rechazado],
            Self::Enviado => &[Self::EnProceso, Self::Rechazado],
            Self::EnProceso => &[Self::Aprobado, Self::Rechazado],
            Self::Aprobado => &[Self::Completado, Self::Rechazado],
            Self::Completado | Self::Rechazado => &[],
        }
    }

    pub fn can_transition_to(&self, next: RefundStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completado | Self::Rechazado)
    }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RefundStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

/// Fiscal category a refund is claimed under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundType {
    SueldosSalarios,
    Honorarios,
    Arrendamiento,
    PersonasMorales,
    Otros,
}

impl RefundType {
    pub const ALL: [RefundType; 5] = [
        Self::SueldosSalarios,
        Self::Honorarios,
        Self::Arrendamiento,
        Self::PersonasMorales,
        Self::Otros,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SueldosSalarios => "sueldos_salarios",
            Self::Honorarios => "honorarios",
            Self::Arrendamiento => "arrendamiento",
            Self::PersonasMorales => "personas_morales",
            Self::Otros => "otros",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sueldos_salarios" => Ok(Self::SueldosSalarios),
            "honorarios" => Ok(Self::Honorarios),
            "arrendamiento" => Ok(Self::Arrendamiento),
            "personas_morales" => Ok(Self::PersonasMorales),
            "otros" => Ok(Self::Otros),
            _ => Err(DomainError::UnknownRefundType(value.to_owned())),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::SueldosSalarios => "Sueldos y Salarios",
            Self::Honorarios => "Honorarios",
            Self::Arrendamiento => "Arrendamiento",
            Self::PersonasMorales => "Personas Morales (IVA)",
            Self::Otros => "Otros",
        }
    }
}

impl fmt::Display for RefundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RefundType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRefundRequest {
    pub owner_id: String,
    pub refund_type: RefundType,
    pub tax_year: i32,
    pub tax_period: String,
    pub requested_amount: Decimal,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub id: RefundRequestId,
    pub folio: Folio,
    pub owner_id: String,
    pub status: RefundStatus,
    pub refund_type: RefundType,
    pub tax_year: i32,
    pub tax_period: String,
    pub requested_amount: Decimal,
    pub approved_amount: Decimal,
    pub description: Option<String>,
    pub submission_date: Option<DateTime<Utc>>,
    pub completion_date: Option<DateTime<Utc>>,
    pub estimated_completion_date: Option<DateTime<Utc>>,
    pub documents_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const EARLIEST_TAX_YEAR: i32 = 2000;

impl RefundRequest {
    /// Builds a draft request and the activity entry that records its creation.
    pub fn create(
        new: NewRefundRequest,
        folio: Folio,
        now: DateTime<Utc>,
    ) -> Result<(Self, ActivityEntry), DomainError> {
        if new.owner_id.trim().is_empty() {
            return Err(DomainError::InvariantViolation("owner_id is required".to_owned()));
        }
        if new.tax_period.trim().is_empty() {
            return Err(DomainError::InvariantViolation("tax_period is required".to_owned()));
        }
        if new.requested_amount <= Decimal::ZERO {
            return Err(DomainError::InvariantViolation(format!(
                "requested_amount must be greater than zero, got {}",
                new.requested_amount
            )));
        }
        if new.tax_year < EARLIEST_TAX_YEAR || new.tax_year > now.year() {
            return Err(DomainError::InvariantViolation(format!(
                "tax_year must be in range {EARLIEST_TAX_YEAR}..={}, got {}",
                now.year(),
                new.tax_year
            )));
        }

        let request = Self {
            id: RefundRequestId::generate(),
            folio,
            owner_id: new.owner_id.trim().to_owned(),
            status: RefundStatus::Borrador,
            refund_type: new.refund_type,
            tax_year: new.tax_year,
            tax_period: new.tax_period.trim().to_owned(),
            requested_amount: new.requested_amount.round_dp(2),
            approved_amount: Decimal::ZERO,
            description: new
                .description
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
            submission_date: None,
            completion_date: None,
            estimated_completion_date: None,
            documents_count: 0,
            created_at: now,
            updated_at: now,
        };

        let activity = ActivityEntry::new(
            request.id.clone(),
            ActivityType::Created,
            format!("Solicitud creada con folio {}", request.folio),
            request.owner_id.clone(),
            now,
        )
        .with_metadata("folio", request.folio.0.clone())
        .with_metadata("status", request.status.as_str())
        .with_metadata("requested_amount", request.requested_amount.to_string());

        Ok((request, activity))
    }

    pub fn progress(&self) -> u8 {
        self.status.progress()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::domain::activity::ActivityType;
    use crate::errors::DomainError;

    use super::{Folio, NewRefundRequest, RefundRequest, RefundStatus, RefundType};

    fn new_request() -> NewRefundRequest {
        NewRefundRequest {
            owner_id: "user-1".to_owned(),
            refund_type: RefundType::SueldosSalarios,
            tax_year: 2024,
            tax_period: "anual".to_owned(),
            requested_amount: Decimal::new(1_250_055, 2),
            description: Some("  Saldo a favor ISR  ".to_owned()),
        }
    }

    #[test]
    fn status_codes_round_trip_from_storage_encoding() {
        for status in RefundStatus::ALL {
            assert_eq!(RefundStatus::parse(status.as_str()), Ok(status));
        }
        for refund_type in RefundType::ALL {
            assert_eq!(RefundType::parse(refund_type.as_str()), Ok(refund_type));
        }
    }

    #[test]
    fn unknown_codes_fail_loudly() {
        assert_eq!(
            RefundStatus::parse("pendiente"),
            Err(DomainError::UnknownStatus("pendiente".to_owned()))
        );
        assert_eq!(
            RefundType::parse("iva_exportacion"),
            Err(DomainError::UnknownRefundType("iva_exportacion".to_owned()))
        );
    }

    #[test]
    fn serde_uses_persisted_codes() {
        let encoded = serde_json::to_string(&RefundStatus::EnProceso).expect("serialize status");
        assert_eq!(encoded, "\"en_proceso\"");

        let decoded: RefundType =
            serde_json::from_str("\"personas_morales\"").expect("deserialize type");
        assert_eq!(decoded, RefundType::PersonasMorales);
    }

    #[test]
    fn create_builds_a_draft_with_creation_activity() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).single().expect("valid timestamp");
        let (request, activity) =
            RefundRequest::create(new_request(), Folio("DEV-2024-000042".to_owned()), now)
                .expect("valid draft");

        assert_eq!(request.status, RefundStatus::Borrador);
        assert_eq!(request.approved_amount, Decimal::ZERO);
        assert_eq!(request.description.as_deref(), Some("Saldo a favor ISR"));
        assert!(request.submission_date.is_none());
        assert!(request.completion_date.is_none());
        assert_eq!(request.progress(), 10);

        assert_eq!(activity.refund_request_id, request.id);
        assert_eq!(activity.activity_type, ActivityType::Created);
        assert_eq!(activity.timestamp, now);
        assert!(activity.description.contains("DEV-2024-000042"));
    }

    #[test]
    fn create_rejects_non_positive_amounts_and_future_years() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).single().expect("valid timestamp");

        let mut zero = new_request();
        zero.requested_amount = Decimal::ZERO;
        assert!(matches!(
            RefundRequest::create(zero, Folio("F-1".to_owned()), now),
            Err(DomainError::InvariantViolation(_))
        ));

        let mut future = new_request();
        future.tax_year = 2026;
        assert!(matches!(
            RefundRequest::create(future, Folio("F-2".to_owned()), now),
            Err(DomainError::InvariantViolation(ref message)) if message.contains("tax_year")
        ));

        let mut blank_owner = new_request();
        blank_owner.owner_id = "   ".to_owned();
        assert!(RefundRequest::create(blank_owner, Folio("F-3".to_owned()), now).is_err());
    }
}
