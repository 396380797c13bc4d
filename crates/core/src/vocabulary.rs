use serde::Serialize;

use crate::domain::refund::{RefundStatus, RefundType};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub code: &'static str,
    pub label: &'static str,
}

pub fn status_options() -> Vec<SelectOption> {
    RefundStatus::ALL
        .iter()
        .map(|status| SelectOption { code: status.as_str(), label: status.label() })
        .collect()
}

pub fn type_options() -> Vec<SelectOption> {
    RefundType::ALL
        .iter()
        .map(|refund_type| SelectOption { code: refund_type.as_str(), label: refund_type.label() })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::domain::refund::RefundStatus;
    use crate::lifecycle::label_for;

    use super::{status_options, type_options};

    #[test]
    fn status_options_follow_the_lifecycle_vocabulary() {
        let options = status_options();
        assert_eq!(options.len(), RefundStatus::ALL.len());
        assert_eq!(options[0].code, "borrador");
        for option in &options {
            assert_eq!(label_for(option.code), Ok(option.label));
        }
    }

    #[test]
    fn type_options_are_complete() {
        let codes: Vec<&str> = type_options().iter().map(|option| option.code).collect();
        assert_eq!(
            codes,
            vec!["sueldos_salarios", "honorarios", "arrendamiento", "personas_morales", "otros"]
        );
    }
}
