//! Human-readable reference codes such as `INV-20260223-8D7E2A4C55A1`.

use chrono::{DateTime, Utc};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodePrefix {
    InvoiceCycle,
    Invoice,
    ReceiptLot,
    Intake,
    HarvestBatch,
    HarvestLot,
    DispatchTrip,
}

impl CodePrefix {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvoiceCycle => "IC",
            Self::Invoice => "INV",
            Self::ReceiptLot => "CRL",
            Self::Intake => "PIE",
            Self::HarvestBatch => "HB",
            Self::HarvestLot => "LOT",
            Self::DispatchTrip => "DT",
        }
    }
}

const SUFFIX_LEN: usize = 12;

/// `PREFIX-YYYYMMDD-XXXXXXXXXXXX` where the date is the business date of the
/// record and the suffix is the first 48 bits of the record id in upper hex.
/// Records created on the same day share the date part, so distinct ids must
/// yield distinct suffixes.
pub fn reference_code(prefix: CodePrefix, date: DateTime<Utc>, record_id: &str) -> String {
    let suffix = record_id
        .chars()
        .filter(char::is_ascii_hexdigit)
        .take(SUFFIX_LEN)
        .collect::<String>()
        .to_ascii_uppercase();
    format!("{}-{}-{suffix}", prefix.as_str(), date.format("%Y%m%d"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{TimeZone, Utc};

    use super::{reference_code, CodePrefix};
    use crate::domain::values::new_id;

    #[test]
    fn code_carries_prefix_business_date_and_id_suffix() {
        let date = Utc.with_ymd_and_hms(2026, 2, 23, 0, 0, 0).single().expect("date");
        let code =
            reference_code(CodePrefix::Invoice, date, "8d7e2a4c-55a1-4c1b-9a7e-0d2f1b3c4e5f");

        assert_eq!(code, "INV-20260223-8D7E2A4C55A1");
    }

    #[test]
    fn same_day_codes_stay_distinct_across_many_records() {
        let date = Utc.with_ymd_and_hms(2026, 2, 23, 0, 0, 0).single().expect("date");

        let codes = (0..20_000)
            .map(|_| reference_code(CodePrefix::Invoice, date, &new_id()))
            .collect::<HashSet<_>>();

        assert_eq!(codes.len(), 20_000);
    }
}
