//! Human-facing document numbers. Sequences are allocated by the store.

use chrono::NaiveDate;

/// `INV-YYYYMMDD-NNNN`.
pub fn invoice_number(date: NaiveDate, sequence: u32) -> String {
    format!("INV-{}-{:04}", date.format("%Y%m%d"), sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_the_daily_sequence() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        assert_eq!(invoice_number(date, 3), "INV-20250107-0003");
        assert_eq!(invoice_number(date, 12345), "INV-20250107-12345");
    }
}
