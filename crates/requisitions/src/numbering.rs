/// `TR-YYYY-NNNNNN`, sequence restarting every year.
pub fn requisition_number(year: i32, sequence: u32) -> String {
    format!("TR-{year}-{sequence:06}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_is_zero_padded_per_year() {
        assert_eq!(requisition_number(2025, 1), "TR-2025-000001");
        assert_eq!(requisition_number(2026, 123_456), "TR-2026-123456");
    }
}
