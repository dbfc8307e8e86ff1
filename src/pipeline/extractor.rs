//! Fixed-width record extraction from report text.
//!
//! A record line looks like `0 12345 12345 6 P  DESCRIPTION`: four digit
//! groups of widths 1, 5, 5, 1, then whitespace and a literal `P`. Every
//! other line is ignored.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::pipeline::types::InventoryRecord;

static RECORD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([0-9]\s+[0-9]{5}\s+[0-9]{5}\s+[0-9])\s+P").expect("record pattern compiles")
});

/// Extract records from body text, in line order.
pub fn extract_records(text: &str) -> Vec<InventoryRecord> {
    let records: Vec<InventoryRecord> = text.lines().filter_map(parse_line).collect();
    debug!(records = records.len(), "Extracted inventory records");
    records
}

/// Parse a single line. `None` when the line is not a record.
pub fn parse_line(line: &str) -> Option<InventoryRecord> {
    let caps = RECORD_LINE.captures(line)?;
    let code: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
    Some(InventoryRecord::new(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(text: &str) -> Vec<String> {
        extract_records(text).into_iter().map(|r| r.code).collect()
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(extract_records("").is_empty());
    }

    #[test]
    fn boundary_line_matches() {
        let rec = parse_line("1 12345 12345 6 P extra").unwrap();
        assert_eq!(rec.code, "112345123456");
    }

    #[test]
    fn short_second_group_does_not_match() {
        assert!(parse_line("1 1234 12345 6 P extra").is_none());
    }

    #[test]
    fn long_group_does_not_match() {
        assert!(parse_line("12 12345 12345 6 P").is_none());
        assert!(parse_line("1 123456 12345 6 P").is_none());
    }

    #[test]
    fn missing_p_marker_does_not_match() {
        assert!(parse_line("1 12345 12345 6 X").is_none());
        assert!(parse_line("1 12345 12345 6").is_none());
        assert!(parse_line("1 12345 12345 6P").is_none());
    }

    #[test]
    fn leading_whitespace_and_tabs_allowed() {
        let rec = parse_line("   \t0\t12345  12345 \t6   P  ITEM").unwrap();
        assert_eq!(rec.code, "012345123456");
    }

    #[test]
    fn match_is_anchored_at_line_start() {
        assert!(parse_line("SKU 1 12345 12345 6 P").is_none());
    }

    #[test]
    fn non_ascii_digits_rejected() {
        assert!(parse_line("١ 12345 12345 6 P").is_none());
    }

    #[test]
    fn mixed_report_keeps_line_order() {
        let text = "0 12345 12345 6 P  ITEM\nnot a match\n1 00000 00001 2 P ITEM2\n";
        assert_eq!(codes(text), vec!["012345123456", "100000000012"]);
    }

    #[test]
    fn crlf_line_endings() {
        let text = "HEADER\r\n  3 11111 22222 4 P  WIDGET\r\n9 99999 99999 9 P\r\n";
        assert_eq!(codes(text), vec!["311111222224", "999999999999"]);
    }

    #[test]
    fn duplicate_lines_are_kept() {
        let text = "5 55555 55555 5 P\n5 55555 55555 5 P\n";
        assert_eq!(codes(text).len(), 2);
    }
}
