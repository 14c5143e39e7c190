//! CSV and HTML renderings of a processed price table.

use chrono::{DateTime, Utc};

pub mod csv_export;
pub mod error;
pub mod html;

pub use csv_export::{export_all, CsvFiles};
pub use error::ReportError;
pub use html::render_html_report;

/// File name stem shared by every artifact of one report:
/// `report_{SYMBOLS}_{YYYYMMDD_HHMMSS}_{fingerprint}`.
pub fn report_base_name(symbols: &[String], at: DateTime<Utc>, fingerprint: &str) -> String {
    let joined: String = symbols
        .join("_")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
        .collect();
    format!("report_{}_{}_{}", joined, at.format("%Y%m%d_%H%M%S"), fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_report_base_name() {
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let name = report_base_name(&["AAPL".into(), "^GSPC".into(), "BF.B".into()], at, "abc123");
        assert_eq!(name, "report_AAPL_-GSPC_BF-B_20240506_070809_abc123");
    }
}
