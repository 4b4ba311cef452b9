use std::sync::OnceLock;

use regex::Regex;

use crate::types::PoNumber;

// Evaluated in order; first capture wins. The order matters: `invoice_1030.pdf` must yield 1030 via the first
// pattern, not whatever the bare `(\d+)\.pdf$` rule would grab.
const PO_PATTERNS: [&str; 4] = [r"(?i)invoice[_-](\d+)", r"(?i)(\d+)\.pdf$", r"(?i)invoice(\d+)", r"(?i)(\d+)[_-]invoice"];

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| PO_PATTERNS.iter().map(|p| Regex::new(p).unwrap()).collect())
}

/// The cheap prefilter applied to every listed object before any pattern matching: a candidate filename either ends
/// in `.pdf` or contains "invoice", case-insensitively. Everything else is skipped without further inspection.
pub fn looks_like_invoice(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    lower.ends_with(".pdf") || lower.contains("invoice")
}

/// Extracts a candidate PO number from an object filename. Extraction is advisory only; the expected-invoice
/// registry is the authority on whether the candidate means anything.
pub fn extract_po_number(filename: &str) -> Option<PoNumber> {
    patterns()
        .iter()
        .find_map(|re| re.captures(filename).and_then(|c| c.get(1)))
        .map(|m| m.as_str().to_string().into())
}
