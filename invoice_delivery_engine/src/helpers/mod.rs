mod po_extractor;

pub use po_extractor::{extract_po_number, looks_like_invoice};
