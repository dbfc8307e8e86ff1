//! CSV artifact rendering and naming.

use std::fmt::Write as _;

use chrono::NaiveDateTime;

use crate::pipeline::types::{ArtifactDocument, ArtifactId, InventoryRecord};

/// Header row, trailing comma included.
pub const CSV_HEADER: &str = "SKU,UPC,EAN,QUANTITY_AVAILABLE,STATUS,";

/// Fixed quantity written for every discontinued item.
pub const QUANTITY_AVAILABLE: u32 = 0;

/// Fixed status written for every item.
pub const STATUS: &str = "discontinued";

/// Build the artifact for `records` generated at `generated_at`.
pub fn build_artifact(records: Vec<InventoryRecord>, generated_at: NaiveDateTime) -> ArtifactDocument {
    let body = render_csv(&records);
    ArtifactDocument {
        id: ArtifactId::from_timestamp(generated_at),
        records,
        body,
    }
}

/// Render records as CSV. Depends on nothing but `records`.
pub fn render_csv(records: &[InventoryRecord]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + records.len() * 40);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for record in records {
        let _ = writeln!(
            out,
            "{code},{code},,{QUANTITY_AVAILABLE},{STATUS},",
            code = record.code
        );
    }
    out
}
