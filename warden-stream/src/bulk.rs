// SPDX-License-Identifier: MIT OR Apache-2.0

use warden_core::{BulkRow, VisibilitySet};

/// Rewrite a bulk-read response against a user's visibility.
///
/// Every row keeps its position: a document outside the set is replaced by a
/// [`BulkRow::Forbidden`] stub, never omitted, so callers relying on index
/// alignment with their key list stay correct. `NotFound` rows pass through
/// untouched — absence is not a secret.
pub fn filter_bulk_rows(rows: Vec<BulkRow>, visible: &VisibilitySet) -> Vec<BulkRow> {
    rows.into_iter()
        .map(|row| match row {
            BulkRow::Doc(doc) if !visible.contains(&doc.id) => {
                BulkRow::Forbidden { id: doc.id }
            }
            row => row,
        })
        .collect()
}
