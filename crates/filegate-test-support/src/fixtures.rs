//! Upload fixtures shaped like real customer batches.

use filegate_batch::FileTypeRegistry;

/// Customer and container used by the fixtures.
pub const CUSTOMER: &str = "acme";
/// Batch identity used by the fixtures.
pub const BATCH_PREFIX: &str = "acme_20230601_0930";

/// Object key for one file of the fixture batch.
#[must_use]
pub fn upload_key(file_type: &str) -> String {
    format!("{CUSTOMER}/inbound/{BATCH_PREFIX}_{file_type}.csv")
}

/// A CSV body with `rows` records of `columns` quoted values each.
#[must_use]
pub fn quoted_csv(columns: usize, rows: usize) -> String {
    let mut body = String::new();
    for row in 0..rows {
        let record: Vec<String> = (0..columns).map(|col| format!("\"r{row}c{col}\"")).collect();
        body.push_str(&record.join(","));
        body.push_str("\r\n");
    }
    body
}

/// Every file of a structurally valid batch under `registry`, as `(key, body)`.
#[must_use]
pub fn complete_batch(registry: &FileTypeRegistry) -> Vec<(String, String)> {
    registry
        .expected()
        .iter()
        .filter_map(|file_type| {
            registry
                .column_count(file_type)
                .ok()
                .map(|columns| (upload_key(file_type), quoted_csv(columns.get(), 3)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_csv_shapes_records() {
        assert_eq!(quoted_csv(2, 2), "\"r0c0\",\"r0c1\"\r\n\"r1c0\",\"r1c1\"\r\n");
        assert!(quoted_csv(3, 0).is_empty());
    }

    #[test]
    fn complete_batch_covers_the_expected_set() {
        let registry = FileTypeRegistry::default();
        let batch = complete_batch(&registry);
        assert_eq!(batch.len(), registry.expected().len());
        assert!(
            batch
                .iter()
                .any(|(key, _)| key == "acme/inbound/acme_20230601_0930_type9.csv")
        );
    }
}
