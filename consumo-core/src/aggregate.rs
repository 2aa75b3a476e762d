//! Fold categorized records into a [`SummaryDocument`].
//!
//! The aggregator is a plain value owned by one writer. Concurrent producers
//! must hand their results to that owner; nothing here is shared.

use chrono::{Local, NaiveDateTime};
use std::collections::BTreeMap;

use crate::model::{CategorizedRecord, round2};
use crate::summary::{CategoryBucket, CategorySummary, Metadata, MetadataSeed, SummaryDocument};
use crate::taxonomy::Category;

#[derive(Debug, Clone, Default)]
struct Bucket {
    total: f64,
    records: Vec<CategorizedRecord>,
}

/// Running per-category totals for one batch.
#[derive(Debug, Clone)]
pub struct CategoryAggregator {
    buckets: BTreeMap<Category, Bucket>,
    records: Vec<CategorizedRecord>,
    total: f64,
}

impl Default for CategoryAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl CategoryAggregator {
    /// All six buckets exist from the start, so an empty batch is still complete.
    pub fn new() -> Self {
        Self {
            buckets: Category::ALL.iter().map(|c| (*c, Bucket::default())).collect(),
            records: Vec::new(),
            total: 0.0,
        }
    }

    /// Fold one record. Error and unrecognised labels land in the catch-all bucket.
    pub fn push(&mut self, record: CategorizedRecord) {
        let amount = record.amount();
        self.total += amount;

        let bucket = self.buckets.entry(record.bucket()).or_default();
        bucket.total += amount;
        bucket.records.push(record.clone());

        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Build the document. Bucket totals are rounded once, here.
    pub fn finish(self, seed: MetadataSeed, processed_at: NaiveDateTime) -> SummaryDocument {
        let mut category_summary = BTreeMap::new();
        let mut records_by_category = BTreeMap::new();

        for (category, bucket) in self.buckets {
            let total = round2(bucket.total);
            let count = bucket.records.len();
            category_summary.insert(
                category,
                CategorySummary {
                    count,
                    total,
                    emoji: category.glyph().to_string(),
                },
            );
            records_by_category.insert(
                category,
                CategoryBucket {
                    emoji: category.glyph().to_string(),
                    total,
                    count,
                    records: bucket.records,
                },
            );
        }

        SummaryDocument {
            metadata: Metadata {
                processed_at,
                total_records: self.records.len(),
                total_amount: self.total,
                period: seed.period,
                source: seed.source,
            },
            category_summary,
            records_by_category,
            all_records: self.records,
        }
    }
}

/// Aggregate a whole batch, stamping the current local time.
pub fn aggregate(
    records: impl IntoIterator<Item = CategorizedRecord>,
    seed: MetadataSeed,
) -> SummaryDocument {
    let mut agg = CategoryAggregator::new();
    for r in records {
        agg.push(r);
    }
    agg.finish(seed, Local::now().naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CardType, ClassificationResult, TransactionCandidate};

    fn record(merchant: &str, amount: &str, label: &str) -> CategorizedRecord {
        CategorizedRecord::new(
            TransactionCandidate::new(merchant, amount, CardType::Credit, "", merchant, true),
            ClassificationResult::new(label, format!("{merchant} test")),
        )
    }

    #[test]
    fn test_empty_batch_has_all_buckets() {
        let d = aggregate(Vec::new(), MetadataSeed::default());
        assert_eq!(d.category_summary.len(), 6);
        assert_eq!(d.records_by_category.len(), 6);
        for c in Category::ALL {
            let s = &d.category_summary[&c];
            assert_eq!(s.count, 0);
            assert_eq!(s.total, 0.0);
            assert_eq!(s.emoji, c.glyph());
            assert!(d.records_by_category[&c].records.is_empty());
        }
        assert_eq!(d.metadata.total_records, 0);
        assert_eq!(d.metadata.total_amount, 0.0);
    }

    #[test]
    fn test_counts_and_totals() {
        let d = aggregate(
            vec![
                record("TAMBO", "S/ 10.10", "ALIMENTACIÓN"),
                record("RAPPI", "S/ 20.20", "ALIMENTACIÓN"),
                record("PRIMAX", "S/ 100.00", "TRANSPORTE"),
                record("???", "N/A", "COMPRAS"),
            ],
            MetadataSeed::new(Some("2025-07-19T00:00:00Z"), "test"),
        );

        assert_eq!(d.category_summary[&Category::Alimentacion].count, 2);
        assert_eq!(d.category_summary[&Category::Alimentacion].total, 30.30);
        assert_eq!(d.category_summary[&Category::Transporte].total, 100.0);
        assert_eq!(d.category_summary[&Category::Compras].count, 1);
        assert_eq!(d.category_summary[&Category::Compras].total, 0.0);
        assert!((d.metadata.total_amount - 130.30).abs() < 1e-6);
        assert_eq!(d.metadata.period, "2025-07-19T00:00:00Z");
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_unrecognised_and_error_labels_go_to_catch_all() {
        let d = aggregate(
            vec![
                record("X", "S/ 5.00", "VIAJES"),
                record("Y", "S/ 7.00", "ERROR"),
                record("Z", "S/ 1.00", "BANCARIO"),
            ],
            MetadataSeed::default(),
        );
        let compras = &d.records_by_category[&Category::Compras];
        assert_eq!(compras.count, 2);
        assert_eq!(compras.total, 12.0);
        assert_eq!(d.all_records[0].category.to_string(), "VIAJES");
        assert!(d.all_records[1].category.is_error());

        let counts: usize = d.category_summary.values().map(|s| s.count).sum();
        assert_eq!(counts, d.all_records.len());
        assert_eq!(counts, d.metadata.total_records);
    }

    #[test]
    fn test_all_records_preserve_input_order() {
        let merchants = ["A", "B", "C", "D", "E"];
        let labels = ["SERVICIOS", "BANCARIO", "SERVICIOS", "ENTRETENIMIENTO", "COMPRAS"];
        let d = aggregate(
            merchants
                .iter()
                .zip(labels)
                .map(|(m, l)| record(m, "S/ 1.00", l)),
            MetadataSeed::default(),
        );
        let order: Vec<_> = d.all_records.iter().map(|r| r.candidate.merchant.as_str()).collect();
        assert_eq!(order, merchants);
    }

    #[test]
    fn test_round_once_after_summing() {
        // Three charges of 0.004 sum to 0.012 -> 0.01 when rounded once;
        // rounding each first would give 0.00.
        let d = aggregate(
            (0..3).map(|i| record(&format!("M{i}"), "S/ 0.004", "SERVICIOS")),
            MetadataSeed::default(),
        );
        assert_eq!(d.category_summary[&Category::Servicios].total, 0.01);
        assert!((d.metadata.total_amount - 0.012).abs() < 1e-9);
    }
}
