//! The categorized summary document: output contract of a batch run.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::{CategorizedRecord, NOT_AVAILABLE};
use crate::taxonomy::Category;

/// Source label written when the caller provides none.
pub const DEFAULT_SOURCE: &str = "BCP - Consumos últimos 7 días";

/// Per-bucket rounding slack allowed by [`SummaryDocument::validate`].
const BUCKET_ROUNDING_SLACK: f64 = 0.005;

/// Caller-provided metadata that the aggregator cannot derive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSeed {
    /// Period descriptor of the input, usually the export date
    pub period: String,
    pub source: String,
}

impl Default for MetadataSeed {
    fn default() -> Self {
        Self {
            period: NOT_AVAILABLE.to_string(),
            source: DEFAULT_SOURCE.to_string(),
        }
    }
}

impl MetadataSeed {
    pub fn new(period: Option<&str>, source: impl Into<String>) -> Self {
        Self {
            period: period
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(NOT_AVAILABLE)
                .to_string(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "fecha_proceso")]
    pub processed_at: NaiveDateTime,
    #[serde(rename = "total_consumos")]
    pub total_records: usize,
    /// Sum of raw record amounts, never of rounded bucket totals
    #[serde(rename = "total_gastado")]
    pub total_amount: f64,
    #[serde(rename = "periodo_datos")]
    pub period: String,
    #[serde(rename = "fuente")]
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    #[serde(rename = "cantidad")]
    pub count: usize,
    pub total: f64,
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBucket {
    pub emoji: String,
    #[serde(rename = "total_categoria")]
    pub total: f64,
    #[serde(rename = "cantidad_consumos")]
    pub count: usize,
    #[serde(rename = "consumos")]
    pub records: Vec<CategorizedRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryDocument {
    pub metadata: Metadata,
    #[serde(rename = "resumen_categorias")]
    pub category_summary: BTreeMap<Category, CategorySummary>,
    #[serde(rename = "consumos_por_categoria")]
    pub records_by_category: BTreeMap<Category, CategoryBucket>,
    /// Every record in processing order
    #[serde(rename = "todos_los_consumos")]
    pub all_records: Vec<CategorizedRecord>,
}

/// Structural violations found by [`SummaryDocument::validate`].
#[derive(Debug, Error, PartialEq)]
pub enum SummaryError {
    #[error("missing bucket for category {0}")]
    MissingBucket(Category),

    #[error("bucket counts sum to {buckets} but metadata says {total_records} and {listed} records are listed")]
    CountMismatch {
        buckets: usize,
        total_records: usize,
        listed: usize,
    },

    #[error("bucket totals sum to {buckets_total:.2} but metadata total is {total_amount:.2}")]
    TotalMismatch { buckets_total: f64, total_amount: f64 },

    #[error("bucket {category} reports {count} records but lists {listed}")]
    BucketLength {
        category: Category,
        count: usize,
        listed: usize,
    },
}

/// Headline numbers served by the statistics endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(rename = "total_consumos")]
    pub total_records: usize,
    #[serde(rename = "total_gastado")]
    pub total_amount: f64,
    #[serde(rename = "categoria_mayor_gasto")]
    pub top_category: String,
    #[serde(rename = "periodo")]
    pub period: String,
}

impl SummaryDocument {
    pub fn is_empty(&self) -> bool {
        self.all_records.is_empty()
    }

    /// Look up a bucket by a user-supplied label (`compras`, `Alimentacion`, ...).
    pub fn bucket(&self, label: &str) -> Option<(Category, &CategoryBucket)> {
        let category = Category::from_label(label)?;
        self.records_by_category
            .get(&category)
            .map(|b| (category, b))
    }

    /// Check the completeness, count and total invariants.
    pub fn validate(&self) -> Result<(), SummaryError> {
        for c in Category::ALL {
            if !self.category_summary.contains_key(&c) || !self.records_by_category.contains_key(&c)
            {
                return Err(SummaryError::MissingBucket(c));
            }
        }

        for (category, bucket) in &self.records_by_category {
            if bucket.count != bucket.records.len() {
                return Err(SummaryError::BucketLength {
                    category: *category,
                    count: bucket.count,
                    listed: bucket.records.len(),
                });
            }
        }

        let buckets: usize = self.category_summary.values().map(|s| s.count).sum();
        if buckets != self.metadata.total_records || buckets != self.all_records.len() {
            return Err(SummaryError::CountMismatch {
                buckets,
                total_records: self.metadata.total_records,
                listed: self.all_records.len(),
            });
        }

        let buckets_total: f64 = self.category_summary.values().map(|s| s.total).sum();
        let slack = BUCKET_ROUNDING_SLACK * self.category_summary.len() as f64 + 1e-9;
        if (buckets_total - self.metadata.total_amount).abs() > slack {
            return Err(SummaryError::TotalMismatch {
                buckets_total,
                total_amount: self.metadata.total_amount,
            });
        }

        Ok(())
    }

    /// Totals plus the bucket with the highest spend (first in identifier order on ties).
    pub fn statistics(&self) -> Statistics {
        let top = self
            .category_summary
            .iter()
            .fold(None::<(&Category, &CategorySummary)>, |best, (c, s)| match best {
                Some((_, b)) if s.total <= b.total => best,
                _ => Some((c, s)),
            });

        let top_category = match top {
            Some((c, s)) if !self.is_empty() => format!("{} {} (S/ {:.2})", s.emoji, c, s.total),
            _ => NOT_AVAILABLE.to_string(),
        };

        Statistics {
            total_records: self.metadata.total_records,
            total_amount: self.metadata.total_amount,
            top_category,
            period: self.metadata.period.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::CategoryAggregator;
    use crate::model::{CardType, CategorizedRecord, ClassificationResult, TransactionCandidate};
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, 19)
            .unwrap()
            .and_hms_opt(19, 57, 0)
            .unwrap()
    }

    fn record(merchant: &str, amount: &str, label: &str) -> CategorizedRecord {
        CategorizedRecord::new(
            TransactionCandidate::new(merchant, amount, CardType::Debit, "", merchant, false),
            ClassificationResult::new(label, "test"),
        )
    }

    fn doc(records: Vec<CategorizedRecord>) -> SummaryDocument {
        let mut agg = CategoryAggregator::new();
        for r in records {
            agg.push(r);
        }
        agg.finish(MetadataSeed::default(), at())
    }

    #[test]
    fn test_statistics_picks_highest_total() {
        let d = doc(vec![
            record("KFC", "S/ 40.00", "ALIMENTACIÓN"),
            record("UBER", "S/ 15.00", "TRANSPORTE"),
            record("RIPLEY", "S/ 120.50", "COMPRAS"),
        ]);
        let s = d.statistics();
        assert_eq!(s.total_records, 3);
        assert_eq!(s.top_category, "🛒 COMPRAS (S/ 120.50)");
        assert_eq!(s.period, "N/A");
    }

    #[test]
    fn test_statistics_on_empty_document() {
        let d = doc(vec![]);
        assert!(d.is_empty());
        assert_eq!(d.statistics().top_category, "N/A");
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_bucket_lookup_is_tolerant() {
        let d = doc(vec![record("KFC", "S/ 40.00", "ALIMENTACIÓN")]);
        let (c, b) = d.bucket("alimentacion").unwrap();
        assert_eq!(c, Category::Alimentacion);
        assert_eq!(b.count, 1);
        assert!(d.bucket("VIAJES").is_none());
    }

    #[test]
    fn test_validate_detects_tampering() {
        let mut d = doc(vec![record("KFC", "S/ 40.00", "ALIMENTACIÓN")]);
        d.metadata.total_records = 2;
        assert!(matches!(d.validate(), Err(SummaryError::CountMismatch { .. })));

        let mut d = doc(vec![record("KFC", "S/ 40.00", "ALIMENTACIÓN")]);
        d.metadata.total_amount = 41.0;
        assert!(matches!(d.validate(), Err(SummaryError::TotalMismatch { .. })));

        let mut d = doc(vec![]);
        d.category_summary.remove(&Category::Bancario);
        assert_eq!(d.validate(), Err(SummaryError::MissingBucket(Category::Bancario)));
    }

    #[test]
    fn test_document_wire_shape() {
        let d = doc(vec![record("KFC", "S/ 40.00", "ALIMENTACIÓN")]);
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["metadata"]["total_consumos"], 1);
        assert_eq!(v["metadata"]["fuente"], DEFAULT_SOURCE);
        assert_eq!(v["metadata"]["fecha_proceso"], "2025-07-19T19:57:00");
        assert_eq!(v["resumen_categorias"]["ALIMENTACIÓN"]["cantidad"], 1);
        assert_eq!(v["resumen_categorias"]["BANCARIO"]["total"], 0.0);
        assert_eq!(v["consumos_por_categoria"]["ALIMENTACIÓN"]["cantidad_consumos"], 1);
        assert_eq!(v["todos_los_consumos"][0]["categoria"], "ALIMENTACIÓN");

        let back: SummaryDocument = serde_json::from_value(v).unwrap();
        assert_eq!(back, d);
    }
}
