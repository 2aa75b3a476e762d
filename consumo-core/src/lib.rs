//! consumo-core: taxonomy, record types, summary document and aggregation.
//!
//! Pure data and folding logic; no I/O and no oracle calls.

pub mod aggregate;
pub mod model;
pub mod summary;
pub mod taxonomy;

pub use aggregate::{CategoryAggregator, aggregate};
pub use model::{
    CardType, CategorizedRecord, ClassificationResult, NOT_AVAILABLE, ReadFlag,
    TransactionCandidate, parse_amount, round2,
};
pub use summary::{
    CategoryBucket, CategorySummary, DEFAULT_SOURCE, Metadata, MetadataSeed, Statistics,
    SummaryDocument, SummaryError,
};
pub use taxonomy::{Category, CategoryInfo, ERROR_LABEL, Label, taxonomy_listing};
