//! consumo-classify: prompts, the classification oracle, response
//! normalization and the batch pipeline.

pub mod normalize;
pub mod oracle;
pub mod pipeline;
pub mod profile;
pub mod prompt;

pub use normalize::{ResponseShape, normalize, normalize_shaped};
pub use oracle::{
    GenerationConfig, Oracle, OracleError, OracleSettings, ProviderKind, Retry, build_oracle,
    classify_raw,
};
pub use pipeline::{BatchOutcome, BatchStats, DEFAULT_CONCURRENCY, Pipeline};
pub use profile::{BcpSpending, FinancialEmail, PROFILE_NAMES, Profile, profile_by_name};
