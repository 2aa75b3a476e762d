//! Batch pipeline: filter, extract, classify (bounded concurrency), aggregate.
//!
//! Oracle calls run concurrently, but results are slotted back by input
//! index and folded by a single owner, so `todos_los_consumos` always
//! follows input order.

use chrono::{Local, NaiveDateTime};
use consumo_core::{
    CardType, CategorizedRecord, CategoryAggregator, ClassificationResult, Label, MetadataSeed,
    SummaryDocument, TransactionCandidate,
};
use consumo_ingest::RawMessage;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::normalize::normalize_shaped;
use crate::oracle::{GenerationConfig, Oracle, OracleError, classify_raw};
use crate::profile::Profile;

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Counters for one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub received: usize,
    pub accepted: usize,
    pub merchant_misses: usize,
    pub amount_misses: usize,
    pub oracle_failures: usize,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub summary: SummaryDocument,
    pub stats: BatchStats,
}

#[derive(Clone)]
pub struct Pipeline {
    oracle: Arc<dyn Oracle>,
    profile: Arc<dyn Profile>,
    concurrency: usize,
    generation: GenerationConfig,
    seed: MetadataSeed,
}

impl Pipeline {
    pub fn new(oracle: Arc<dyn Oracle>, profile: Arc<dyn Profile>) -> Self {
        let generation = profile.generation_config();
        Self {
            oracle,
            profile,
            concurrency: DEFAULT_CONCURRENCY,
            generation,
            seed: MetadataSeed::default(),
        }
    }

    /// Maximum in-flight oracle calls. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_seed(mut self, seed: MetadataSeed) -> Self {
        self.seed = seed;
        self
    }

    pub fn profile(&self) -> &dyn Profile {
        self.profile.as_ref()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Classify one candidate. Oracle failures come back as `ERROR` results.
    pub async fn classify_candidate(
        &self,
        candidate: &TransactionCandidate,
        msg: &RawMessage,
    ) -> ClassificationResult {
        classify_one(
            self.oracle.as_ref(),
            self.profile.as_ref(),
            &self.generation,
            candidate,
            msg,
        )
        .await
    }

    /// One real oracle round-trip with a synthetic record. Unlike
    /// [`Pipeline::classify_candidate`], failures are returned, not swallowed.
    pub async fn probe(&self) -> Result<ClassificationResult, OracleError> {
        let candidate = TransactionCandidate::new(
            "TEST",
            "S/ 10.00",
            CardType::Debit,
            "2025-01-01",
            "health-check",
            false,
        );
        let prompt = self.profile.build_prompt(&candidate, &RawMessage::default());
        let raw = self.oracle.invoke(&prompt, &self.generation).await?;
        Ok(normalize_shaped(&raw, self.profile.response_shape()))
    }

    pub async fn run(&self, messages: &[RawMessage]) -> BatchOutcome {
        self.run_at(messages, Local::now().naive_local()).await
    }

    /// Same as [`Pipeline::run`] with an explicit processing timestamp.
    pub async fn run_at(&self, messages: &[RawMessage], processed_at: NaiveDateTime) -> BatchOutcome {
        let mut stats = BatchStats {
            received: messages.len(),
            ..Default::default()
        };

        let accepted: Vec<&RawMessage> = messages
            .iter()
            .filter(|m| self.profile.accepts(m))
            .collect();
        stats.accepted = accepted.len();

        let candidates: Vec<TransactionCandidate> =
            accepted.iter().map(|m| self.profile.extract(m)).collect();
        stats.merchant_misses = candidates.iter().filter(|c| c.missing_merchant()).count();
        stats.amount_misses = candidates.iter().filter(|c| c.missing_amount()).count();

        if stats.merchant_misses > 0 {
            warn!(
                profile = self.profile.name(),
                misses = stats.merchant_misses,
                accepted = stats.accepted,
                "merchant extraction missed; notification wording may have changed"
            );
        }

        info!(
            profile = self.profile.name(),
            received = stats.received,
            accepted = stats.accepted,
            concurrency = self.concurrency,
            "classifying batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = tokio::task::JoinSet::new();

        for (idx, (candidate, msg)) in candidates.iter().zip(&accepted).enumerate() {
            let oracle = self.oracle.clone();
            let profile = self.profile.clone();
            let generation = self.generation;
            let semaphore = semaphore.clone();
            let candidate = candidate.clone();
            let msg = (*msg).clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result =
                    classify_one(oracle.as_ref(), profile.as_ref(), &generation, &candidate, &msg)
                        .await;
                (idx, result)
            });
        }

        let mut results: Vec<Option<ClassificationResult>> = vec![None; candidates.len()];
        while let Some(res) = set.join_next().await {
            match res {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(e) => warn!(%e, "classification task failed"),
            }
        }

        let mut agg = CategoryAggregator::new();
        for (candidate, result) in candidates.into_iter().zip(results) {
            let result = result.unwrap_or_else(|| {
                ClassificationResult::new(Label::Error, "No se pudo clasificar: tarea abortada")
            });
            if result.is_error() {
                stats.oracle_failures += 1;
            }
            agg.push(CategorizedRecord::new(candidate, result));
        }

        let summary = agg.finish(self.seed.clone(), processed_at);
        info!(
            records = summary.metadata.total_records,
            total = summary.metadata.total_amount,
            failures = stats.oracle_failures,
            "batch classified"
        );

        BatchOutcome { summary, stats }
    }
}

async fn classify_one(
    oracle: &dyn Oracle,
    profile: &dyn Profile,
    generation: &GenerationConfig,
    candidate: &TransactionCandidate,
    msg: &RawMessage,
) -> ClassificationResult {
    let prompt = profile.build_prompt(candidate, msg);
    let shape = profile.response_shape();
    let raw = classify_raw(oracle, &prompt, generation, shape).await;
    let result = normalize_shaped(&raw, shape);
    debug!(
        merchant = %candidate.merchant,
        category = %result.category,
        "classified"
    );
    result
}
