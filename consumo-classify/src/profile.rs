//! Pipeline profiles: the per-source strategy (filter, extractor, prompt,
//! response grammar, sampling) injected into one shared pipeline.

use anyhow::{Result, bail};
use consumo_core::TransactionCandidate;
use consumo_ingest::{BcpNotificationExtractor, Extractor, FinancialEmailExtractor, RawMessage};
use std::sync::Arc;

use crate::normalize::ResponseShape;
use crate::oracle::GenerationConfig;
use crate::prompt;

pub trait Profile: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pre-filter; rejected messages never reach extraction.
    fn accepts(&self, _msg: &RawMessage) -> bool {
        true
    }

    fn extract(&self, msg: &RawMessage) -> TransactionCandidate;

    fn build_prompt(&self, candidate: &TransactionCandidate, msg: &RawMessage) -> String;

    fn response_shape(&self) -> ResponseShape;

    fn generation_config(&self) -> GenerationConfig;
}

/// BCP "Realizaste un consumo" card notifications.
pub struct BcpSpending {
    extractor: BcpNotificationExtractor,
}

impl BcpSpending {
    pub fn new() -> Result<Self> {
        Ok(Self {
            extractor: BcpNotificationExtractor::new()?,
        })
    }
}

impl Profile for BcpSpending {
    fn name(&self) -> &'static str {
        "bcp"
    }

    fn extract(&self, msg: &RawMessage) -> TransactionCandidate {
        self.extractor.extract(msg)
    }

    fn build_prompt(&self, candidate: &TransactionCandidate, _msg: &RawMessage) -> String {
        prompt::spending_prompt(candidate)
    }

    fn response_shape(&self) -> ResponseShape {
        ResponseShape::CategoryJustification
    }

    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig::default()
    }
}

/// Any financial-looking email, classified from subject and sender.
pub struct FinancialEmail {
    extractor: FinancialEmailExtractor,
}

impl FinancialEmail {
    pub fn new() -> Result<Self> {
        Ok(Self {
            extractor: FinancialEmailExtractor::new()?,
        })
    }
}

impl Profile for FinancialEmail {
    fn name(&self) -> &'static str {
        "financiero"
    }

    fn accepts(&self, msg: &RawMessage) -> bool {
        self.extractor.is_financial(msg)
    }

    fn extract(&self, msg: &RawMessage) -> TransactionCandidate {
        self.extractor.extract(msg)
    }

    fn build_prompt(&self, _candidate: &TransactionCandidate, msg: &RawMessage) -> String {
        let amounts = self.extractor.subject_amounts(msg);
        prompt::financial_prompt(&msg.subject, &msg.from, &amounts)
    }

    fn response_shape(&self) -> ResponseShape {
        ResponseShape::CategoryAmountJustification
    }

    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: 0.1,
            max_output_tokens: 200,
        }
    }
}

pub const PROFILE_NAMES: &[&str] = &["bcp", "financiero"];

pub fn profile_by_name(name: &str) -> Result<Arc<dyn Profile>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "bcp" => Ok(Arc::new(BcpSpending::new()?)),
        "financiero" | "financial" => Ok(Arc::new(FinancialEmail::new()?)),
        other => bail!(
            "unknown profile: {other} (expected one of: {})",
            PROFILE_NAMES.join(", ")
        ),
    }
}
