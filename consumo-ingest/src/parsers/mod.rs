//! Message extractors: one raw message in, one transaction candidate out.

pub mod bcp_notification;
pub mod financial_email;

use consumo_core::TransactionCandidate;

use crate::types::RawMessage;

/// Total extraction: never fails, missing fields become sentinels.
pub trait Extractor: Send + Sync {
    fn extract(&self, msg: &RawMessage) -> TransactionCandidate;
}
