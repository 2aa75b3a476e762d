//! BCP "Realizaste un consumo" notification extractor
//!
//! Expected snippet shape:
//!   Hola Ana, realizaste un consumo de S/ 45.90 con tu Tarjeta de Crédito BCP en
//!   RAPPI PERU. Fecha y hora: 18/07/2025 13:45 ...
//!
//! The merchant is only found when the `BCP en {merchant}.` wording is present.
//! Any other wording yields the `N/A` sentinel rather than a guess.

use anyhow::Result;
use consumo_core::{CardType, NOT_AVAILABLE, TransactionCandidate};
use regex::Regex;

use crate::parsers::Extractor;
use crate::types::RawMessage;

#[derive(Debug, Clone)]
pub struct BcpNotificationExtractor {
    amount_re: Regex,
    merchant_re: Regex,
}

impl BcpNotificationExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            amount_re: Regex::new(r"S/\s*[\d,]+\.?\d*")?,
            merchant_re: Regex::new(r"BCP en (?P<merchant>.+?)\.")?,
        })
    }
}

impl Extractor for BcpNotificationExtractor {
    fn extract(&self, msg: &RawMessage) -> TransactionCandidate {
        let text = msg.text();

        let amount = self
            .amount_re
            .find(text)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let merchant = self
            .merchant_re
            .captures(text)
            .map(|caps| caps["merchant"].trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        TransactionCandidate::new(
            merchant,
            amount,
            CardType::detect(text),
            msg.date.clone(),
            msg.id.clone(),
            msg.is_read,
        )
    }
}
