//! Generic financial email extractor and filter.
//!
//! Works from subject and sender instead of a fixed notification template:
//! the sender stands in for the merchant and the first currency amount in the
//! subject (or snippet) is the amount.

use anyhow::Result;
use consumo_core::{CardType, NOT_AVAILABLE, TransactionCandidate};
use regex::Regex;

use crate::parsers::Extractor;
use crate::types::RawMessage;

/// Subject keywords (matched against the uppercased subject).
const SUBJECT_KEYWORDS: &[&str] = &[
    "PAGO", "PAYMENT", "TRANSFERENCIA", "TRANSFER", "COMPRA", "PURCHASE", "FACTURA", "INVOICE",
    "RECIBO", "RECEIPT", "COBRO", "CHARGE", "TARJETA", "CARD", "DÉBITO", "DEBIT", "CRÉDITO",
    "CREDIT", "BANCO", "BANK", "CUENTA", "ACCOUNT", "SALDO", "BALANCE", "TRANSACCIÓN",
    "TRANSACTION", "MOVIMIENTO", "MOVEMENT", "RETIRO", "WITHDRAWAL", "DEPÓSITO", "DEPOSIT",
    "AHORRO", "SAVINGS", "PRÉSTAMO", "LOAN", "CUOTA", "INSTALLMENT", "INTERÉS", "INTEREST",
    "COMISIÓN", "COMMISSION", "FEE", "COSTO", "COST", "PRECIO", "PRICE", "TOTAL", "AMOUNT",
    "SUMA", "MONTO", "VALOR", "VALUE", "YAPE", "PLIN", "BCP", "BBVA", "INTERBANK", "SCOTIABANK",
    "VISA", "MASTERCARD", "AMERICAN EXPRESS", "DINERS",
];

/// Sender fragments (matched against the lowercased sender).
const SENDER_KEYWORDS: &[&str] = &[
    "banco", "bank", "bcp", "bbva", "interbank", "scotiabank", "visa", "mastercard", "yape",
    "plin", "paypal", "mercadopago", "culqi", "izipay", "payme", "tunki", "lukita", "billetera",
    "wallet", "fintech", "nequi", "daviplata", "financier", "credito", "prestamo", "seguros",
    "insurance", "sunat", "tributario", "tax", "facturacion", "billing", "cobranza",
];

#[derive(Debug, Clone)]
pub struct FinancialEmailExtractor {
    amount_re: Regex,
    currency_code_re: Regex,
}

impl FinancialEmailExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            amount_re: Regex::new(r"(?:S/\.?|US\$|[$€£¥])\s*\d[\d,]*(?:\.\d+)?")?,
            currency_code_re: Regex::new(r"\b(?:PEN|USD|EUR|GBP)\b")?,
        })
    }

    /// True when subject, sender or a currency amount marks the message as financial.
    pub fn is_financial(&self, msg: &RawMessage) -> bool {
        let subject = msg.subject.to_uppercase();
        let sender = msg.from.to_lowercase();

        SUBJECT_KEYWORDS.iter().any(|k| subject.contains(k))
            || SENDER_KEYWORDS.iter().any(|k| sender.contains(k))
            || self.amount_re.is_match(&msg.subject)
            || self.currency_code_re.is_match(&msg.subject)
    }

    /// Every currency amount in the subject, in order.
    pub fn subject_amounts(&self, msg: &RawMessage) -> Vec<String> {
        self.amount_re
            .find_iter(&msg.subject)
            .map(|m| m.as_str().trim().to_string())
            .collect()
    }
}

impl Extractor for FinancialEmailExtractor {
    fn extract(&self, msg: &RawMessage) -> TransactionCandidate {
        let merchant = match msg.from.trim() {
            "" => NOT_AVAILABLE.to_string(),
            from => from.to_string(),
        };

        let amount = self
            .amount_re
            .find(&msg.subject)
            .or_else(|| self.amount_re.find(msg.text()))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let card_text = format!("{} {}", msg.subject, msg.text());

        TransactionCandidate::new(
            merchant,
            amount,
            CardType::detect(&card_text),
            msg.date.clone(),
            msg.id.clone(),
            msg.is_read,
        )
    }
}
