//! Record types flowing through the classification pipeline.
//!
//! Serde names follow the summary document consumed by the dashboard
//! (`empresa`, `monto`, `monto_numerico`, ...).

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::taxonomy::{Category, Label};

/// Sentinel for any field the extractor could not locate.
pub const NOT_AVAILABLE: &str = "N/A";

/// Currency prefixes stripped before numeric parsing. Longest first.
const CURRENCY_PREFIXES: &[&str] = &["US$", "S/.", "S/", "$", "€", "£", "¥"];

/// Card used for the charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CardType {
    #[serde(rename = "Crédito", alias = "Credito")]
    Credit,
    #[serde(rename = "Débito", alias = "Debito")]
    Debit,
    #[default]
    #[serde(rename = "N/A")]
    Unknown,
}

impl CardType {
    /// Keyword search over notification text. Credit wins when both appear.
    pub fn detect(text: &str) -> CardType {
        if text.contains("Crédito") || text.contains("Credito") {
            CardType::Credit
        } else if text.contains("Débito") || text.contains("Debito") {
            CardType::Debit
        } else {
            CardType::Unknown
        }
    }

    /// Lenient parse of user-supplied card type text.
    pub fn parse(text: &str) -> CardType {
        match text.trim().to_lowercase().as_str() {
            "crédito" | "credito" | "credit" => CardType::Credit,
            "débito" | "debito" | "debit" => CardType::Debit,
            _ => CardType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Credit => "Crédito",
            CardType::Debit => "Débito",
            CardType::Unknown => NOT_AVAILABLE,
        }
    }
}

/// Read flag, carried on the wire as the literal strings `"TRUE"` / `"FALSE"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadFlag(pub bool);

impl Serialize for ReadFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if self.0 { "TRUE" } else { "FALSE" })
    }
}

impl<'de> Deserialize<'de> for ReadFlag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bool(bool),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Bool(b) => Ok(ReadFlag(b)),
            Repr::Text(s) => match s.trim().to_ascii_uppercase().as_str() {
                "TRUE" => Ok(ReadFlag(true)),
                "FALSE" | "" => Ok(ReadFlag(false)),
                other => Err(de::Error::custom(format!("invalid read flag '{other}'"))),
            },
        }
    }
}

/// A transaction extracted from one raw message, prior to classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCandidate {
    /// Date string exactly as the message carried it
    #[serde(rename = "fecha", default)]
    pub timestamp: String,
    #[serde(rename = "empresa")]
    pub merchant: String,
    /// Currency-formatted amount as found, e.g. `S/ 1,234.50`
    #[serde(rename = "monto")]
    pub amount_text: String,
    #[serde(rename = "monto_numerico", default)]
    pub amount_numeric: f64,
    #[serde(rename = "tipo_tarjeta", default)]
    pub card_type: CardType,
    /// Id of the originating message
    #[serde(rename = "email_id", default)]
    pub source_id: String,
    #[serde(rename = "leido", default)]
    pub read_flag: ReadFlag,
}

impl TransactionCandidate {
    /// Build a candidate; the numeric amount is derived from `amount_text`.
    pub fn new(
        merchant: impl Into<String>,
        amount_text: impl Into<String>,
        card_type: CardType,
        timestamp: impl Into<String>,
        source_id: impl Into<String>,
        read: bool,
    ) -> Self {
        let amount_text = amount_text.into();
        Self {
            timestamp: timestamp.into(),
            merchant: merchant.into(),
            amount_numeric: parse_amount(&amount_text),
            amount_text,
            card_type,
            source_id: source_id.into(),
            read_flag: ReadFlag(read),
        }
    }

    pub fn missing_merchant(&self) -> bool {
        self.merchant == NOT_AVAILABLE
    }

    pub fn missing_amount(&self) -> bool {
        self.amount_text == NOT_AVAILABLE
    }
}

/// Parse a currency-formatted amount. Anything unparseable is 0.
///
/// `"S/ 1,234.50"` -> 1234.5, `"N/A"` -> 0.
pub fn parse_amount(text: &str) -> f64 {
    let t = text.trim();
    if t.is_empty() || t == NOT_AVAILABLE {
        return 0.0;
    }
    let digits = CURRENCY_PREFIXES
        .iter()
        .find_map(|p| t.strip_prefix(p))
        .unwrap_or(t);
    digits
        .replace(',', "")
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Round to 2 decimals, half away from zero.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Normalized oracle verdict for one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub category: Label,
    pub justification: String,
    /// Amount the oracle reported, for response shapes that carry one
    pub detected_amount: Option<String>,
}

impl ClassificationResult {
    pub fn new(category: impl Into<Label>, justification: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            justification: justification.into(),
            detected_amount: None,
        }
    }

    pub fn with_amount(mut self, amount: Option<String>) -> Self {
        self.detected_amount = amount;
        self
    }

    pub fn is_error(&self) -> bool {
        self.category.is_error()
    }

    pub fn bucket(&self) -> Category {
        self.category.bucket()
    }
}

/// Candidate plus its classification: the atomic unit of the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedRecord {
    #[serde(flatten)]
    pub candidate: TransactionCandidate,
    #[serde(rename = "justificacion")]
    pub justification: String,
    #[serde(rename = "categoria")]
    pub category: Label,
}

impl CategorizedRecord {
    /// Join a candidate with its verdict.
    ///
    /// When extraction found no amount but the oracle reported one, the
    /// oracle's amount fills the record.
    pub fn new(mut candidate: TransactionCandidate, result: ClassificationResult) -> Self {
        if candidate.missing_amount() {
            if let Some(amount) = result
                .detected_amount
                .filter(|a| !a.trim().is_empty() && a.trim() != NOT_AVAILABLE)
            {
                candidate.amount_numeric = parse_amount(&amount);
                candidate.amount_text = amount;
            }
        }
        Self {
            candidate,
            justification: result.justification,
            category: result.category,
        }
    }

    pub fn bucket(&self) -> Category {
        self.category.bucket()
    }

    pub fn amount(&self) -> f64 {
        self.candidate.amount_numeric
    }
}
