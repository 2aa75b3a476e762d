//! Lenient parser for the oracle's `CATEGORIA|...` free-text responses.
//!
//! The oracle is untrusted input: nothing here fails. A response without the
//! delimiter lands in the catch-all bucket with the whole text as justification.

use consumo_core::{Category, ClassificationResult, Label, NOT_AVAILABLE};

pub const DELIMITER: char = '|';

/// Justification used when a three-field response stops after the amount.
pub const MISSING_JUSTIFICATION: &str = "Sin justificación";

/// Grammar a profile asks the oracle to answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseShape {
    /// `CATEGORIA|justificación_breve`
    #[default]
    CategoryJustification,
    /// `CATEGORIA|monto_detectado|justificación_breve`
    CategoryAmountJustification,
}

impl ResponseShape {
    /// Format line quoted verbatim in prompts.
    pub fn format_hint(&self) -> &'static str {
        match self {
            ResponseShape::CategoryJustification => "CATEGORIA|justificación_breve",
            ResponseShape::CategoryAmountJustification => {
                "CATEGORIA|monto_detectado|justificación_breve"
            }
        }
    }

    /// Synthetic response standing in for a failed oracle call.
    pub fn error_response(&self, reason: &str) -> String {
        match self {
            ResponseShape::CategoryJustification => {
                format!("ERROR|No se pudo clasificar: {reason}")
            }
            ResponseShape::CategoryAmountJustification => {
                format!("ERROR|{NOT_AVAILABLE}|No se pudo clasificar: {reason}")
            }
        }
    }
}

/// Two-field normalization (`CATEGORIA|justificación`).
pub fn normalize(raw: &str) -> ClassificationResult {
    normalize_shaped(raw, ResponseShape::CategoryJustification)
}

pub fn normalize_shaped(raw: &str, shape: ResponseShape) -> ClassificationResult {
    let raw = raw.trim();
    let Some((head, rest)) = raw.split_once(DELIMITER) else {
        return ClassificationResult::new(Category::FALLBACK, raw);
    };

    let category = match head.trim() {
        "" => Label::Canonical(Category::FALLBACK),
        token => Label::from(token),
    };

    match shape {
        ResponseShape::CategoryJustification => ClassificationResult::new(category, rest.trim()),
        ResponseShape::CategoryAmountJustification => {
            let (amount, justification) = match rest.split_once(DELIMITER) {
                Some((a, j)) => (a.trim(), j.trim()),
                None => (rest.trim(), ""),
            };
            let justification = if justification.is_empty() {
                MISSING_JUSTIFICATION
            } else {
                justification
            };
            let amount = (!amount.is_empty() && amount != NOT_AVAILABLE).then(|| amount.to_string());
            ClassificationResult::new(category, justification).with_amount(amount)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_field_response() {
        let r = normalize("COMPRAS|Tienda de electrónica");
        assert_eq!(r.category, Label::Canonical(Category::Compras));
        assert_eq!(r.justification, "Tienda de electrónica");
        assert_eq!(r.detected_amount, None);
    }

    #[test]
    fn test_missing_delimiter_falls_back() {
        let r = normalize("respuesta sin separador");
        assert_eq!(r.category, Label::Canonical(Category::Compras));
        assert_eq!(r.justification, "respuesta sin separador");
    }

    #[test]
    fn test_only_first_delimiter_splits() {
        let r = normalize("  SERVICIOS | Suscripción | Google One \n");
        assert_eq!(r.category, Label::Canonical(Category::Servicios));
        assert_eq!(r.justification, "Suscripción | Google One");
    }

    #[test]
    fn test_unrecognised_category_is_kept() {
        let r = normalize("VIAJES|Pasaje aéreo");
        assert_eq!(r.category, Label::Other("VIAJES".to_string()));
        assert_eq!(r.bucket(), Category::Compras);
        assert_eq!(r.category.glyph(), Category::Compras.glyph());
    }

    #[test]
    fn test_tolerant_category_and_empty_token() {
        assert_eq!(
            normalize("Alimentacion|Delivery").category,
            Label::Canonical(Category::Alimentacion)
        );
        assert_eq!(normalize("|algo").category, Label::Canonical(Category::Compras));
    }

    #[test]
    fn test_error_sentinel_round_trips() {
        let raw = ResponseShape::CategoryJustification.error_response("timeout");
        let r = normalize(&raw);
        assert!(r.is_error());
        assert_eq!(r.justification, "No se pudo clasificar: timeout");

        let raw = ResponseShape::CategoryAmountJustification.error_response("quota");
        let r = normalize_shaped(&raw, ResponseShape::CategoryAmountJustification);
        assert!(r.is_error());
        assert_eq!(r.detected_amount, None);
        assert_eq!(r.justification, "No se pudo clasificar: quota");
    }

    #[test]
    fn test_three_field_response() {
        let shape = ResponseShape::CategoryAmountJustification;

        let r = normalize_shaped("SERVICIOS|S/ 89.90|Recibo de internet", shape);
        assert_eq!(r.category, Label::Canonical(Category::Servicios));
        assert_eq!(r.detected_amount.as_deref(), Some("S/ 89.90"));
        assert_eq!(r.justification, "Recibo de internet");

        let r = normalize_shaped("BANCARIO|N/A", shape);
        assert_eq!(r.detected_amount, None);
        assert_eq!(r.justification, MISSING_JUSTIFICATION);

        let r = normalize_shaped("sin formato", shape);
        assert_eq!(r.category, Label::Canonical(Category::Compras));
        assert_eq!(r.justification, "sin formato");
    }
}
