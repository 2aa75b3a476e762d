//! Deterministic prompt construction.
//!
//! Same candidate, same prompt: nothing here reads the clock or any
//! process state.

use consumo_core::{Category, TransactionCandidate};
use std::fmt::Write;

use crate::normalize::ResponseShape;

/// Hard-coded merchant rules appended to the spending taxonomy.
const SPENDING_RULES: &[&str] = &[
    "Si reconoces el nombre del comercio, clasifícalo según su rubro principal",
    "TAMBO y tiendas de conveniencia = ALIMENTACIÓN",
    "MEGA PLAZA y centros comerciales = COMPRAS (a menos que sepas el comercio específico)",
    "GOOGLE = SERVICIOS (suscripciones digitales)",
    "Si no estás seguro, usa la categoría más probable según el contexto",
];

fn category_list() -> String {
    Category::ALL
        .iter()
        .map(|c| c.identifier())
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_taxonomy(out: &mut String) {
    for c in Category::ALL {
        let _ = writeln!(out, "{} {}:", c.glyph(), c.identifier());
        for line in c.prompt_lines() {
            let _ = writeln!(out, "- {line}");
        }
        out.push('\n');
    }
}

/// Taxonomy context shared by every spending prompt.
pub fn spending_context() -> String {
    let mut out = String::from(
        "Eres un clasificador especializado en gastos bancarios. \
         Clasifica cada consumo en UNA de estas 6 categorías:\n\n",
    );
    push_taxonomy(&mut out);
    out.push_str("REGLAS:\n");
    for rule in SPENDING_RULES {
        let _ = writeln!(out, "- {rule}");
    }
    out
}

/// Prompt for one card-spending notification.
pub fn spending_prompt(candidate: &TransactionCandidate) -> String {
    let mut out = spending_context();
    let _ = write!(
        out,
        "\nCONSUMO A CLASIFICAR:\n\
         Empresa/Comercio: {}\n\
         Monto: {}\n\
         Tipo de tarjeta: {}\n\
         Fecha: {}\n\n\
         Analiza el nombre del comercio y clasifica este gasto.\n\n\
         Responde EXACTAMENTE en este formato:\n\
         {}\n\n\
         Donde CATEGORIA es una de: {}\n",
        candidate.merchant,
        candidate.amount_text,
        candidate.card_type.as_str(),
        candidate.timestamp,
        ResponseShape::CategoryJustification.format_hint(),
        category_list(),
    );
    out
}

/// Prompt for a generic financial email, classified from subject and sender.
pub fn financial_prompt(subject: &str, sender: &str, amounts: &[String]) -> String {
    let mut out = String::from(
        "Eres un experto en finanzas personales. Clasifica este correo financiero \
         en UNA de estas 6 categorías de gasto:\n\n",
    );
    push_taxonomy(&mut out);
    out.push_str(
        "Si un gasto no encaja claramente en ninguna categoría, asígnalo a la más cercana.\n",
    );

    let amount_info = if amounts.is_empty() {
        "Sin monto visible".to_string()
    } else {
        format!("Montos encontrados: {}", amounts.join(", "))
    };

    let _ = write!(
        out,
        "\nCORREO FINANCIERO A CLASIFICAR:\n\
         Asunto: {subject}\n\
         De: {sender}\n\
         {amount_info}\n\n\
         Analiza este correo y clasifícalo en UNA de las categorías listadas arriba.\n\n\
         INSTRUCCIONES:\n\
         1. Lee cuidadosamente el asunto y remitente\n\
         2. Identifica de qué tipo de gasto se trata\n\
         3. Asigna la categoría más apropiada\n\
         4. Si detectas un monto, inclúyelo en tu respuesta\n\n\
         Responde EXACTAMENTE en este formato:\n\
         {}\n\n\
         Donde:\n\
         - CATEGORIA es una de: {}\n\
         - monto_detectado es el monto encontrado o \"N/A\"\n\
         - justificación_breve es una explicación corta (máximo 30 palabras)\n",
        ResponseShape::CategoryAmountJustification.format_hint(),
        category_list(),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use consumo_core::CardType;

    fn candidate() -> TransactionCandidate {
        TransactionCandidate::new(
            "TAMBO SAN ISIDRO",
            "S/ 12.50",
            CardType::Debit,
            "Fri, 18 Jul 2025 13:45:10 +0000",
            "m-1",
            false,
        )
    }

    #[test]
    fn test_spending_prompt_embeds_taxonomy_and_candidate() {
        let p = spending_prompt(&candidate());
        for c in Category::ALL {
            assert!(p.contains(&format!("{} {}:", c.glyph(), c.identifier())));
        }
        assert!(p.contains("TAMBO y tiendas de conveniencia = ALIMENTACIÓN"));
        assert!(p.contains("GOOGLE = SERVICIOS"));
        assert!(p.contains("Empresa/Comercio: TAMBO SAN ISIDRO"));
        assert!(p.contains("Monto: S/ 12.50"));
        assert!(p.contains("Tipo de tarjeta: Débito"));
        assert!(p.contains("CATEGORIA|justificación_breve"));
        assert!(p.contains(
            "ALIMENTACIÓN, TRANSPORTE, COMPRAS, SERVICIOS, BANCARIO, ENTRETENIMIENTO"
        ));
    }

    #[test]
    fn test_prompts_are_deterministic() {
        assert_eq!(spending_prompt(&candidate()), spending_prompt(&candidate()));
        let amounts = vec!["S/ 10.00".to_string()];
        assert_eq!(
            financial_prompt("Pago", "x@bcp.com.pe", &amounts),
            financial_prompt("Pago", "x@bcp.com.pe", &amounts)
        );
    }

    #[test]
    fn test_financial_prompt() {
        let p = financial_prompt("Tu recibo", "billing@netflix.com", &[]);
        assert!(p.contains("Asunto: Tu recibo"));
        assert!(p.contains("De: billing@netflix.com"));
        assert!(p.contains("Sin monto visible"));
        assert!(p.contains("CATEGORIA|monto_detectado|justificación_breve"));

        let p = financial_prompt("Cobro", "x", &["$ 5.00".to_string(), "S/ 2".to_string()]);
        assert!(p.contains("Montos encontrados: $ 5.00, S/ 2"));
    }
}
