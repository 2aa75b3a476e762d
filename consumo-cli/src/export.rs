//! Flat CSV export of a summary's records.

use anyhow::{Context, Result};
use consumo_core::{CardType, ReadFlag, SummaryDocument};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Serialize)]
struct Row<'a> {
    fecha: &'a str,
    empresa: &'a str,
    monto: &'a str,
    monto_numerico: f64,
    tipo_tarjeta: CardType,
    categoria: &'a str,
    emoji: &'a str,
    justificacion: &'a str,
    email_id: &'a str,
    leido: ReadFlag,
}

/// Write one row per record, in `todos_los_consumos` order. Returns the row count.
pub fn write_csv<W: Write>(doc: &SummaryDocument, out: W) -> Result<usize> {
    let mut w = csv::Writer::from_writer(out);
    for r in &doc.all_records {
        let c = &r.candidate;
        w.serialize(Row {
            fecha: &c.timestamp,
            empresa: &c.merchant,
            monto: &c.amount_text,
            monto_numerico: c.amount_numeric,
            tipo_tarjeta: c.card_type,
            categoria: r.category.as_str(),
            emoji: r.category.glyph(),
            justificacion: &r.justification,
            email_id: &c.source_id,
            leido: c.read_flag,
        })?;
    }
    w.flush()?;
    Ok(doc.all_records.len())
}

pub fn export_csv(doc: &SummaryDocument, path: &Path) -> Result<usize> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    write_csv(doc, f).with_context(|| format!("write {}", path.display()))
}
