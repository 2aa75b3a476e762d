//! Wiring shared by the CLI commands and the HTTP server.

use anyhow::{Context, Result};
use chrono::Utc;
use consumo_classify::{Pipeline, build_oracle, profile_by_name};
use consumo_core::{CardType, MetadataSeed, SummaryDocument, TransactionCandidate, parse_amount};
use consumo_ingest::RawMessage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::Config;

/// Build the pipeline from config, with optional CLI overrides.
pub fn build_pipeline(
    cfg: &Config,
    profile: Option<&str>,
    concurrency: Option<usize>,
    period: Option<&str>,
) -> Result<Pipeline> {
    let profile = profile_by_name(profile.unwrap_or(cfg.pipeline.profile.as_str()))?;
    let oracle = build_oracle(&cfg.oracle).context("configure oracle")?;
    let generation = cfg.oracle.generation(profile.generation_config());

    debug!(
        provider = ?cfg.oracle.provider,
        model = cfg.oracle.model(),
        profile = profile.name(),
        "pipeline configured"
    );

    Ok(Pipeline::new(oracle, profile)
        .with_generation(generation)
        .with_concurrency(concurrency.unwrap_or(cfg.pipeline.concurrency))
        .with_seed(MetadataSeed::new(period, cfg.pipeline.source.clone())))
}

pub fn load_summary(path: &Path) -> Result<SummaryDocument> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let doc: SummaryDocument =
        serde_json::from_str(&s).with_context(|| format!("parse summary {}", path.display()))?;
    if let Err(e) = doc.validate() {
        warn!(path = %path.display(), error = %e, "summary fails its invariants");
    }
    Ok(doc)
}

pub fn save_summary(doc: &SummaryDocument, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(doc).context("serialize summary")?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))
}

/// Ad-hoc transaction, as posted to `/clasificar-manual`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualRequest {
    pub empresa: String,
    pub monto: String,
    pub tipo_tarjeta: String,
    #[serde(default)]
    pub fecha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualResponse {
    pub categoria: String,
    pub justificacion: String,
    pub emoji: String,
    pub monto_numerico: f64,
}

/// Classify one transaction typed in by hand. Oracle failures surface as `ERROR`.
pub async fn classify_manual(pipeline: &Pipeline, req: &ManualRequest) -> ManualResponse {
    let fecha = req
        .fecha
        .clone()
        .unwrap_or_else(|| Utc::now().format("%a, %d %b %Y %H:%M:%S +0000 (UTC)").to_string());
    let card = CardType::parse(&req.tipo_tarjeta);

    // Synthetic message so subject-driven profiles have something to read.
    let msg = RawMessage {
        id: "manual".to_string(),
        date: fecha.clone(),
        subject: format!("Consumo de {} en {}", req.monto, req.empresa),
        from: req.empresa.clone(),
        snippet: format!(
            "Consumo de {} con tu Tarjeta de {} en {}.",
            req.monto,
            card.as_str(),
            req.empresa
        ),
        ..Default::default()
    };
    let candidate = TransactionCandidate::new(
        req.empresa.clone(),
        req.monto.clone(),
        card,
        fecha,
        "manual",
        false,
    );

    let result = pipeline.classify_candidate(&candidate, &msg).await;
    ManualResponse {
        categoria: result.category.to_string(),
        justificacion: result.justification,
        emoji: result.category.glyph().to_string(),
        monto_numerico: parse_amount(&req.monto),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use consumo_classify::{BcpSpending, GenerationConfig, Oracle, OracleError, Pipeline};
    use std::sync::Arc;

    /// Answers from the merchant line of the prompt; `FALLA` fails.
    pub struct StubOracle;

    #[async_trait]
    impl Oracle for StubOracle {
        async fn invoke(&self, prompt: &str, _: &GenerationConfig) -> Result<String, OracleError> {
            let merchant = prompt
                .lines()
                .find_map(|l| l.trim().strip_prefix("Empresa/Comercio: "))
                .unwrap_or("");
            match merchant {
                "FALLA" => Err(OracleError::Quota("limit".to_string())),
                "TAMBO" => Ok("ALIMENTACIÓN|Tienda de conveniencia".to_string()),
                "UBER TRIP" => Ok("TRANSPORTE|Taxi por aplicativo".to_string()),
                "TEST" => Ok("COMPRAS|Prueba".to_string()),
                _ => Ok("SERVICIOS|Suscripción".to_string()),
            }
        }
    }

    pub fn stub_pipeline() -> Pipeline {
        Pipeline::new(Arc::new(StubOracle), Arc::new(BcpSpending::new().unwrap()))
    }
}
