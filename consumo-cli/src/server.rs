//! JSON HTTP API over hyper.
//!
//! The most recent batch summary is cached in memory (and persisted to
//! `summary_path`) so the statistics and per-category endpoints can answer
//! without re-running the oracle.

use anyhow::{Context, Result};
use chrono::Local;
use consumo_classify::Pipeline;
use consumo_core::{SummaryDocument, taxonomy_listing};
use consumo_ingest::MailExport;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::app::{ManualRequest, classify_manual, load_summary, save_summary};

pub struct AppState {
    pipeline: Pipeline,
    default_export: PathBuf,
    summary_path: PathBuf,
    batch_timeout: Duration,
    latest: RwLock<Option<SummaryDocument>>,
}

impl AppState {
    pub fn new(
        pipeline: Pipeline,
        default_export: PathBuf,
        summary_path: PathBuf,
        batch_timeout: Duration,
    ) -> Self {
        Self {
            pipeline,
            default_export,
            summary_path,
            batch_timeout,
            latest: RwLock::new(None),
        }
    }

    /// Cached summary, falling back to the persisted one.
    async fn summary(&self) -> Option<SummaryDocument> {
        if let Some(doc) = self.latest.read().await.as_ref() {
            return Some(doc.clone());
        }
        if !self.summary_path.exists() {
            return None;
        }
        match load_summary(&self.summary_path) {
            Ok(doc) => {
                *self.latest.write().await = Some(doc.clone());
                Some(doc)
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "could not load persisted summary");
                None
            }
        }
    }

    async fn remember(&self, doc: &SummaryDocument) {
        *self.latest.write().await = Some(doc.clone());
        if let Err(e) = save_summary(doc, &self.summary_path) {
            warn!(error = %format!("{e:#}"), "could not persist summary");
        }
    }
}

pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "listening");

    loop {
        let (stream, peer) = listener.accept().await.context("accept")?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(route(&state, req).await) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                debug!(%peer, error = %e, "connection closed with error");
            }
        });
    }
}

type Resp = Response<Full<Bytes>>;

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Resp {
    let bytes = match serde_json::to_vec(body) {
        Ok(b) => b,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("serialize response: {e}"),
            );
        }
    };
    let mut resp = Response::new(Full::new(Bytes::from(bytes)));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json; charset=utf-8"),
    );
    resp
}

fn error_response(status: StatusCode, detail: &str) -> Resp {
    let body = format!("{}", json!({ "detail": detail }));
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json; charset=utf-8"),
    );
    resp
}

pub async fn route<B>(state: &AppState, req: Request<B>) -> Resp
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!(%method, %path, "request");

    match (&method, path.as_str()) {
        (&Method::GET, "/") => index(state),
        (&Method::GET, "/categorias") => categories(),
        (&Method::GET, "/estadisticas") => statistics(state).await,
        (&Method::GET, "/health") => health(state).await,
        (&Method::GET, "/clasificar-archivo-default") => classify_default(state).await,
        (&Method::POST, "/clasificar-manual") => match read_body(req).await {
            Ok(bytes) => manual(state, &bytes).await,
            Err(r) => r,
        },
        (&Method::POST, "/clasificar-archivo") => match read_body(req).await {
            Ok(bytes) => classify_upload(state, &bytes).await,
            Err(r) => r,
        },
        (&Method::GET, p) if p.starts_with("/consumos-categoria/") => {
            category_records(state, &p["/consumos-categoria/".len()..]).await
        }
        (
            _,
            "/" | "/categorias" | "/estadisticas" | "/health" | "/clasificar-archivo-default"
            | "/clasificar-manual" | "/clasificar-archivo",
        ) => error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
        _ => error_response(StatusCode::NOT_FOUND, "Not Found"),
    }
}

async fn read_body<B>(req: Request<B>) -> Result<Bytes, Resp>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    match req.into_body().collect().await {
        Ok(c) => Ok(c.to_bytes()),
        Err(e) => Err(error_response(
            StatusCode::BAD_REQUEST,
            &format!("could not read request body: {e}"),
        )),
    }
}

fn index(state: &AppState) -> Resp {
    json_response(
        StatusCode::OK,
        &json!({
            "mensaje": "🏦 API Clasificador de Consumos BCP",
            "version": env!("CARGO_PKG_VERSION"),
            "build": env!("CONSUMO_BUILD_SHA"),
            "descripcion": "Clasifica automáticamente tus gastos bancarios usando IA",
            "perfil": state.pipeline.profile().name(),
            "endpoints": {
                "clasificar_archivo": "/clasificar-archivo (POST) - Clasifica desde archivo JSON del BCP",
                "clasificar_archivo_default": "/clasificar-archivo-default (GET) - Clasifica el archivo por defecto",
                "clasificar_manual": "/clasificar-manual (POST) - Clasifica un consumo individual",
                "estadisticas": "/estadisticas (GET) - Obtiene estadísticas de gastos",
                "consumos_categoria": "/consumos-categoria/{categoria} (GET) - Consumos de una categoría",
                "categorias": "/categorias (GET) - Lista las categorías disponibles",
                "health": "/health (GET) - Verifica la conexión con el clasificador",
            },
            "fecha_servidor": Local::now().naive_local(),
        }),
    )
}

fn categories() -> Resp {
    let listing = taxonomy_listing();
    let mut categorias = serde_json::Map::new();
    for info in &listing {
        categorias.insert(
            info.category.to_string(),
            json!({
                "emoji": info.emoji,
                "descripcion": info.description,
                "ejemplos": info.examples,
            }),
        );
    }
    json_response(
        StatusCode::OK,
        &json!({
            "categorias": Value::Object(categorias),
            "total_categorias": listing.len(),
            "sistema": "Clasificación automática con IA",
        }),
    )
}

async fn manual(state: &AppState, body: &[u8]) -> Resp {
    let req: ManualRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("invalid request: {e}"));
        }
    };
    json_response(StatusCode::OK, &classify_manual(&state.pipeline, &req).await)
}

async fn classify_upload(state: &AppState, body: &[u8]) -> Resp {
    match MailExport::from_slice(body) {
        Ok(export) => classify_export(state, export).await,
        Err(e) => error_response(
            StatusCode::BAD_REQUEST,
            &format!("El archivo JSON no es válido: {e:#}"),
        ),
    }
}

async fn classify_default(state: &AppState) -> Resp {
    if !state.default_export.exists() {
        return error_response(
            StatusCode::NOT_FOUND,
            &format!(
                "No se encontró el archivo por defecto: {}",
                state.default_export.display()
            ),
        );
    }
    match MailExport::from_path(&state.default_export) {
        Ok(export) => classify_export(state, export).await,
        Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, &format!("{e:#}")),
    }
}

async fn classify_export(state: &AppState, export: MailExport) -> Resp {
    let run = state.pipeline.run(&export.emails);
    let outcome = match tokio::time::timeout(state.batch_timeout, run).await {
        Ok(o) => o,
        Err(_) => {
            warn!(timeout = ?state.batch_timeout, "batch classification timed out");
            return error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "La clasificación excedió el tiempo límite",
            );
        }
    };

    // The export's own period wins over the pipeline seed.
    let mut summary = outcome.summary;
    if let Some(period) = export.period() {
        summary.metadata.period = period.to_string();
    }

    state.remember(&summary).await;
    json_response(StatusCode::OK, &summary)
}

async fn statistics(state: &AppState) -> Resp {
    match state.summary().await {
        Some(doc) if !doc.is_empty() => json_response(StatusCode::OK, &doc.statistics()),
        _ => error_response(
            StatusCode::NOT_FOUND,
            "No hay datos para generar estadísticas",
        ),
    }
}

async fn category_records(state: &AppState, raw: &str) -> Resp {
    let label = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());

    let Some(doc) = state.summary().await else {
        return error_response(StatusCode::NOT_FOUND, "No hay datos disponibles");
    };
    match doc.bucket(&label) {
        Some((_, bucket)) => json_response(StatusCode::OK, bucket),
        None => error_response(
            StatusCode::NOT_FOUND,
            &format!("Categoría '{}' no encontrada", label.to_uppercase()),
        ),
    }
}

async fn health(state: &AppState) -> Resp {
    let timestamp = Local::now().naive_local();
    match state.pipeline.probe().await {
        Ok(result) => json_response(
            StatusCode::OK,
            &json!({
                "status": "healthy",
                "timestamp": timestamp,
                "oracle": "connected",
                "clasificador": "functional",
                "prueba": result.category.to_string(),
            }),
        ),
        Err(e) => json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &json!({
                "status": "unhealthy",
                "timestamp": timestamp,
                "error": e.to_string(),
            }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::stub_pipeline;
    use async_trait::async_trait;
    use consumo_classify::{BcpSpending, GenerationConfig, Oracle, OracleError};

    const EXPORT: &str = r#"{
  "exportDate": "2025-07-19T15:02:11.000Z",
  "totalEmails": 3,
  "emails": [
    {"id": "a", "date": "d", "isRead": true,
     "snippet": "consumo de S/ 12.50 con tu Tarjeta de Débito BCP en TAMBO. Operación 1"},
    {"id": "b", "date": "d", "isRead": false,
     "snippet": "consumo de S/ 20.00 con tu Tarjeta de Crédito BCP en UBER TRIP. Operación 2"},
    {"id": "c", "date": "d", "isRead": false,
     "snippet": "consumo de S/ 7.00 con tu Tarjeta de Crédito BCP en FALLA. Operación 3"}
  ]
}"#;

    struct Fixture {
        _dir: tempfile::TempDir,
        state: AppState,
    }

    fn fixture_with(pipeline: Pipeline, timeout: Duration) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(
            pipeline,
            dir.path().join("default.json"),
            dir.path().join("summary.json"),
            timeout,
        );
        Fixture { _dir: dir, state }
    }

    fn fixture() -> Fixture {
        fixture_with(stub_pipeline(), Duration::from_secs(30))
    }

    fn request(method: Method, path: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn call(state: &AppState, method: Method, path: &str, body: &str) -> (StatusCode, Value) {
        let resp = route(state, request(method, path, body)).await;
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_index_and_categories() {
        let f = fixture();
        let (status, v) = call(&f.state, Method::GET, "/", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["perfil"], "bcp");

        let (status, v) = call(&f.state, Method::GET, "/categorias", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["total_categorias"], 6);
        assert_eq!(v["categorias"]["SERVICIOS"]["emoji"], "🏠");
    }

    #[tokio::test]
    async fn test_nothing_classified_yet() {
        let f = fixture();
        let (status, _) = call(&f.state, Method::GET, "/estadisticas", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, v) = call(&f.state, Method::GET, "/consumos-categoria/COMPRAS", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(v["detail"], "No hay datos disponibles");
        let (status, _) = call(&f.state, Method::GET, "/clasificar-archivo-default", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_then_query() {
        let f = fixture();
        let (status, v) = call(&f.state, Method::POST, "/clasificar-archivo", EXPORT).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["metadata"]["total_consumos"], 3);
        assert_eq!(v["metadata"]["periodo_datos"], "2025-07-19T15:02:11.000Z");
        assert_eq!(v["todos_los_consumos"][2]["categoria"], "ERROR");

        let (status, v) = call(&f.state, Method::GET, "/estadisticas", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["total_consumos"], 3);
        assert_eq!(v["total_gastado"], 39.5);
        assert_eq!(v["categoria_mayor_gasto"], "🚗 TRANSPORTE (S/ 20.00)");

        let (status, v) = call(&f.state, Method::GET, "/consumos-categoria/alimentaci%C3%B3n", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["cantidad_consumos"], 1);
        assert_eq!(v["consumos"][0]["empresa"], "TAMBO");

        let (status, v) = call(&f.state, Method::GET, "/consumos-categoria/VIAJES", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(v["detail"], "Categoría 'VIAJES' no encontrada");

        assert!(f.state.summary_path.exists());
    }

    #[tokio::test]
    async fn test_persisted_summary_is_served_after_restart() {
        let f = fixture();
        call(&f.state, Method::POST, "/clasificar-archivo", EXPORT).await;

        let restarted = AppState::new(
            stub_pipeline(),
            f.state.default_export.clone(),
            f.state.summary_path.clone(),
            Duration::from_secs(30),
        );
        let (status, v) = call(&restarted, Method::GET, "/estadisticas", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["total_consumos"], 3);
    }

    #[tokio::test]
    async fn test_default_export() {
        let f = fixture();
        std::fs::write(&f.state.default_export, EXPORT).unwrap();
        let (status, v) = call(&f.state, Method::GET, "/clasificar-archivo-default", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["resumen_categorias"]["TRANSPORTE"]["cantidad"], 1);
    }

    #[tokio::test]
    async fn test_malformed_upload_is_rejected() {
        let f = fixture();
        let (status, v) = call(&f.state, Method::POST, "/clasificar-archivo", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(v["detail"].as_str().unwrap().starts_with("El archivo JSON no es válido"));

        let (status, _) = call(&f.state, Method::POST, "/clasificar-archivo", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&f.state, Method::GET, "/estadisticas", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_manual_classification() {
        let f = fixture();
        let body = r#"{"empresa": "UBER TRIP", "monto": "S/ 18.60", "tipo_tarjeta": "Crédito"}"#;
        let (status, v) = call(&f.state, Method::POST, "/clasificar-manual", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["categoria"], "TRANSPORTE");
        assert_eq!(v["emoji"], "🚗");
        assert_eq!(v["monto_numerico"], 18.6);

        let (status, _) = call(&f.state, Method::POST, "/clasificar-manual", r#"{"empresa": 1}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let f = fixture();
        let (status, v) = call(&f.state, Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["status"], "healthy");
        assert_eq!(v["prueba"], "COMPRAS");

        struct Down;

        #[async_trait]
        impl Oracle for Down {
            async fn invoke(&self, _: &str, _: &GenerationConfig) -> Result<String, OracleError> {
                Err(OracleError::Transport("dns failure".to_string()))
            }
        }

        let down = fixture_with(
            Pipeline::new(Arc::new(Down), Arc::new(BcpSpending::new().unwrap())),
            Duration::from_secs(30),
        );
        let (status, v) = call(&down.state, Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(v["status"], "unhealthy");
        assert!(v["error"].as_str().unwrap().contains("dns failure"));
    }

    #[tokio::test]
    async fn test_batch_timeout() {
        struct Slow;

        #[async_trait]
        impl Oracle for Slow {
            async fn invoke(&self, _: &str, _: &GenerationConfig) -> Result<String, OracleError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("COMPRAS|tarde".to_string())
            }
        }

        let f = fixture_with(
            Pipeline::new(Arc::new(Slow), Arc::new(BcpSpending::new().unwrap())),
            Duration::from_millis(20),
        );
        let (status, _) = call(&f.state, Method::POST, "/clasificar-archivo", EXPORT).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        let f = fixture();
        let (status, _) = call(&f.state, Method::GET, "/docs", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&f.state, Method::GET, "/clasificar-manual", "").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
