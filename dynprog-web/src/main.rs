//! Servidor web Axum para decodificar lattices de tags via hipergrafo

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use dynprog_core::{
    HypergraphError, HypergraphOptions, InferenceMode, InferenceSummary, Result, TagLattice,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinError;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Limite de amostras por requisição
const MAX_SAMPLES: usize = 1_000;

/// Estado compartilhado da aplicação
struct AppState {
    options: HypergraphOptions,
}

/// Tabelas de log-scores; `null` numa célula significa `-inf` (transição proibida).
#[derive(Debug, Deserialize)]
struct DecodeRequest {
    emissions: Vec<Vec<Option<f64>>>,
    transitions: Vec<Vec<Option<f64>>>,
    #[serde(default)]
    start: Option<Vec<Option<f64>>>,
    #[serde(default)]
    end: Option<Vec<Option<f64>>>,
    #[serde(default)]
    mode: Option<InferenceMode>,
    #[serde(default)]
    samples: usize,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    sparse_transitions: bool,
}

#[derive(Debug, Serialize)]
struct DecodeResponse {
    mode: InferenceMode,
    log_z: f64,
    e_log_z: f64,
    entropy: f64,
    best_path: Vec<usize>,
    best_log_weight: f64,
    tag_marginals: Vec<Vec<f64>>,
    samples: Vec<Vec<usize>>,
    num_nodes: usize,
    num_edges: usize,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let options = match std::env::var("DYNPROG_OPTIONS") {
        Ok(path) => match HypergraphOptions::from_path(&path) {
            Ok(options) => options,
            Err(err) => {
                warn!(%path, error = %err, "opções inválidas, usando padrão");
                HypergraphOptions::default()
            }
        },
        Err(_) => HypergraphOptions::default(),
    };
    let app = router(Arc::new(AppState { options }));

    let addr = std::env::var("DYNPROG_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Servidor dynprog iniciado em http://{}", addr);
    axum::serve(listener, app).await
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/decode", post(decode_handler))
        .layer(cors)
        .with_state(state)
}

/// Retorna a página principal HTML
async fn index_handler() -> impl IntoResponse {
    Html(include_str!("templates/index.html"))
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Decodificação via HTTP POST
async fn decode_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DecodeRequest>,
) -> impl IntoResponse {
    info!(
        positions = req.emissions.len(),
        tags = req.transitions.len(),
        samples = req.samples,
        "decodificando"
    );

    // A inferência é síncrona: roda fora do runtime
    let options = state.options.clone();
    let outcome = tokio::task::spawn_blocking(move || decode(req, options)).await;
    decode_response(outcome)
}

/// Erros do motor viram 422 com a categoria; falha da tarefa vira 500.
fn decode_response(outcome: std::result::Result<Result<DecodeResponse>, JoinError>) -> Response {
    match outcome {
        Ok(Ok(response)) => Json(response).into_response(),
        Ok(Err(err)) => {
            warn!(category = %err.category(), error = %err, "falha na decodificação");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({
                    "error": err.to_string(),
                    "category": err.category(),
                })),
            )
                .into_response()
        }
        Err(join_err) => {
            warn!(error = %join_err, "tarefa de decodificação abortada");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": join_err.to_string()})),
            )
                .into_response()
        }
    }
}

fn scores(row: Vec<Option<f64>>) -> Vec<f64> {
    row.into_iter().map(|s| s.unwrap_or(f64::NEG_INFINITY)).collect()
}

fn table(rows: Vec<Vec<Option<f64>>>) -> Vec<Vec<f64>> {
    rows.into_iter().map(scores).collect()
}

/// Monta o lattice, pontua e extrai melhor caminho, marginais e amostras.
fn decode(req: DecodeRequest, options: HypergraphOptions) -> Result<DecodeResponse> {
    if req.samples > MAX_SAMPLES {
        return Err(HypergraphError::ConfigInvalid {
            field: "samples",
            reason: format!("at most {MAX_SAMPLES} samples per request, got {}", req.samples),
        });
    }
    let mode = req.mode.unwrap_or_default();

    let mut lattice = TagLattice::new(table(req.emissions), table(req.transitions))
        .sparse_transitions(req.sparse_transitions);
    if let Some(start) = req.start {
        lattice = lattice.with_start(scores(start));
    }
    if let Some(end) = req.end {
        lattice = lattice.with_end(scores(end));
    }

    let mut graph = lattice.build(options)?;
    let summary = InferenceSummary::compute(&mut graph, mode)?;
    let best = graph.fetch_best_hyperpath(Vec::new())?;
    graph.fetch_posteriors(InferenceMode::Marginal)?;

    let mut rng = StdRng::seed_from_u64(req.seed.unwrap_or(0));
    let samples = (0..req.samples)
        .map(|_| graph.fetch_sample_hyperpath(&mut rng, Vec::new()).map(|s| s.widget))
        .collect::<Result<Vec<_>>>()?;

    Ok(DecodeResponse {
        mode,
        log_z: summary.log_z,
        e_log_z: summary.e_log_z,
        entropy: summary.entropy,
        best_path: best.widget,
        best_log_weight: best.log_weight,
        tag_marginals: lattice.tag_marginals(),
        samples,
        num_nodes: summary.num_nodes,
        num_edges: summary.num_edges,
    })
}
