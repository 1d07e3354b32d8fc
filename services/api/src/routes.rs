//! HTTP handlers over the occurrence dataset.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use dataset::{
    DenormalizedRecord, Dataset, HistoricalAverage, LoadError, OccurrenceRecord, QueryError,
    RecordFilter, TableStatus, WriteError,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::validation::{self, FieldError, Validator};

// ============================================================================
// State
// ============================================================================

pub struct AppState {
    pub dataset: Arc<Dataset>,
    pub title: String,
    pub version: String,
}

// ============================================================================
// Request types
// ============================================================================

// Fields stay raw so every problem is reported at once by the validator.

#[derive(Debug, Deserialize)]
struct OcorrenciasQuery {
    id_ra: Option<String>,
    ano: Option<String>,
    mes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaQuery {
    id_ra: Option<String>,
    ano: Option<String>,
    mes: Option<String>,
    cod_natureza: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OcorrenciaBody {
    id_ra: Option<serde_json::Value>,
    cod_natureza: Option<serde_json::Value>,
    quantidade: Option<serde_json::Value>,
    mes: Option<serde_json::Value>,
    ano: Option<serde_json::Value>,
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
    version: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: String,
    version: String,
    tables: Vec<TableStatus>,
}

#[derive(Debug, Serialize)]
struct OcorrenciaResponse {
    id: u64,
    id_ra: i64,
    #[serde(rename = "RegiaoAdministrativa")]
    regiao_administrativa: Option<String>,
    cod_natureza: i64,
    #[serde(rename = "Natureza")]
    natureza: Option<String>,
    #[serde(rename = "Mes")]
    mes: i64,
    #[serde(rename = "Ano")]
    ano: i64,
    #[serde(rename = "Quantidade")]
    quantidade: i64,
}

impl From<DenormalizedRecord> for OcorrenciaResponse {
    fn from(r: DenormalizedRecord) -> Self {
        Self {
            id: r.id,
            id_ra: r.region_id,
            regiao_administrativa: r.region_name,
            cod_natureza: r.category_code,
            natureza: r.category_name,
            mes: r.month,
            ano: r.year,
            quantidade: r.quantity,
        }
    }
}

#[derive(Debug, Serialize)]
struct MediaResponse {
    id_ra: i64,
    #[serde(rename = "RegiaoAdministrativa")]
    regiao_administrativa: Option<String>,
    cod_natureza: i64,
    #[serde(rename = "Natureza")]
    natureza: Option<String>,
    #[serde(rename = "Mes")]
    mes: i64,
    #[serde(rename = "Ano")]
    ano: i64,
    #[serde(rename = "Quantidade")]
    quantidade: i64,
    #[serde(rename = "MediaHistorica")]
    media_historica: f64,
}

impl From<HistoricalAverage> for MediaResponse {
    fn from(a: HistoricalAverage) -> Self {
        Self {
            id_ra: a.region_id,
            regiao_administrativa: a.region_name,
            cod_natureza: a.category_code,
            natureza: a.category_name,
            mes: a.month,
            ano: a.year,
            quantidade: a.current_quantity,
            media_historica: a.historical_mean,
        }
    }
}

#[derive(Serialize)]
struct NaturezaResponse {
    cod_natureza: i64,
    natureza: Option<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct ValidationResponse {
    detail: Vec<FieldError>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<FieldError>),
    NotFound(String),
    Internal(String),
}

impl From<Vec<FieldError>> for ApiError {
    fn from(errors: Vec<FieldError>) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<LoadError> for ApiError {
    fn from(e: LoadError) -> Self {
        error!(error = %e, "data source unavailable");
        ApiError::Internal("Data source unavailable".to_string())
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Load(e) => e.into(),
            not_found @ QueryError::NotFound { .. } => ApiError::NotFound(not_found.to_string()),
        }
    }
}

impl From<WriteError> for ApiError {
    fn from(e: WriteError) -> Self {
        error!(error = %e, "failed to append occurrence");
        ApiError::Internal("Failed to register occurrence".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(detail) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ValidationResponse { detail }),
            )
                .into_response(),
            ApiError::NotFound(error) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { error })).into_response()
            }
            ApiError::Internal(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { error }),
            )
                .into_response(),
        }
    }
}

/// Runs a dataset call on the blocking pool; loads and appends touch the filesystem.
async fn with_dataset<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Dataset) -> Result<T, ApiError> + Send + 'static,
{
    let dataset = Arc::clone(&state.dataset);
    tokio::task::spawn_blocking(move || f(&dataset))
        .await
        .map_err(|e| {
            error!(error = %e, "dataset task failed");
            ApiError::Internal("Internal error".to_string())
        })?
}

// ============================================================================
// Handlers
// ============================================================================

async fn root_handler(State(state): State<Arc<AppState>>) -> Json<RootResponse> {
    info!("root endpoint accessed");
    Json(RootResponse {
        message: "API Dados de Segurança Pública funcionando!",
        version: state.version.clone(),
    })
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Funcionando!",
        service: state.title.clone(),
        version: state.version.clone(),
        tables: state.dataset.status(),
    })
}

async fn ocorrencias_nomes_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OcorrenciasQuery>,
) -> Result<Json<Vec<OcorrenciaResponse>>, ApiError> {
    let mut v = Validator::new("query");
    let id_ra = v.int("id_ra", params.id_ra.as_ref(), validation::ID_RA);
    let ano = v.int("ano", params.ano.as_ref(), validation::ANO);
    let mes = v.int("mes", params.mes.as_ref(), validation::MES);
    v.finish()?;

    info!(id_ra, ano, mes, "occurrences requested");

    let filter = RecordFilter::new().region(id_ra).year(ano).month(mes);
    let records = with_dataset(&state, move |d| Ok(d.records(&filter)?)).await?;

    if records.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No occurrences found for RA {} in {:02}/{}",
            id_ra, mes, ano
        )));
    }

    info!(count = records.len(), "occurrences found");
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

async fn ocorrencias_media_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MediaQuery>,
) -> Result<Json<MediaResponse>, ApiError> {
    let mut v = Validator::new("query");
    let id_ra = v.int("id_ra", params.id_ra.as_ref(), validation::ID_RA);
    let ano = v.int("ano", params.ano.as_ref(), validation::ANO);
    let mes = v.int("mes", params.mes.as_ref(), validation::MES);
    let cod_natureza = v.int(
        "cod_natureza",
        params.cod_natureza.as_ref(),
        validation::COD_NATUREZA,
    );
    v.finish()?;

    let average = with_dataset(&state, move |d| {
        Ok(d.historical_average(id_ra, ano, mes, cod_natureza)?)
    })
    .await?;

    Ok(Json(average.into()))
}

async fn cadastrar_ocorrencia_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<OcorrenciaBody>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let Json(body) = body.map_err(|e| {
        ApiError::Validation(vec![FieldError::new("body", "", e.body_text())])
    })?;

    let mut v = Validator::new("body");
    let record = OccurrenceRecord {
        region_id: v.int("id_ra", body.id_ra.as_ref(), validation::ID_RA),
        category_code: v.int(
            "cod_natureza",
            body.cod_natureza.as_ref(),
            validation::COD_NATUREZA,
        ),
        quantity: v.int("quantidade", body.quantidade.as_ref(), validation::QUANTIDADE),
        month: v.int("mes", body.mes.as_ref(), validation::MES),
        year: v.int("ano", body.ano.as_ref(), validation::ANO),
    };
    v.finish()?;

    with_dataset(&state, move |d| Ok(d.append(&record)?)).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Ocorrências registradas com sucesso!",
        }),
    ))
}

async fn natureza_handler(
    State(state): State<Arc<AppState>>,
    Path(codigo): Path<String>,
) -> Result<Json<NaturezaResponse>, ApiError> {
    let mut v = Validator::new("path");
    let codigo = v.int("codigo", Some(&codigo), validation::CODIGO);
    v.finish()?;

    let found = with_dataset(&state, move |d| Ok(d.category(codigo)?)).await?;

    match found {
        Some(lookup) => Ok(Json(NaturezaResponse {
            cod_natureza: lookup.category_code,
            natureza: lookup.category_name,
        })),
        None => Err(ApiError::NotFound(format!(
            "Natureza {} not found",
            codigo
        ))),
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ocorrencias_nomes", get(ocorrencias_nomes_handler))
        .route("/ocorrencias_media", get(ocorrencias_media_handler))
        .route("/ocorrencias", axum::routing::post(cadastrar_ocorrencia_handler))
        .route("/natureza/:codigo", get(natureza_handler))
        .with_state(state)
}
