//! HTTP surface
//!
//! Routes:
//! - `POST /lab` - create a lab or extend it with new tenants (multipart form)
//! - `DELETE /lab/{lab_name}` - cascade-delete a lab
//! - `GET /` - health probe
//!
//! The create form carries: `students` (a `text/csv` roster file), `labName`,
//! `deploymentMode` (`YAML`, `CHART`, or `CHART_URL`), an optional
//! `isIndividual` flag (anything but `"false"` means individual mode), and
//! `config` - a `text/yaml` manifest file, a chart archive, or a chart
//! reference depending on the mode.
//!
//! Requests for the same lab are serialized behind a per-lab mutex, so a
//! concurrent create and delete cannot interleave their control-plane calls.
//! Distinct labs proceed concurrently. A disconnecting caller drops the
//! request future, cancelling the remaining chain.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use thiserror::Error;
use tracing::info;

use crate::chart::{DeploymentMode, DeploymentSource};
use crate::control::ControlPlane;
use crate::retry::RetryConfig;
use crate::roster::{parse_roster, ProvisionMode};
use crate::{provision, Error};

/// Maximum accepted request body size; chart archives can be sizeable.
const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// HTTP-layer errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed form field
    #[error("{0}")]
    BadRequest(String),

    /// A form file arrived with a content type the field does not accept
    #[error("{0}")]
    UnsupportedMediaType(String),

    /// Provisioning engine failure
    #[error(transparent)]
    Engine(#[from] Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::UnsupportedMediaType(m) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, m.clone()),
            ApiError::Engine(Error::Validation(m)) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::Engine(Error::Decode(m)) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::Engine(e) if e.is_not_found() => (StatusCode::NOT_FOUND, e.to_string()),
            ApiError::Engine(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Shared state of the HTTP surface
#[derive(Clone)]
pub struct AppState {
    control: Arc<dyn ControlPlane>,
    retry: RetryConfig,
    locks: Arc<DashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AppState {
    /// Create the server state around a control-plane handle
    pub fn new(control: Arc<dyn ControlPlane>, retry: RetryConfig) -> Self {
        Self {
            control,
            retry,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// The serialization lock for one lab name
    fn lab_lock(&self, lab_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.entry(lab_name.to_string()).or_default().clone()
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/lab", post(create_lab))
        .route("/lab/{lab_name}", delete(delete_lab))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health() -> &'static str {
    "Hello world!"
}

/// Lab names become namespace-name segments, so only identifier characters
/// survive: hyphens are stripped (they are the namespace separator) and the
/// rest must be lowercase alphanumeric.
fn sanitize_lab_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.replace('-', "").to_lowercase();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
        return Err(ApiError::BadRequest(format!(
            "labName must contain only letters and digits, got {raw:?}"
        )));
    }
    Ok(name)
}

/// Collected fields of the create-lab multipart form
#[derive(Default)]
struct LabForm {
    students: Option<Vec<u8>>,
    lab_name: Option<String>,
    deployment_mode: Option<String>,
    is_individual: Option<String>,
    config: Option<Vec<u8>>,
    config_content_type: Option<String>,
}

impl LabForm {
    async fn collect(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("malformed multipart form: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(ToString::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed to read field {name}: {e}")))?;

            match name.as_str() {
                "students" => {
                    if content_type.as_deref() != Some("text/csv") {
                        return Err(ApiError::UnsupportedMediaType(
                            "students must be one of text/csv types".to_string(),
                        ));
                    }
                    form.students = Some(data.to_vec());
                }
                "labName" => form.lab_name = Some(text(&name, &data)?),
                "deploymentMode" => form.deployment_mode = Some(text(&name, &data)?),
                "isIndividual" => form.is_individual = Some(text(&name, &data)?),
                "config" => {
                    form.config_content_type = content_type;
                    form.config = Some(data.to_vec());
                }
                _ => {}
            }
        }

        Ok(form)
    }

    fn require<T>(value: Option<T>, name: &str) -> Result<T, ApiError> {
        value.ok_or_else(|| ApiError::BadRequest(format!("missing form field {name}")))
    }
}

fn text(name: &str, data: &[u8]) -> Result<String, ApiError> {
    String::from_utf8(data.to_vec())
        .map_err(|_| ApiError::BadRequest(format!("field {name} is not valid UTF-8")))
}

/// Validate the config payload against its mode and wrap it as a source
///
/// Content types are checked here; rendering happens inside orchestration,
/// after tenant provisioning.
fn deployment_source(mode: DeploymentMode, form: &LabForm) -> Result<DeploymentSource, ApiError> {
    let config = LabForm::require(form.config.as_deref(), "config")?;
    let content_type = form.config_content_type.as_deref();

    match mode {
        DeploymentMode::Manifest => {
            if content_type != Some("text/yaml") {
                return Err(ApiError::UnsupportedMediaType(
                    "config must be one of text/yaml types".to_string(),
                ));
            }
            Ok(DeploymentSource::Manifest(text("config", config)?))
        }
        DeploymentMode::ChartArchive => {
            if !matches!(
                content_type,
                Some("application/gzip") | Some("application/octet-stream")
            ) {
                return Err(ApiError::UnsupportedMediaType(
                    "config must be one of application/gzip, application/octet-stream types"
                        .to_string(),
                ));
            }
            Ok(DeploymentSource::ChartArchive(config.to_vec()))
        }
        DeploymentMode::ChartReference => {
            Ok(DeploymentSource::ChartReference(text("config", config)?))
        }
    }
}

async fn create_lab(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    let form = LabForm::collect(multipart).await?;

    let lab_name = sanitize_lab_name(&LabForm::require(form.lab_name.clone(), "labName")?)?;
    let mode_field = LabForm::require(form.deployment_mode.clone(), "deploymentMode")?;
    let mode = DeploymentMode::from_str(&mode_field)?;
    let provision_mode = match form.is_individual.as_deref() {
        Some("false") => ProvisionMode::Group,
        _ => ProvisionMode::Individual,
    };

    let roster = LabForm::require(form.students.as_deref(), "students")?;
    let students = parse_roster(roster)?;

    let source = deployment_source(mode, &form)?;

    info!(lab = %lab_name, students = students.len(), ?mode, "Create lab requested");

    let lock = state.lab_lock(&lab_name);
    let _guard = lock.lock().await;

    let credentials = provision::create_lab(
        state.control.as_ref(),
        &state.retry,
        &lab_name,
        &students,
        provision_mode,
        &source,
    )
    .await?;

    Ok(Json(credentials))
}

async fn delete_lab(
    State(state): State<AppState>,
    Path(lab_name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let lab_name = sanitize_lab_name(&lab_name)?;

    info!(lab = %lab_name, "Delete lab requested");

    let lock = state.lab_lock(&lab_name);
    let _guard = lock.lock().await;

    provision::delete_lab(state.control.as_ref(), &lab_name).await?;
    Ok(StatusCode::NO_CONTENT)
}
