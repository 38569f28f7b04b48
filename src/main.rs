use axum::{
    Form, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use vpr_forms_core::config::config_from_env_values;
use vpr_forms_core::memory::{InMemoryRecordStore, StaticEntities};
use vpr_forms_core::sample_form::{sample_entities, sample_session};
use vpr_forms_core::services::{StaticPreferences, SystemClock};
use vpr_forms_core::{
    Encounter, FormEntryConfig, FormError, FormEntrySession, FormServices, Mode, Submission,
    SubmissionOutcome,
};
use vpr_types::PatientId;

type HandlerError = (StatusCode, &'static str);

/// Application state shared across handlers
///
/// The configuration is resolved once at startup; every request builds its own form session.
#[derive(Clone)]
struct AppState {
    store: Arc<InMemoryRecordStore>,
    entities: Arc<StaticEntities>,
    config: Arc<FormEntryConfig>,
}

impl AppState {
    fn session(
        &self,
        mode: Mode,
        patient: PatientId,
        existing: Option<Encounter>,
    ) -> Result<FormEntrySession, HandlerError> {
        let services = FormServices::new(
            self.store.clone(),
            self.entities.clone(),
            Arc::new(StaticPreferences::new(None)),
            Arc::new(SystemClock),
        );
        sample_session(mode, self.config.clone(), services, patient, existing).map_err(internal)
    }

    fn encounter(&self, id: Uuid) -> Result<Encounter, HandlerError> {
        self.store
            .get(id)
            .ok_or((StatusCode::NOT_FOUND, "Encounter not found"))
    }
}

#[derive(Serialize, ToSchema)]
struct HealthRes {
    status: String,
}

/// One stored encounter, without its observations and conditions.
#[derive(Serialize, ToSchema)]
struct EncounterSummary {
    id: Uuid,
    encounter_type: String,
    datetime: Option<DateTime<Utc>>,
    voided: bool,
    observations: usize,
    conditions: usize,
}

impl From<&Encounter> for EncounterSummary {
    fn from(encounter: &Encounter) -> Self {
        Self {
            id: encounter.id,
            encounter_type: encounter.encounter_type.clone(),
            datetime: encounter.datetime,
            voided: encounter.voided,
            observations: encounter.active_observations().count(),
            conditions: encounter.active_conditions().count(),
        }
    }
}

#[derive(Deserialize)]
struct PatientQuery {
    patient: Option<u32>,
}

impl PatientQuery {
    fn patient(&self) -> PatientId {
        PatientId(self.patient.unwrap_or(1))
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(health, list_encounters),
    components(schemas(HealthRes, EncounterSummary))
)]
struct ApiDoc;

/// Main entry point for the VPR forms server
///
/// Serves the demo outpatient form over HTTP, keeping submitted encounters in memory.
///
/// # Environment Variables
/// - `VPR_FORMS_ADDR`: listen address (default: "0.0.0.0:3000")
/// - `VPR_FORMS_DATE_FORMAT`, `VPR_FORMS_DATETIME_FORMAT`: strftime display formats
/// - `VPR_FORMS_DEFAULT_OFFSET`: server UTC offset, e.g. "+01:00" (default: UTC)
/// - `VPR_FORMS_TIMEZONE_CONVERSIONS`: "true" or "false" (default: true)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vpr_forms_core=info".parse()?)
                .add_directive("vpr_forms_run=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config_from_env_values(
        std::env::var("VPR_FORMS_DATE_FORMAT").ok(),
        std::env::var("VPR_FORMS_DATETIME_FORMAT").ok(),
        std::env::var("VPR_FORMS_DEFAULT_OFFSET").ok(),
        std::env::var("VPR_FORMS_TIMEZONE_CONVERSIONS").ok(),
    )?;
    let addr = std::env::var("VPR_FORMS_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let state = AppState {
        store: Arc::new(InMemoryRecordStore::new()),
        entities: Arc::new(sample_entities()),
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/encounters", get(list_encounters).post(create_encounter))
        .route("/encounters/new", get(new_encounter))
        .route("/encounters/:id", get(view_encounter).post(update_encounter))
        .route("/encounters/:id/edit", get(edit_encounter))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!("++ Starting VPR forms on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn internal(err: FormError) -> HandlerError {
    tracing::error!("Form error: {:?}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
}

/// Wrap rendered form markup in a page; `action` adds the posting form element.
fn page(title: &str, body: &str, action: Option<&str>) -> Html<String> {
    let content = match action {
        Some(action) => format!("<form id=\"htmlform\" method=\"post\" action=\"{action}\">{body}</form>"),
        None => body.to_owned(),
    };
    Html(format!(
        "<!DOCTYPE html><html><head><title>{title}</title>\
         <script>function submitHtmlForm() {{ document.getElementById('htmlform').submit(); }}</script>\
         </head><body><h1>{title}</h1>{content}</body></html>"
    ))
}

fn submission(pairs: Vec<(String, String)>) -> Submission {
    Submission::from_pairs(pairs)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint
async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        status: "ok".into(),
    })
}

#[utoipa::path(
    get,
    path = "/encounters",
    params(("patient" = Option<u32>, Query, description = "Patient identifier (default 1)")),
    responses(
        (status = 200, description = "Encounters of the patient, oldest first", body = [EncounterSummary])
    )
)]
/// List the stored encounters of one patient
async fn list_encounters(
    State(state): State<AppState>,
    Query(query): Query<PatientQuery>,
) -> Json<Vec<EncounterSummary>> {
    let encounters = state.store.list(query.patient());
    Json(encounters.iter().map(EncounterSummary::from).collect())
}

/// Blank form in ENTER mode
async fn new_encounter(
    State(state): State<AppState>,
    Query(query): Query<PatientQuery>,
) -> Result<Html<String>, HandlerError> {
    let patient = query.patient();
    let session = state.session(Mode::Enter, patient, None)?;
    let html = session.render().map_err(internal)?;
    Ok(page(
        "New encounter",
        &html,
        Some(&format!("/encounters?patient={patient}")),
    ))
}

/// Submit the ENTER form; stores the encounter or re-renders with errors
async fn create_encounter(
    State(state): State<AppState>,
    Query(query): Query<PatientQuery>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, HandlerError> {
    let patient = query.patient();
    let mut session = state.session(Mode::Enter, patient, None)?;
    match session.submit(submission(pairs)).map_err(internal)? {
        SubmissionOutcome::Applied(encounter) => {
            let id = encounter.id;
            state.store.save(encounter);
            Ok(Redirect::to(&format!("/encounters/{id}")).into_response())
        }
        SubmissionOutcome::Rejected { html, .. } => Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            page(
                "New encounter",
                &html,
                Some(&format!("/encounters?patient={patient}")),
            ),
        )
            .into_response()),
    }
}

/// Read-only VIEW of a stored encounter
async fn view_encounter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Html<String>, HandlerError> {
    let encounter = state.encounter(id)?;
    let session = state.session(Mode::View, encounter.patient, Some(encounter))?;
    let html = session.render().map_err(internal)?;
    Ok(page(
        "Encounter",
        &format!("{html}<p><a href=\"/encounters/{id}/edit\">Edit</a></p>"),
        None,
    ))
}

/// Stored encounter in EDIT mode
async fn edit_encounter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Html<String>, HandlerError> {
    let encounter = state.encounter(id)?;
    let session = state.session(Mode::Edit, encounter.patient, Some(encounter))?;
    let html = session.render().map_err(internal)?;
    Ok(page(
        "Edit encounter",
        &html,
        Some(&format!("/encounters/{id}")),
    ))
}

/// Submit the EDIT form; replaces the stored encounter or re-renders with errors
async fn update_encounter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, HandlerError> {
    let encounter = state.encounter(id)?;
    let mut session = state.session(Mode::Edit, encounter.patient, Some(encounter))?;
    match session.submit(submission(pairs)).map_err(internal)? {
        SubmissionOutcome::Applied(encounter) => {
            state.store.save(encounter);
            Ok(Redirect::to(&format!("/encounters/{id}")).into_response())
        }
        SubmissionOutcome::Rejected { html, .. } => Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            page("Edit encounter", &html, Some(&format!("/encounters/{id}"))),
        )
            .into_response()),
    }
}
