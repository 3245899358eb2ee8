//! # API REST
//!
//! REST API for form entry.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - mapping core errors onto status codes
//!
//! Forms are addressed by name and widgets by their visible label, so a client never needs to
//! know the generated `w<n>` field names. Raw field names are still accepted for clients that
//! render the returned HTML themselves.

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use formentry_core::model::{EncounterId, PatientId, PatientProgram};
use formentry_core::{
    DataStore, FormEntryError, FormEntrySession, FormRepository, FormSubmission, Mode,
    PatientProgramQuery, PatientRepository, ProgramRepository, SessionOptions,
    SubmissionResults,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: DataStore,
    pub forms: FormRepository,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PatientRes {
    pub id: u32,
    pub uuid: String,
    pub given_name: String,
    pub family_name: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ListPatientsRes {
    pub patients: Vec<PatientRes>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PatientStateRes {
    pub workflow: u32,
    pub state: u32,
    pub start_date: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct EnrollmentRes {
    pub id: u32,
    pub program: u32,
    pub program_name: String,
    pub date_enrolled: String,
    pub date_completed: Option<String>,
    pub current_states: Vec<PatientStateRes>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ListEnrollmentsRes {
    pub enrollments: Vec<EnrollmentRes>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ListFormsRes {
    pub forms: Vec<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RenderFormRes {
    pub mode: String,
    pub html: String,
    /// Widget label to field name.
    pub fields: BTreeMap<String, String>,
}

#[derive(Default, Serialize, Deserialize, ToSchema)]
pub struct SubmitFormReq {
    /// Values keyed by widget label.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Values keyed by raw field name.
    #[serde(default)]
    pub parameters: BTreeMap<String, Vec<String>>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct FieldErrorRes {
    pub field: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SubmitFormRes {
    pub encounter_id: Option<u32>,
    pub encounter_created: bool,
    pub enrolled: Vec<u32>,
    pub errors: Vec<FieldErrorRes>,
}

#[derive(Deserialize)]
pub struct EncounterFormQuery {
    #[serde(default)]
    pub mode: Option<Mode>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_patients,
        list_enrollments,
        list_forms,
        render_form,
        submit_form,
        render_encounter_form,
        edit_encounter_form,
    ),
    components(schemas(
        HealthRes,
        PatientRes,
        ListPatientsRes,
        PatientStateRes,
        EnrollmentRes,
        ListEnrollmentsRes,
        ListFormsRes,
        RenderFormRes,
        SubmitFormReq,
        FieldErrorRes,
        SubmitFormRes,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/patients", get(list_patients))
        .route("/patients/:id/programs", get(list_enrollments))
        .route("/forms", get(list_forms))
        .route(
            "/patients/:id/forms/:name",
            get(render_form).post(submit_form),
        )
        .route(
            "/encounters/:id/forms/:name",
            get(render_encounter_form).put(edit_encounter_form),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

type ApiError = (StatusCode, &'static str);

fn error_response(context: &str, e: FormEntryError) -> ApiError {
    match e {
        FormEntryError::UnknownPatient(_)
        | FormEntryError::UnknownEncounter(_)
        | FormEntryError::UnknownForm(_) => {
            tracing::debug!("{context}: {e}");
            (StatusCode::NOT_FOUND, "Not found")
        }
        FormEntryError::InvalidFormName(_)
        | FormEntryError::InvalidInput(_)
        | FormEntryError::ViewModeSubmission => {
            tracing::debug!("{context}: {e}");
            (StatusCode::BAD_REQUEST, "Bad request")
        }
        FormEntryError::MissingAttribute { .. }
        | FormEntryError::InvalidAttribute { .. }
        | FormEntryError::Template(_)
        | FormEntryError::UnknownProgram(_)
        | FormEntryError::UnknownWorkflow(_)
        | FormEntryError::UnknownState { .. } => {
            tracing::warn!("{context}: {e}");
            (StatusCode::UNPROCESSABLE_ENTITY, "Form template cannot be used")
        }
        FormEntryError::MultipleStatesInWorkflow { .. }
        | FormEntryError::MultipleActiveEnrollments { .. }
        | FormEntryError::NonInitialState { .. }
        | FormEntryError::OverlappingEnrollment { .. }
        | FormEntryError::EnrollmentDateAfterCompletion { .. }
        | FormEntryError::TransitionBeforeCurrentState { .. } => {
            tracing::warn!("{context}: {e}");
            (StatusCode::CONFLICT, "Conflicts with existing enrollment")
        }
        e => {
            tracing::error!("{context}: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

fn enrollment_res(programs: &ProgramRepository, pp: &PatientProgram) -> EnrollmentRes {
    EnrollmentRes {
        id: pp.id.get(),
        program: pp.program.get(),
        program_name: programs
            .get_program(pp.program)
            .map(|p| p.name.to_string())
            .unwrap_or_default(),
        date_enrolled: pp.date_enrolled.to_string(),
        date_completed: pp.date_completed.map(|d| d.to_string()),
        current_states: pp
            .current_states()
            .into_iter()
            .map(|s| PatientStateRes {
                workflow: s.workflow.get(),
                state: s.state.get(),
                start_date: s.start_date.to_string(),
            })
            .collect(),
    }
}

fn render_res(session: &FormEntrySession) -> RenderFormRes {
    RenderFormRes {
        mode: session.mode().to_string(),
        html: session.html_to_display().to_string(),
        fields: session.widget_fields().clone(),
    }
}

fn submission_from(
    session: &FormEntrySession,
    req: SubmitFormReq,
) -> Result<FormSubmission, ApiError> {
    let mut submission = FormSubmission::from(req.parameters);
    for (label, value) in req.fields {
        match session.widget_field(&label) {
            Some(field) => submission.set_parameter(field, value),
            None => {
                tracing::debug!("no widget labelled {label:?}");
                return Err((StatusCode::BAD_REQUEST, "Unknown widget label"));
            }
        }
    }
    Ok(submission)
}

fn submit_res(results: SubmissionResults) -> (StatusCode, Json<SubmitFormRes>) {
    let status = if results.has_errors() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else if results.encounter_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let res = SubmitFormRes {
        encounter_id: results.encounter_id().map(EncounterId::get),
        encounter_created: results.encounter_created(),
        enrolled: results.enrolled().iter().map(|id| id.get()).collect(),
        errors: results
            .errors()
            .iter()
            .map(|e| FieldErrorRes {
                field: e.field.clone(),
                message: e.message.clone(),
            })
            .collect(),
    };
    (status, Json(res))
}

fn open_encounter(
    state: &AppState,
    encounter: u32,
    name: &str,
    mode: Mode,
) -> Result<FormEntrySession, ApiError> {
    let template = state
        .forms
        .load(name)
        .map_err(|e| error_response("Load form", e))?;
    FormEntrySession::for_encounter(
        state.store.clone(),
        EncounterId(encounter),
        mode,
        &template,
        SessionOptions::new().with_form_name(name),
    )
    .map_err(|e| error_response("Open encounter", e))
}

fn open_new(state: &AppState, patient: u32, name: &str) -> Result<FormEntrySession, ApiError> {
    let template = state
        .forms
        .load(name)
        .map_err(|e| error_response("Load form", e))?;
    FormEntrySession::new(
        state.store.clone(),
        PatientId(patient),
        &template,
        SessionOptions::new().with_form_name(name),
    )
    .map_err(|e| error_response("Open form", e))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Form entry REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/patients",
    responses(
        (status = 200, description = "List of patients", body = ListPatientsRes)
    )
)]
#[axum::debug_handler]
async fn list_patients(State(state): State<AppState>) -> Json<ListPatientsRes> {
    let patients = PatientRepository::new(state.store)
        .list_patients()
        .into_iter()
        .map(|p| PatientRes {
            id: p.id.get(),
            uuid: p.uuid.to_string(),
            given_name: p.given_name.to_string(),
            family_name: p.family_name.to_string(),
        })
        .collect();
    Json(ListPatientsRes { patients })
}

#[utoipa::path(
    get,
    path = "/patients/{id}/programs",
    params(("id" = u32, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Non-voided enrollments of the patient", body = ListEnrollmentsRes),
        (status = 404, description = "Unknown patient")
    )
)]
/// List a patient's program enrollments, oldest first.
#[axum::debug_handler]
async fn list_enrollments(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<u32>,
) -> Result<Json<ListEnrollmentsRes>, ApiError> {
    let patient = PatientId(id);
    if PatientRepository::new(state.store.clone())
        .get_patient(patient)
        .is_none()
    {
        return Err(error_response(
            "List enrollments",
            FormEntryError::UnknownPatient(patient),
        ));
    }

    let programs = ProgramRepository::new(state.store);
    let enrollments = programs
        .patient_programs(patient, &PatientProgramQuery::default())
        .iter()
        .map(|pp| enrollment_res(&programs, pp))
        .collect();
    Ok(Json(ListEnrollmentsRes { enrollments }))
}

#[utoipa::path(
    get,
    path = "/forms",
    responses(
        (status = 200, description = "Names of available forms", body = ListFormsRes),
        (status = 500, description = "Internal server error")
    )
)]
#[axum::debug_handler]
async fn list_forms(State(state): State<AppState>) -> Result<Json<ListFormsRes>, ApiError> {
    let forms = state
        .forms
        .list()
        .map_err(|e| error_response("List forms", e))?;
    Ok(Json(ListFormsRes { forms }))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/forms/{name}",
    params(
        ("id" = u32, Path, description = "Patient id"),
        ("name" = String, Path, description = "Form name")
    ),
    responses(
        (status = 200, description = "Form rendered for a new encounter", body = RenderFormRes),
        (status = 404, description = "Unknown patient or form"),
        (status = 409, description = "Form conflicts with the patient's enrollments"),
        (status = 422, description = "Form template cannot be used")
    )
)]
/// Render a form in enter mode.
#[axum::debug_handler]
async fn render_form(
    State(state): State<AppState>,
    AxumPath((id, name)): AxumPath<(u32, String)>,
) -> Result<Json<RenderFormRes>, ApiError> {
    let session = open_new(&state, id, &name)?;
    Ok(Json(render_res(&session)))
}

#[utoipa::path(
    post,
    path = "/patients/{id}/forms/{name}",
    params(
        ("id" = u32, Path, description = "Patient id"),
        ("name" = String, Path, description = "Form name")
    ),
    request_body = SubmitFormReq,
    responses(
        (status = 201, description = "Encounter created", body = SubmitFormRes),
        (status = 200, description = "Submitted without an encounter", body = SubmitFormRes),
        (status = 422, description = "Field errors", body = SubmitFormRes),
        (status = 404, description = "Unknown patient or form"),
        (status = 409, description = "Submission conflicts with existing enrollments")
    )
)]
/// Submit a form for a new encounter.
#[axum::debug_handler]
async fn submit_form(
    State(state): State<AppState>,
    AxumPath((id, name)): AxumPath<(u32, String)>,
    Json(req): Json<SubmitFormReq>,
) -> Result<(StatusCode, Json<SubmitFormRes>), ApiError> {
    let session = open_new(&state, id, &name)?;
    let submission = submission_from(&session, req)?;
    let results = session
        .submit(&submission)
        .map_err(|e| error_response("Submit form", e))?;
    Ok(submit_res(results))
}

#[utoipa::path(
    get,
    path = "/encounters/{id}/forms/{name}",
    params(
        ("id" = u32, Path, description = "Encounter id"),
        ("name" = String, Path, description = "Form name"),
        ("mode" = Option<String>, Query, description = "`view` (default) or `edit`")
    ),
    responses(
        (status = 200, description = "Form rendered over the encounter", body = RenderFormRes),
        (status = 400, description = "Unsupported mode"),
        (status = 404, description = "Unknown encounter or form"),
        (status = 422, description = "Form template cannot be used")
    )
)]
/// Render a form over an existing encounter.
#[axum::debug_handler]
async fn render_encounter_form(
    State(state): State<AppState>,
    AxumPath((id, name)): AxumPath<(u32, String)>,
    Query(query): Query<EncounterFormQuery>,
) -> Result<Json<RenderFormRes>, ApiError> {
    let mode = query.mode.unwrap_or(Mode::View);
    let session = open_encounter(&state, id, &name, mode)?;
    Ok(Json(render_res(&session)))
}

#[utoipa::path(
    put,
    path = "/encounters/{id}/forms/{name}",
    params(
        ("id" = u32, Path, description = "Encounter id"),
        ("name" = String, Path, description = "Form name")
    ),
    request_body = SubmitFormReq,
    responses(
        (status = 200, description = "Encounter updated", body = SubmitFormRes),
        (status = 422, description = "Field errors", body = SubmitFormRes),
        (status = 404, description = "Unknown encounter or form"),
        (status = 409, description = "Submission conflicts with existing enrollments")
    )
)]
/// Submit a form in edit mode over an existing encounter.
#[axum::debug_handler]
async fn edit_encounter_form(
    State(state): State<AppState>,
    AxumPath((id, name)): AxumPath<(u32, String)>,
    Json(req): Json<SubmitFormReq>,
) -> Result<(StatusCode, Json<SubmitFormRes>), ApiError> {
    let session = open_encounter(&state, id, &name, Mode::Edit)?;
    let submission = submission_from(&session, req)?;
    let results = session
        .submit(&submission)
        .map_err(|e| error_response("Edit encounter", e))?;
    Ok(submit_res(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use formentry_core::CoreConfig;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tower::ServiceExt;

    const DATASET: &str = include_str!("../../core/fixtures/regression-dataset.yaml");
    const OTHER_PATIENT_STATES: &str =
        include_str!("../../core/fixtures/other-patient-states.yaml");

    fn state(with_enrollment: bool) -> AppState {
        let store = DataStore::from_yaml(DATASET).expect("dataset should load");
        if with_enrollment {
            store
                .execute_dataset(OTHER_PATIENT_STATES)
                .expect("fixture should merge");
        }
        let form_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../forms");
        let cfg = CoreConfig::new(form_dir, None, false).expect("config should build");
        AppState {
            store,
            forms: FormRepository::new(Arc::new(cfg)),
        }
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.expect("request should complete");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request should build")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = send(router(state(false)), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn lists_patients_and_forms() {
        let app = router(state(false));
        let (status, body) = send(app.clone(), get("/patients")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["patients"]
            .as_array()
            .expect("patients array")
            .iter()
            .any(|p| p["id"] == 2));

        let (status, body) = send(app, get("/forms")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["forms"]
            .as_array()
            .expect("forms array")
            .iter()
            .any(|f| f == "enroll-in-program"));
    }

    #[tokio::test]
    async fn render_returns_labelled_fields() {
        let (status, body) = send(
            router(state(false)),
            get("/patients/2/forms/enroll-in-program"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "enter");
        assert!(body["fields"]["Enrollment Date:"].is_string());
        assert!(body["html"]
            .as_str()
            .expect("html string")
            .contains("Enrollment Date:"));
    }

    #[tokio::test]
    async fn unknown_form_is_not_found() {
        let (status, _) = send(router(state(false)), get("/patients/2/forms/no-such-form")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn submitting_by_label_enrolls_the_patient() {
        let st = state(false);
        let app = router(st.clone());
        let (status, body) = send(
            app.clone(),
            json_request(
                "POST",
                "/patients/2/forms/enroll-in-program",
                serde_json::json!({
                    "fields": {
                        "Enrollment Date:": "2012-01-10",
                        "Encounter Date:": "2012-01-10",
                        "Encounter Location:": "2",
                        "Encounter Provider:": "502"
                    }
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["encounter_created"], true);
        assert_eq!(body["enrolled"].as_array().map(Vec::len), Some(1));

        let (status, body) = send(app, get("/patients/2/programs")).await;
        assert_eq!(status, StatusCode::OK);
        let enrollment = &body["enrollments"][0];
        assert_eq!(enrollment["program"], 10);
        assert_eq!(enrollment["date_enrolled"], "2012-01-10");
        assert_eq!(enrollment["current_states"][0]["state"], 200);
    }

    #[tokio::test]
    async fn field_errors_are_unprocessable() {
        let (status, body) = send(
            router(state(false)),
            json_request(
                "POST",
                "/patients/2/forms/enroll-in-program",
                serde_json::json!({ "fields": { "Encounter Location:": "2" } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!body["errors"].as_array().expect("errors array").is_empty());
    }

    #[tokio::test]
    async fn conflicting_states_in_form_are_a_conflict() {
        let (status, _) = send(
            router(state(false)),
            get("/patients/2/forms/invalid-patient-states"),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[test]
    fn template_and_reference_errors_are_client_errors() {
        let unusable = [
            FormEntryError::UnknownProgram("TB Program".into()),
            FormEntryError::MissingAttribute {
                tag: "enrollInProgram".into(),
                attribute: "programId".into(),
            },
        ];
        for e in unusable {
            assert_eq!(
                error_response("Open form", e).0,
                StatusCode::UNPROCESSABLE_ENTITY
            );
        }
    }

    #[tokio::test]
    async fn unknown_label_is_bad_request() {
        let (status, _) = send(
            router(state(false)),
            json_request(
                "POST",
                "/patients/2/forms/enroll-in-program",
                serde_json::json!({ "fields": { "Favourite Colour:": "blue" } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn editing_an_encounter_moves_the_enrollment_date() {
        let st = state(true);
        let app = router(st.clone());
        let (status, _) = send(
            app.clone(),
            json_request(
                "PUT",
                "/encounters/1/forms/edit-program-enrollment-date",
                serde_json::json!({
                    "fields": {
                        "Enrollment Date:": "2008-07-01",
                        "Encounter Date:": "2008-08-01",
                        "Encounter Location:": "2",
                        "Encounter Provider:": "502"
                    }
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let programs = ProgramRepository::new(st.store);
        let pp = programs
            .active_enrollment(PatientId(2), formentry_core::model::ProgramId(1))
            .expect("enrollment should remain active");
        assert_eq!(pp.date_enrolled.to_string(), "2008-07-01");
    }

    #[tokio::test]
    async fn view_mode_is_the_default_for_encounters() {
        let (status, body) = send(
            router(state(true)),
            get("/encounters/1/forms/edit-program-enrollment-date"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "view");
    }

    #[tokio::test]
    async fn enter_mode_is_rejected_for_encounters() {
        let (status, _) = send(
            router(state(true)),
            get("/encounters/1/forms/edit-program-enrollment-date?mode=enter"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
