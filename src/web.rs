use actix_session::storage::CookieSessionStore;
use actix_session::{Session, SessionMiddleware};
use actix_web::cookie::Key;
use actix_web::http::StatusCode;
use actix_web::{middleware, web, App, HttpResponse, HttpServer, Result};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::client::{fetch_slots, SchedulingApi};
use crate::dates::sao_paulo_today;
use crate::display::confirmation_message;
use crate::error::{BookingError, ErrorResponse, FlowError};
use crate::form::{build_participation, validate_cpf, write_participation_csv, DateRequest, QuestionsRequest, SessionRequest, SlotRequest};
use crate::schedule::{
    enrollment_cancellation_allowed, index_appointments, occurrence_views, Appointment, BookingFlow, ClassData,
    ClassesData, FlowStep, FlowView, MeetingContext, UserAppointmentsByOccurrence,
};
use crate::schedule::flow::Submission;
use crate::settings::Settings;

const CPF_KEY: &str = "cpf";
const FLOW_ID_KEY: &str = "flow_id";
const FLOW_IDLE_TTL: Duration = Duration::from_secs(4 * 60 * 60);

/// Booking state for one session and class
pub struct FlowSession {
    pub flow: BookingFlow,
    pub class: ClassData,
    pub appointments: Vec<Appointment>,
    touched: Instant,
}

impl FlowSession {
    fn booked(&self) -> UserAppointmentsByOccurrence {
        let class_id = self.flow.class_id().to_string();
        let classes = ClassesData::from([(class_id.clone(), self.class.clone())]);
        index_appointments(Some(self.appointments.as_slice()), Some(&class_id), Some(&classes)).unwrap_or_default()
    }
}

pub struct AppState {
    pub api: Arc<dyn SchedulingApi>,
    pub settings: Settings,
    flows: Mutex<HashMap<String, FlowSession>>,
}

impl AppState {
    pub fn new(api: Arc<dyn SchedulingApi>, settings: Settings) -> Self {
        Self {
            api,
            settings,
            flows: Mutex::new(HashMap::new()),
        }
    }

    fn flows(&self) -> MutexGuard<'_, HashMap<String, FlowSession>> {
        self.flows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn touch<'a>(flows: &'a mut HashMap<String, FlowSession>, key: &str) -> Option<&'a mut FlowSession> {
    let entry = flows.get_mut(key)?;
    entry.touched = Instant::now();
    Some(entry)
}

// a flow with a create call in flight is kept until the call returns
fn prune_idle(flows: &mut HashMap<String, FlowSession>, now: Instant) {
    flows.retain(|_, entry| entry.flow.is_submitting() || now.duration_since(entry.touched) < FLOW_IDLE_TTL);
}

fn drop_session_flows(flows: &mut HashMap<String, FlowSession>, flow_id: &str) {
    let prefix = format!("{}:", flow_id);
    flows.retain(|key, entry| !key.starts_with(&prefix) || entry.flow.is_submitting());
}

struct Identity {
    cpf: String,
    flow_id: String,
}

impl Identity {
    fn flow_key(&self, class_id: &str) -> String {
        format!("{}:{}", self.flow_id, class_id)
    }
}

fn error_response(status: u16, message: impl Into<String>) -> HttpResponse {
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(code).json(ErrorResponse::new(status, message))
}

fn upstream_failure(err: &BookingError) -> HttpResponse {
    tracing::error!(error = %err, "Scheduling backend call failed");
    let detail = err.to_response();
    let status = if detail.status >= 400 { detail.status } else { 502 };
    error_response(status, detail.message)
}

fn flow_failure(err: &FlowError) -> HttpResponse {
    error_response(err.status(), err.to_string())
}

fn identity(session: &Session) -> Result<Option<Identity>> {
    let cpf = session.get::<String>(CPF_KEY)?;
    let flow_id = session.get::<String>(FLOW_ID_KEY)?;
    Ok(cpf.zip(flow_id).map(|(cpf, flow_id)| Identity { cpf, flow_id }))
}

fn unauthorized() -> HttpResponse {
    error_response(401, "Sign in before booking")
}

fn no_flow() -> HttpResponse {
    error_response(409, "Load the class occurrences before booking")
}

// Stores the identity issued by the credentials provider
async fn start_session(
    req: web::Json<SessionRequest>,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let cpf = match validate_cpf(&req.cpf) {
        Ok(cpf) => cpf,
        Err(message) => return Ok(error_response(400, message)),
    };

    if let Some(previous) = session.get::<String>(FLOW_ID_KEY)? {
        drop_session_flows(&mut state.flows(), &previous);
    }
    session.renew();
    session.insert(CPF_KEY, &cpf)?;
    session.insert(FLOW_ID_KEY, format!("{:016x}", rand::random::<u64>()))?;

    Ok(HttpResponse::Ok().json(json!({"success": true})))
}

async fn get_occurrences(
    path: web::Path<String>,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let class_id = path.into_inner();
    let Some(identity) = identity(&session)? else {
        return Ok(unauthorized());
    };

    let classes = match state.api.classes(&identity.cpf).await {
        Ok(classes) => classes,
        Err(e) => return Ok(upstream_failure(&e)),
    };
    let Some(class) = classes.get(&class_id).cloned() else {
        // class data not there yet: keep the client on its loading state
        return Ok(HttpResponse::Ok().json(json!({"loading": true})));
    };
    let meeting = match state.api.meeting_type(&class_id).await {
        Ok(meeting) => meeting,
        Err(e) => return Ok(upstream_failure(&e)),
    };
    let appointments = match state.api.user_appointments(&class_id, &identity.cpf).await {
        Ok(appointments) => appointments,
        Err(e) => return Ok(upstream_failure(&e)),
    };

    let settings = &state.settings;
    let context = MeetingContext::new(
        &meeting,
        &class,
        settings.group_limit,
        settings.individual_type_id,
        settings.group_type_id,
    );
    let today = sao_paulo_today();

    let mut flows = state.flows();
    let now = Instant::now();
    prune_idle(&mut flows, now);
    let entry = flows
        .entry(identity.flow_key(&class_id))
        .or_insert_with(|| FlowSession {
            flow: BookingFlow::new(class_id.clone(), identity.cpf.clone(), context.clone()),
            class: class.clone(),
            appointments: Vec::new(),
            touched: now,
        });
    entry.touched = now;
    entry.flow.refresh_meeting(context);
    entry.class = class;
    entry.appointments = appointments;

    let booked = entry.booked();
    let views = occurrence_views(&entry.class, &booked, entry.flow.selected_date(), today);

    Ok(HttpResponse::Ok().json(json!({
        "loading": false,
        "class_id": class_id,
        "is_group_meetings_enabled": meeting.is_group_meetings_enabled,
        "facilitator": meeting.facilitator,
        "occurrences": views,
        "cancellation_allowed": enrollment_cancellation_allowed(&entry.class, today),
        "flow": entry.flow.view(),
    })))
}

async fn select_date(
    path: web::Path<String>,
    req: web::Json<DateRequest>,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let class_id = path.into_inner();
    let Some(identity) = identity(&session)? else {
        return Ok(unauthorized());
    };
    if let Err(message) = req.validate() {
        return Ok(error_response(400, message));
    }
    let key = identity.flow_key(&class_id);

    let ticket = {
        let mut flows = state.flows();
        let Some(entry) = touch(&mut flows, &key) else {
            return Ok(no_flow());
        };
        let booked = entry.booked();
        match entry.flow.select_date(&entry.class, &booked, req.occurrence, req.date.trim(), sao_paulo_today()) {
            Ok(ticket) => ticket,
            Err(e) => return Ok(flow_failure(&e)),
        }
    };

    tracing::info!(class_id = %class_id, date = %ticket.date, group = ticket.is_group, "Fetching slots");
    let outcome = fetch_slots(state.api.as_ref(), &ticket).await;

    let mut flows = state.flows();
    let Some(entry) = touch(&mut flows, &key) else {
        return Ok(no_flow());
    };
    let applied = entry.flow.apply_slots(&ticket, outcome);

    Ok(HttpResponse::Ok().json(json!({
        "applied": applied,
        "flow": entry.flow.view(),
    })))
}

async fn select_slot(
    path: web::Path<String>,
    req: web::Json<SlotRequest>,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let class_id = path.into_inner();
    let Some(identity) = identity(&session)? else {
        return Ok(unauthorized());
    };
    if let Err(message) = req.validate() {
        return Ok(error_response(400, message));
    }

    let mut flows = state.flows();
    let Some(entry) = touch(&mut flows, &identity.flow_key(&class_id)) else {
        return Ok(no_flow());
    };
    if let Err(e) = entry.flow.select_slot(req.slot_id.trim()) {
        return Ok(flow_failure(&e));
    }

    Ok(HttpResponse::Ok().json(json!({"flow": entry.flow.view()})))
}

async fn submit(
    path: web::Path<String>,
    req: web::Json<QuestionsRequest>,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let class_id = path.into_inner();
    let Some(identity) = identity(&session)? else {
        return Ok(unauthorized());
    };
    let key = identity.flow_key(&class_id);

    let submission = {
        let mut flows = state.flows();
        let Some(entry) = touch(&mut flows, &key) else {
            return Ok(no_flow());
        };
        match entry.flow.prepare_submission(req.into_inner().into(), Utc::now()) {
            Ok(submission) => submission,
            Err(FlowError::TooSoon) => {
                return Ok(HttpResponse::Conflict().json(json!({
                    "status": 409,
                    "message": FlowError::TooSoon.to_string(),
                    "flow": entry.flow.view(),
                })));
            }
            Err(e) => return Ok(flow_failure(&e)),
        }
    };

    // run to completion even if the client goes away, so the flow never
    // stays marked as submitting
    let task = actix_web::rt::spawn(finish_submission(state.clone(), key, class_id, submission));
    task.await.map_err(actix_web::error::ErrorInternalServerError)
}

async fn finish_submission(
    state: web::Data<AppState>,
    key: String,
    class_id: String,
    submission: Submission,
) -> HttpResponse {
    let result = state.api.create_appointment(&submission.payload).await;
    let created_id = result.as_ref().ok().map(|appointment| appointment.id.clone());

    let mut flows = state.flows();
    let Some(entry) = touch(&mut flows, &key) else {
        return match result {
            Ok(appointment) => created_without_flow(&appointment.id, None),
            Err(e) => upstream_failure(&e),
        };
    };
    if !entry.flow.complete(&submission, result, &mut entry.appointments) {
        return match created_id {
            Some(id) => created_without_flow(&id, Some(entry.flow.view())),
            None => error_response(409, "Booking changed before the submission finished"),
        };
    }

    let view = entry.flow.view();
    match entry.flow.step() {
        FlowStep::Submitted => {
            let message = view
                .confirmation
                .as_ref()
                .map(|c| confirmation_message(&c.display))
                .unwrap_or_default();
            tracing::info!(class_id = %class_id, start = %submission.payload.start_time, "Appointment booked");
            HttpResponse::Created().json(json!({
                "status": 201,
                "message": message,
                "flow": view,
            }))
        }
        _ => HttpResponse::BadGateway().json(json!({
            "status": 502,
            "message": view.message.clone().unwrap_or_default(),
            "flow": view,
        })),
    }
}

fn created_without_flow(appointment_id: &str, flow: Option<FlowView>) -> HttpResponse {
    tracing::warn!(appointment_id, "Appointment created after its booking flow moved on");
    HttpResponse::Created().json(json!({
        "status": 201,
        "message": "Agendamento confirmado",
        "appointment_id": appointment_id,
        "flow": flow,
    }))
}

async fn dismiss_conflict(
    path: web::Path<String>,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let class_id = path.into_inner();
    let Some(identity) = identity(&session)? else {
        return Ok(unauthorized());
    };

    let mut flows = state.flows();
    let Some(entry) = touch(&mut flows, &identity.flow_key(&class_id)) else {
        return Ok(no_flow());
    };
    if let Err(e) = entry.flow.dismiss_conflict() {
        return Ok(flow_failure(&e));
    }
    Ok(HttpResponse::Ok().json(json!({"flow": entry.flow.view()})))
}

async fn restart(
    path: web::Path<String>,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let class_id = path.into_inner();
    let Some(identity) = identity(&session)? else {
        return Ok(unauthorized());
    };

    let mut flows = state.flows();
    let Some(entry) = touch(&mut flows, &identity.flow_key(&class_id)) else {
        return Ok(no_flow());
    };
    if let Err(e) = entry.flow.restart() {
        return Ok(flow_failure(&e));
    }
    Ok(HttpResponse::Ok().json(json!({"flow": entry.flow.view()})))
}

async fn request_cancellation(
    path: web::Path<String>,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let class_id = path.into_inner();
    let Some(identity) = identity(&session)? else {
        return Ok(unauthorized());
    };

    let classes = match state.api.classes(&identity.cpf).await {
        Ok(classes) => classes,
        Err(e) => return Ok(upstream_failure(&e)),
    };
    let Some(class) = classes.get(&class_id) else {
        return Ok(error_response(404, "Class not found"));
    };
    if !enrollment_cancellation_allowed(class, sao_paulo_today()) {
        return Ok(error_response(409, "All meetings of this class are over"));
    }

    match state.api.request_cancellation(&class_id, &identity.cpf).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({"status": 200, "success": true}))),
        Err(e) => Ok(upstream_failure(&e)),
    }
}

async fn participation_csv(
    path: web::Path<String>,
    session: Session,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let class_id = path.into_inner();
    let Some(identity) = identity(&session)? else {
        return Ok(unauthorized());
    };

    let classes = match state.api.classes(&identity.cpf).await {
        Ok(classes) => classes,
        Err(e) => return Ok(upstream_failure(&e)),
    };
    let appointments = match state.api.user_appointments(&class_id, &identity.cpf).await {
        Ok(appointments) => appointments,
        Err(e) => return Ok(upstream_failure(&e)),
    };
    let (Some(class), Some(booked)) = (
        classes.get(&class_id),
        index_appointments(Some(appointments.as_slice()), Some(&class_id), Some(&classes)),
    ) else {
        return Ok(error_response(404, "Class not found"));
    };

    let rows = build_participation(class, &booked, sao_paulo_today());
    let mut body = Vec::new();
    write_participation_csv(&rows, &mut body)
        .map_err(|e| actix_web::error::ErrorInternalServerError(format!("Failed to write report: {}", e)))?;

    Ok(HttpResponse::Ok().content_type("text/csv; charset=utf-8").body(body))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/session", web::post().to(start_session))
        .service(
            web::scope("/api/classes/{class_id}")
                .route("/occurrences", web::get().to(get_occurrences))
                .route("/date", web::post().to(select_date))
                .route("/slot", web::post().to(select_slot))
                .route("/submit", web::post().to(submit))
                .route("/conflict/dismiss", web::post().to(dismiss_conflict))
                .route("/restart", web::post().to(restart))
                .route("/cancellation", web::post().to(request_cancellation))
                .route("/participation.csv", web::get().to(participation_csv)),
        );
}

pub async fn start_server(settings: Settings, api: Arc<dyn SchedulingApi>) -> std::io::Result<()> {
    let key = Key::from(settings.session_secret.as_bytes());
    let port = settings.port;
    let app_state = web::Data::new(AppState::new(api, settings));

    tracing::info!(port, "Starting booking server");

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .wrap(SessionMiddleware::new(CookieSessionStore::default(), key.clone()))
            .configure(configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
