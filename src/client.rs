use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BookingError, ErrorResponse};
use crate::schedule::flow::SlotTicket;
use crate::schedule::types::{Appointment, ClassesData, CreateAppointment, MeetingType, Slot};
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq)]
pub struct SlotQuery {
    pub date: String,
    pub facilitator_id: String,
    pub client_id: Option<String>,
}

#[async_trait]
pub trait SchedulingApi: Send + Sync {
    /// Class catalog visible to the user, keyed by class id.
    async fn classes(&self, client_id: &str) -> Result<ClassesData, BookingError>;

    async fn meeting_type(&self, class_id: &str) -> Result<MeetingType, BookingError>;

    async fn user_appointments(&self, class_id: &str, client_id: &str) -> Result<Vec<Appointment>, BookingError>;

    /// Individual meeting slots for a facilitator on a date.
    async fn available_slots(&self, query: &SlotQuery) -> Result<Vec<Slot>, BookingError>;

    /// Group meeting slots, annotated with `appointment_count`.
    async fn group_slots(&self, class_id: &str, date: &str) -> Result<Vec<Slot>, BookingError>;

    async fn create_appointment(&self, appointment: &CreateAppointment) -> Result<Appointment, BookingError>;

    async fn request_cancellation(&self, class_id: &str, client_id: &str) -> Result<(), BookingError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotsOutcome {
    Ok { slots: Vec<Slot> },
    Empty,
    Error { detail: ErrorResponse },
}

impl SlotsOutcome {
    pub fn slots(&self) -> &[Slot] {
        match self {
            SlotsOutcome::Ok { slots } => slots,
            _ => &[],
        }
    }
}

impl From<Result<Vec<Slot>, BookingError>> for SlotsOutcome {
    fn from(result: Result<Vec<Slot>, BookingError>) -> Self {
        match result {
            Ok(slots) if slots.is_empty() => SlotsOutcome::Empty,
            Ok(slots) => SlotsOutcome::Ok { slots },
            Err(e) => SlotsOutcome::Error { detail: e.to_response() },
        }
    }
}

// Single attempt per call, no retry or caching.

/// Runs the fetch a [`SlotTicket`] asks for: group slots when the class uses
/// group meetings, the facilitator's individual slots otherwise.
pub async fn fetch_slots(api: &dyn SchedulingApi, ticket: &SlotTicket) -> SlotsOutcome {
    let result = if ticket.is_group {
        api.group_slots(&ticket.class_id, &ticket.date).await
    } else {
        let query = SlotQuery {
            date: ticket.date.clone(),
            facilitator_id: ticket.facilitator_id.clone(),
            client_id: ticket.client_id.clone(),
        };
        api.available_slots(&query).await
    };

    if let Err(e) = &result {
        tracing::warn!(class_id = %ticket.class_id, date = %ticket.date, error = %e, "Slot lookup failed");
    }
    result.into()
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct SlotsEnvelope {
    #[serde(default)]
    slots: Vec<Slot>,
}

fn upstream_error(status: u16, body: &str) -> BookingError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    BookingError::Upstream { status, message }
}

/// Decodes a backend body, treating an HTTP or embedded `status` outside 2xx
/// as a failure.
pub fn decode_body<T: DeserializeOwned>(http_status: u16, body: &str) -> Result<T, BookingError> {
    if !(200..300).contains(&http_status) {
        return Err(upstream_error(http_status, body));
    }

    let value: Value = serde_json::from_str(body)?;
    if let Some(status) = value.get("status").and_then(Value::as_u64) {
        if !(200..300).contains(&status) {
            return Err(upstream_error(u16::try_from(status).unwrap_or(502), body));
        }
    }
    Ok(serde_json::from_value(value)?)
}

pub struct HttpSchedulingApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpSchedulingApi {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.api_base_url.clone(),
            token: settings.api_token.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, BookingError> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        decode_body(status, &body)
    }
}

#[async_trait]
impl SchedulingApi for HttpSchedulingApi {
    #[tracing::instrument(skip(self))]
    async fn classes(&self, client_id: &str) -> Result<ClassesData, BookingError> {
        let request = self
            .client
            .get(self.url("/classes"))
            .query(&[("client_id", client_id)]);
        let envelope: DataEnvelope<ClassesData> = self.send(request).await?;
        Ok(envelope.data)
    }

    #[tracing::instrument(skip(self))]
    async fn meeting_type(&self, class_id: &str) -> Result<MeetingType, BookingError> {
        let request = self
            .client
            .get(self.url(&format!("/classes/{}/meeting-type", class_id)));
        let envelope: DataEnvelope<MeetingType> = self.send(request).await?;
        Ok(envelope.data)
    }

    #[tracing::instrument(skip(self))]
    async fn user_appointments(&self, class_id: &str, client_id: &str) -> Result<Vec<Appointment>, BookingError> {
        let request = self
            .client
            .get(self.url("/appointments"))
            .query(&[("class_id", class_id), ("client_id", client_id)]);
        let envelope: DataEnvelope<Vec<Appointment>> = self.send(request).await?;
        tracing::debug!(count = envelope.data.len(), "Fetched user appointments");
        Ok(envelope.data)
    }

    #[tracing::instrument(skip(self))]
    async fn available_slots(&self, query: &SlotQuery) -> Result<Vec<Slot>, BookingError> {
        let mut params = vec![
            ("date", query.date.as_str()),
            ("employee_id", query.facilitator_id.as_str()),
        ];
        if let Some(client_id) = &query.client_id {
            params.push(("client_id", client_id.as_str()));
        }
        let request = self.client.get(self.url("/slots")).query(&params);
        let envelope: SlotsEnvelope = self.send(request).await?;
        Ok(envelope.slots)
    }

    #[tracing::instrument(skip(self))]
    async fn group_slots(&self, class_id: &str, date: &str) -> Result<Vec<Slot>, BookingError> {
        let request = self
            .client
            .get(self.url(&format!("/classes/{}/group-slots", class_id)))
            .query(&[("date", date)]);
        let envelope: SlotsEnvelope = self.send(request).await?;
        Ok(envelope.slots)
    }

    #[tracing::instrument(skip(self, appointment), fields(class_id = %appointment.class_id, start = %appointment.start_time))]
    async fn create_appointment(&self, appointment: &CreateAppointment) -> Result<Appointment, BookingError> {
        let request = self.client.post(self.url("/appointments")).json(appointment);
        let envelope: DataEnvelope<Appointment> = self.send(request).await?;
        tracing::info!(appointment_id = %envelope.data.id, "Appointment created");
        Ok(envelope.data)
    }

    #[tracing::instrument(skip(self))]
    async fn request_cancellation(&self, class_id: &str, client_id: &str) -> Result<(), BookingError> {
        let request = self
            .client
            .post(self.url(&format!("/classes/{}/cancellation-requests", class_id)))
            .json(&serde_json::json!({ "client_id": client_id }));
        let _: Value = self.send(request).await?;
        tracing::info!("Enrollment cancellation requested");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_slot_envelope() {
        let body = r#"{"status":200,"slots":[{"id":1,"date":"2025-09-01","time":"09:00"}]}"#;
        let envelope: SlotsEnvelope = decode_body(200, body).unwrap();
        assert_eq!(envelope.slots.len(), 1);
        assert_eq!(envelope.slots[0].id, "1");
    }

    #[test]
    fn embedded_status_overrides_http_success() {
        let body = r#"{"status":404,"message":"Agenda não encontrada"}"#;
        let err = decode_body::<SlotsEnvelope>(200, body).unwrap_err();
        match err {
            BookingError::Upstream { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Agenda não encontrada");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn out_of_range_embedded_status_is_a_bad_gateway() {
        let body = r#"{"status":70000,"message":"weird"}"#;
        let err = decode_body::<Value>(200, body).unwrap_err();
        assert_eq!(err.to_response(), ErrorResponse::new(502, "weird"));
    }

    #[test]
    fn non_json_failure_body_becomes_the_message() {
        let err = decode_body::<Value>(502, "Bad Gateway\n").unwrap_err();
        assert_eq!(err.to_response(), ErrorResponse::new(502, "Bad Gateway"));
    }

    #[test]
    fn created_status_is_success() {
        let body = r#"{"status":201,"data":{"id":"a1","start_time":"2025-09-01 09:00:00"}}"#;
        let envelope: DataEnvelope<Appointment> = decode_body(201, body).unwrap();
        assert_eq!(envelope.data.start_time, "2025-09-01 09:00:00");
    }

    #[test]
    fn outcome_separates_empty_from_error() {
        assert_eq!(SlotsOutcome::from(Ok(vec![])), SlotsOutcome::Empty);
        let err = BookingError::Upstream {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(
            SlotsOutcome::from(Err(err)),
            SlotsOutcome::Error {
                detail: ErrorResponse::new(500, "boom")
            }
        );
    }
}
