use std::collections::{BTreeMap, HashMap};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Candidate dates per mentorship occurrence; outer index 0 is the first occurrence
pub type MeetingDateGroup = Vec<Vec<String>>;

/// Class configuration as served by the class service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub individual_meetings: MeetingDateGroup,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

/// class_id -> configuration
pub type ClassesData = HashMap<String, ClassData>;

/// A bookable time unit on a given date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub appointment_count: Option<i64>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub start_time: String,
    #[serde(default)]
    pub finish_time: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub additional_fields: Option<Value>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub class_id: Option<String>,
    #[serde(default)]
    pub type_id: Option<u32>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub client_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub employee_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub deleted_at: Option<String>,
    #[serde(default)]
    pub client: Option<Value>,
    #[serde(default)]
    pub employee: Option<Value>,
}

impl Appointment {
    /// Date part of `start_time` ("2025-08-25 10:00:00" -> "2025-08-25")
    pub fn date(&self) -> &str {
        self.start_time.split(' ').next().unwrap_or(&self.start_time)
    }

    pub fn is_cancelled(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Free-form answers attached to an appointment at creation time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Questions {
    #[serde(default)]
    pub social_network: String,
    #[serde(default)]
    pub main_topic: String,
    #[serde(default)]
    pub specific_questions: String,
}

/// Payload for the appointment-creation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAppointment {
    pub start_time: String,
    pub comments: String,
    pub additional_fields: Questions,
    pub class_id: String,
    pub type_id: u32,
    pub client_id: String,
    pub employee_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facilitator {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingType {
    #[serde(default)]
    pub is_group_meetings_enabled: bool,
    pub facilitator: Facilitator,
}

/// occurrence (1-based) -> the user's appointment for it
pub type UserAppointmentsByOccurrence = BTreeMap<usize, Appointment>;

fn id_from_value<E: serde::de::Error>(value: Value) -> Result<String, E> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(E::custom(format!("expected string or number id, got {}", other))),
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    id_from_value(Value::deserialize(deserializer)?)
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => id_from_value(value).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn appointment_accepts_numeric_ids_and_missing_fields() {
        let appt: Appointment = serde_json::from_value(json!({
            "id": 42,
            "start_time": "2025-08-25 10:00:00",
            "class_id": 7,
            "employee_id": "emp-1",
            "client_id": null
        }))
        .unwrap();
        assert_eq!(appt.id, "42");
        assert_eq!(appt.class_id.as_deref(), Some("7"));
        assert_eq!(appt.client_id, None);
        assert_eq!(appt.date(), "2025-08-25");
        assert!(!appt.is_cancelled());
    }

    #[test]
    fn class_data_defaults_to_available() {
        let class: ClassData = serde_json::from_value(json!({
            "individual_meetings": [["2025-08-18"]]
        }))
        .unwrap();
        assert!(class.available);
        assert_eq!(class.individual_meetings, vec![vec!["2025-08-18".to_string()]]);
    }

    #[test]
    fn slot_type_field_is_renamed() {
        let slot: Slot = serde_json::from_value(json!({
            "id": 3, "date": "2025-09-01", "time": "09:00", "appointment_count": 2, "type": "group"
        }))
        .unwrap();
        assert_eq!(slot.kind.as_deref(), Some("group"));
        assert_eq!(slot.appointment_count, Some(2));
    }
}
