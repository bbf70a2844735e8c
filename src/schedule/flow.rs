use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::client::SlotsOutcome;
use crate::dates::{date_is_before_today_at, get_date_object, is_date_time_one_hour_before_at, DateObject};
use crate::error::{BookingError, ErrorResponse, FlowError};
use super::slot_utils::{compose_start_time, is_slot_available, slot_card, SlotCard};
use super::types::{Appointment, ClassData, CreateAppointment, MeetingType, Questions, Slot, UserAppointmentsByOccurrence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    ChooseDate,
    ChooseSlot,
    AnswerQuestions,
    Submitted,
    Conflict,
    Failed,
}

impl FlowStep {
    pub fn name(self) -> &'static str {
        match self {
            FlowStep::ChooseDate => "choosing a date",
            FlowStep::ChooseSlot => "choosing a slot",
            FlowStep::AnswerQuestions => "answering questions",
            FlowStep::Submitted => "submitted",
            FlowStep::Conflict => "showing a conflict",
            FlowStep::Failed => "failed",
        }
    }
}

/// What the class's meeting-type lookup and settings say about booking
#[derive(Debug, Clone, PartialEq)]
pub struct MeetingContext {
    pub is_group: bool,
    pub facilitator_id: String,
    pub group_limit: i64,
    pub class_available: bool,
    pub type_id: u32,
}

impl MeetingContext {
    pub fn new(meeting: &MeetingType, class: &ClassData, group_limit: i64, individual_type_id: u32, group_type_id: u32) -> Self {
        let is_group = meeting.is_group_meetings_enabled;
        Self {
            is_group,
            facilitator_id: meeting.facilitator.id.clone(),
            group_limit,
            class_available: class.available,
            type_id: if is_group { group_type_id } else { individual_type_id },
        }
    }
}

/// Which slot list to fetch, stamped with the generation it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct SlotTicket {
    pub generation: u64,
    pub class_id: String,
    pub date: String,
    pub is_group: bool,
    pub facilitator_id: String,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub generation: u64,
    pub payload: CreateAppointment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Confirmation {
    pub appointment: Appointment,
    pub display: DateObject,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotsView {
    Loading,
    Ok { cards: Vec<SlotCard> },
    Empty,
    Error { detail: ErrorResponse },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowView {
    pub step: FlowStep,
    pub occurrence: Option<usize>,
    pub selected_date: Option<String>,
    pub slots: Option<SlotsView>,
    pub selected_slot: Option<SlotCard>,
    pub start_time: Option<String>,
    pub confirmation: Option<Confirmation>,
    pub message: Option<String>,
}

// Every date selection, submission and restart bumps `generation`; a result
// is only applied while its ticket matches.
#[derive(Debug, Clone)]
pub struct BookingFlow {
    class_id: String,
    client_id: String,
    meeting: MeetingContext,
    step: FlowStep,
    generation: u64,
    occurrence: Option<usize>,
    selected_date: Option<String>,
    slots: Option<SlotsOutcome>,
    selected_slot: Option<Slot>,
    start_time: Option<String>,
    confirmation: Option<Appointment>,
    failure: Option<ErrorResponse>,
    // generation of the create call still awaiting its result
    in_flight: Option<u64>,
}

impl BookingFlow {
    pub fn new(class_id: impl Into<String>, client_id: impl Into<String>, meeting: MeetingContext) -> Self {
        Self {
            class_id: class_id.into(),
            client_id: client_id.into(),
            meeting,
            step: FlowStep::ChooseDate,
            generation: 0,
            occurrence: None,
            selected_date: None,
            slots: None,
            selected_slot: None,
            start_time: None,
            confirmation: None,
            failure: None,
            in_flight: None,
        }
    }

    pub fn step(&self) -> FlowStep {
        self.step
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn selected_date(&self) -> Option<&str> {
        self.selected_date.as_deref()
    }

    pub fn start_time(&self) -> Option<&str> {
        self.start_time.as_deref()
    }

    pub fn meeting(&self) -> &MeetingContext {
        &self.meeting
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Picks up a fresh meeting-type lookup; ignored once a date is chosen.
    pub fn refresh_meeting(&mut self, meeting: MeetingContext) -> bool {
        if self.step != FlowStep::ChooseDate {
            return false;
        }
        self.meeting = meeting;
        true
    }

    fn expect_idle(&self) -> Result<(), FlowError> {
        match self.in_flight {
            Some(_) => Err(FlowError::SubmissionInFlight),
            None => Ok(()),
        }
    }

    fn expect_step(&self, allowed: &[FlowStep], expected: &'static str) -> Result<(), FlowError> {
        self.expect_idle()?;
        if allowed.contains(&self.step) {
            Ok(())
        } else {
            Err(FlowError::WrongStep {
                expected,
                actual: self.step.name(),
            })
        }
    }

    /// Picks a date for an open occurrence and asks for its slots.
    pub fn select_date(
        &mut self,
        class: &ClassData,
        booked: &UserAppointmentsByOccurrence,
        occurrence: usize,
        date: &str,
        today: NaiveDate,
    ) -> Result<SlotTicket, FlowError> {
        self.expect_step(
            &[FlowStep::ChooseDate, FlowStep::ChooseSlot, FlowStep::AnswerQuestions],
            "choosing a date",
        )?;

        let dates = occurrence
            .checked_sub(1)
            .and_then(|index| class.individual_meetings.get(index))
            .ok_or(FlowError::UnknownOccurrence(occurrence))?;
        if booked.contains_key(&occurrence) {
            return Err(FlowError::AlreadyBooked(occurrence));
        }
        if !dates.iter().any(|d| d == date) {
            return Err(FlowError::DateNotOffered(date.to_string()));
        }
        if date_is_before_today_at(date, today) {
            return Err(FlowError::DateInPast(date.to_string()));
        }

        self.generation += 1;
        self.step = FlowStep::ChooseSlot;
        self.occurrence = Some(occurrence);
        self.selected_date = Some(date.to_string());
        self.slots = None;
        self.selected_slot = None;
        self.start_time = None;

        Ok(SlotTicket {
            generation: self.generation,
            class_id: self.class_id.clone(),
            date: date.to_string(),
            is_group: self.meeting.is_group,
            facilitator_id: self.meeting.facilitator_id.clone(),
            client_id: Some(self.client_id.clone()),
        })
    }

    /// Stores a slot lookup result. Returns false when the ticket is stale.
    pub fn apply_slots(&mut self, ticket: &SlotTicket, outcome: SlotsOutcome) -> bool {
        if ticket.generation != self.generation || self.step != FlowStep::ChooseSlot {
            tracing::debug!(
                ticket = ticket.generation,
                current = self.generation,
                "Discarding stale slot response"
            );
            return false;
        }
        self.slots = Some(outcome);
        true
    }

    pub fn slot_cards(&self) -> Vec<SlotCard> {
        self.slots
            .as_ref()
            .map(|outcome| {
                outcome
                    .slots()
                    .iter()
                    .map(|slot| {
                        slot_card(slot, self.meeting.is_group, self.meeting.group_limit, self.meeting.class_available)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn select_slot(&mut self, slot_id: &str) -> Result<&str, FlowError> {
        self.expect_step(&[FlowStep::ChooseSlot, FlowStep::AnswerQuestions], "choosing a slot")?;

        let slot = self
            .slots
            .as_ref()
            .and_then(|outcome| outcome.slots().iter().find(|s| s.id == slot_id))
            .cloned()
            .ok_or_else(|| FlowError::SlotNotFound(slot_id.to_string()))?;
        if !is_slot_available(&slot, self.meeting.is_group, self.meeting.group_limit, self.meeting.class_available) {
            return Err(FlowError::SlotUnavailable(slot_id.to_string()));
        }
        let start_time = compose_start_time(&slot).map_err(|e| FlowError::InvalidDate(e.input))?;

        self.step = FlowStep::AnswerQuestions;
        self.selected_slot = Some(slot);
        let start = self.start_time.insert(start_time);
        Ok(start.as_str())
    }

    /// Builds the creation payload, or moves to `Conflict` when the slot
    /// starts less than an hour from `now`.
    pub fn prepare_submission(&mut self, questions: Questions, now: DateTime<Utc>) -> Result<Submission, FlowError> {
        self.expect_step(&[FlowStep::AnswerQuestions], "answering questions")?;
        let start_time = self.start_time.clone().ok_or_else(|| FlowError::WrongStep {
            expected: "choosing a slot",
            actual: self.step.name(),
        })?;

        if is_date_time_one_hour_before_at(&start_time, now) {
            tracing::info!(class_id = %self.class_id, start = %start_time, "Slot starts within one hour");
            self.step = FlowStep::Conflict;
            return Err(FlowError::TooSoon);
        }

        self.generation += 1;
        self.in_flight = Some(self.generation);
        Ok(Submission {
            generation: self.generation,
            payload: CreateAppointment {
                start_time,
                comments: String::new(),
                additional_fields: questions,
                class_id: self.class_id.clone(),
                type_id: self.meeting.type_id,
                client_id: self.client_id.clone(),
                employee_id: self.meeting.facilitator_id.clone(),
            },
        })
    }

    /// Applies the creation result. A created appointment is always put at
    /// the front of `appointments`; the step only moves when `submission` is
    /// the one in flight. Returns false when it is not.
    pub fn complete(
        &mut self,
        submission: &Submission,
        result: Result<Appointment, BookingError>,
        appointments: &mut Vec<Appointment>,
    ) -> bool {
        if let Ok(appointment) = &result {
            appointments.retain(|a| a.id != appointment.id);
            appointments.insert(0, appointment.clone());
        }
        if self.in_flight != Some(submission.generation) || self.step != FlowStep::AnswerQuestions {
            tracing::debug!(ticket = submission.generation, current = self.generation, "Stale submission result");
            return false;
        }
        self.in_flight = None;
        match result {
            Ok(appointment) => {
                self.confirmation = Some(appointment);
                self.step = FlowStep::Submitted;
            }
            Err(e) => {
                tracing::warn!(class_id = %self.class_id, error = %e, "Appointment submission failed");
                self.failure = Some(e.to_response());
                self.step = FlowStep::Failed;
            }
        }
        true
    }

    pub fn confirmation(&self) -> Option<Confirmation> {
        self.confirmation.as_ref().map(|appointment| Confirmation {
            display: get_date_object(&appointment.start_time),
            appointment: appointment.clone(),
        })
    }

    /// Closes the conflict modal and returns to slot selection.
    pub fn dismiss_conflict(&mut self) -> Result<(), FlowError> {
        self.expect_step(&[FlowStep::Conflict], "showing a conflict")?;
        self.step = FlowStep::ChooseSlot;
        self.selected_slot = None;
        self.start_time = None;
        Ok(())
    }

    /// Back to date selection; pending slot lookups become stale. Refused
    /// while a create call is in flight.
    pub fn restart(&mut self) -> Result<(), FlowError> {
        self.expect_idle()?;
        self.generation += 1;
        self.step = FlowStep::ChooseDate;
        self.occurrence = None;
        self.selected_date = None;
        self.slots = None;
        self.selected_slot = None;
        self.start_time = None;
        self.confirmation = None;
        self.failure = None;
        Ok(())
    }

    pub fn view(&self) -> FlowView {
        let slots = match self.step {
            FlowStep::ChooseSlot | FlowStep::AnswerQuestions | FlowStep::Conflict => Some(match &self.slots {
                None => SlotsView::Loading,
                Some(SlotsOutcome::Ok { .. }) => SlotsView::Ok {
                    cards: self.slot_cards(),
                },
                Some(SlotsOutcome::Empty) => SlotsView::Empty,
                Some(SlotsOutcome::Error { detail }) => SlotsView::Error { detail: detail.clone() },
            }),
            _ => None,
        };
        let message = match self.step {
            FlowStep::Conflict => Some(FlowError::TooSoon.to_string()),
            FlowStep::Failed => self.failure.as_ref().map(|f| f.message.clone()),
            _ => None,
        };
        FlowView {
            step: self.step,
            occurrence: self.occurrence,
            selected_date: self.selected_date.clone(),
            slots,
            selected_slot: self.selected_slot.as_ref().map(|slot| {
                slot_card(slot, self.meeting.is_group, self.meeting.group_limit, self.meeting.class_available)
            }),
            start_time: self.start_time.clone(),
            confirmation: self.confirmation(),
            message,
        }
    }
}
