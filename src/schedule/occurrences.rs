use chrono::NaiveDate;
use serde::Serialize;

use crate::dates::{check_if_any_date_is_after_today_at, date_is_before_today_at, get_date_object, DateObject};
use super::types::{Appointment, ClassData, ClassesData, MeetingDateGroup, UserAppointmentsByOccurrence};

/// 1-based occurrence whose candidate dates include `date`
pub fn occurrence_for_date(meetings: &MeetingDateGroup, date: &str) -> Option<usize> {
    meetings
        .iter()
        .position(|dates| dates.iter().any(|d| d == date))
        .map(|index| index + 1)
}

/// Maps the user's appointments onto mentorship occurrences.
///
/// Returns `None` while any input is missing or the class is not in the
/// catalog. Appointments outside every occurrence are dropped; when two land
/// on the same occurrence the later one in `appointments` wins.
pub fn index_appointments(
    appointments: Option<&[Appointment]>,
    class_id: Option<&str>,
    classes: Option<&ClassesData>,
) -> Option<UserAppointmentsByOccurrence> {
    let (appointments, class_id, classes) = (appointments?, class_id?, classes?);
    if class_id.is_empty() {
        return None;
    }
    let class = classes.get(class_id)?;

    let indexed = appointments
        .iter()
        .filter_map(|appt| {
            occurrence_for_date(&class.individual_meetings, appt.date()).map(|n| (n, appt.clone()))
        })
        .collect();
    Some(indexed)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateOption {
    pub date: String,
    pub display: DateObject,
    pub disabled: bool,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OccurrenceView {
    Booked {
        occurrence: usize,
        appointment: Appointment,
        display: DateObject,
    },
    Open {
        occurrence: usize,
        dates: Vec<DateOption>,
    },
}

impl OccurrenceView {
    pub fn occurrence(&self) -> usize {
        match self {
            OccurrenceView::Booked { occurrence, .. } | OccurrenceView::Open { occurrence, .. } => *occurrence,
        }
    }
}

/// ChooseDate listing: booked occurrences show their appointment, the rest
/// list their candidate dates.
pub fn occurrence_views(
    class: &ClassData,
    booked: &UserAppointmentsByOccurrence,
    selected_date: Option<&str>,
    today: NaiveDate,
) -> Vec<OccurrenceView> {
    class
        .individual_meetings
        .iter()
        .enumerate()
        .map(|(index, dates)| {
            let occurrence = index + 1;
            match booked.get(&occurrence) {
                Some(appointment) => OccurrenceView::Booked {
                    occurrence,
                    display: get_date_object(&appointment.start_time),
                    appointment: appointment.clone(),
                },
                None => OccurrenceView::Open {
                    occurrence,
                    dates: dates
                        .iter()
                        .map(|date| DateOption {
                            date: date.clone(),
                            display: get_date_object(date),
                            disabled: date_is_before_today_at(date, today),
                            active: selected_date == Some(date.as_str()),
                        })
                        .collect(),
                },
            }
        })
        .collect()
}

/// Enrollment cancellation stays open while any meeting is still ahead.
pub fn enrollment_cancellation_allowed(class: &ClassData, today: NaiveDate) -> bool {
    let dates: Vec<&str> = class
        .individual_meetings
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();
    check_if_any_date_is_after_today_at(&dates, today)
}
