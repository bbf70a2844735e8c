use chrono::NaiveDate;
use csv::WriterBuilder;
use serde::Serialize;
use std::io::Write;

use crate::dates::{date_is_before_today_at, get_date_object};
use crate::schedule::{ClassData, UserAppointmentsByOccurrence};

/// One line of the participation report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipationRow {
    pub occurrence: usize,
    pub date: String,
    pub weekday: String,
    pub hour: String,
    pub status: &'static str,
    pub appointment_id: String,
}

/// Per occurrence: `booked`, `cancelled`, `pending` (a date is still open)
/// or `missing` (every candidate date has passed).
pub fn build_participation(
    class: &ClassData,
    booked: &UserAppointmentsByOccurrence,
    today: NaiveDate,
) -> Vec<ParticipationRow> {
    class
        .individual_meetings
        .iter()
        .enumerate()
        .map(|(index, dates)| {
            let occurrence = index + 1;
            match booked.get(&occurrence) {
                Some(appt) => {
                    let display = get_date_object(&appt.start_time);
                    ParticipationRow {
                        occurrence,
                        date: appt.date().to_string(),
                        weekday: display.day_name,
                        hour: display.hour,
                        status: if appt.is_cancelled() { "cancelled" } else { "booked" },
                        appointment_id: appt.id.clone(),
                    }
                }
                None => {
                    let open = dates.iter().any(|d| !date_is_before_today_at(d, today));
                    ParticipationRow {
                        occurrence,
                        date: dates.join(" | "),
                        weekday: String::new(),
                        hour: String::new(),
                        status: if open { "pending" } else { "missing" },
                        appointment_id: String::new(),
                    }
                }
            }
        })
        .collect()
}

/// Writes the report with a header row
pub fn write_participation_csv<W: Write>(
    rows: &[ParticipationRow],
    writer: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = WriterBuilder::new()
        .has_headers(true)
        .from_writer(writer);

    for row in rows {
        wtr.serialize(row)?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Appointment;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn appointment(id: &str, start: &str, deleted: bool) -> Appointment {
        Appointment {
            id: id.to_string(),
            start_time: start.to_string(),
            finish_time: None,
            comments: None,
            additional_fields: None,
            class_id: None,
            type_id: None,
            client_id: None,
            employee_id: None,
            created_at: None,
            updated_at: None,
            deleted_at: deleted.then(|| "2025-08-01 12:00:00".to_string()),
            client: None,
            employee: None,
        }
    }

    fn class() -> ClassData {
        ClassData {
            name: None,
            individual_meetings: vec![
                vec!["2025-08-04".to_string()],
                vec!["2025-08-11".to_string(), "2025-08-12".to_string()],
                vec!["2025-08-18".to_string()],
                vec!["2025-08-25".to_string()],
            ],
            available: true,
        }
    }

    #[test]
    fn report_covers_every_occurrence() {
        let booked = BTreeMap::from([
            (1, appointment("a1", "2025-08-04 09:00:00", false)),
            (3, appointment("a3", "2025-08-18 14:30:00", true)),
        ]);
        let today = NaiveDate::from_ymd_opt(2025, 8, 20).unwrap();
        let rows = build_participation(&class(), &booked, today);

        let statuses: Vec<&str> = rows.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec!["booked", "missing", "cancelled", "pending"]);
        assert_eq!(rows[0].hour, "09:00");
        assert_eq!(rows[1].date, "2025-08-11 | 2025-08-12");
    }

    #[test]
    fn csv_has_header_and_one_line_per_row() {
        let booked = BTreeMap::from([(1, appointment("a1", "2025-08-04 09:00:00", false))]);
        let today = NaiveDate::from_ymd_opt(2025, 8, 20).unwrap();
        let rows = build_participation(&class(), &booked, today);

        let mut out = Vec::new();
        write_participation_csv(&rows, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "occurrence,date,weekday,hour,status,appointment_id");
        assert_eq!(lines[1], "1,2025-08-04,seg.,09:00,booked,a1");
        assert_eq!(lines.len(), 5);
    }
}
