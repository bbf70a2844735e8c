use crate::activities::{missing_activities, ActivityState, ActivityStatus};
use crate::dates::DateObject;
use crate::form::ParticipationRow;
use crate::schedule::OccurrenceView;

/// "1ª mentoria", "2ª mentoria", ...
pub fn format_occurrence_label(occurrence: usize) -> String {
    format!("{}ª mentoria", occurrence)
}

/// Confirmation modal text for a booked slot
pub fn confirmation_message(display: &DateObject) -> String {
    if !display.valid {
        return "Agendamento confirmado".to_string();
    }
    format!(
        "Agendamento confirmado: {}, {} de {} às {}",
        display.day_name, display.day_number, display.month_name, display.hour
    )
}

/// Prints the ChooseDate listing in a readable format
pub fn print_occurrences(class_name: &str, views: &[OccurrenceView]) {
    println!("\n=== {} ===", class_name);
    for view in views {
        let label = format_occurrence_label(view.occurrence());
        match view {
            OccurrenceView::Booked { appointment, display, .. } => {
                println!(
                    "  {} -> {} {} de {} às {} (ID: {})",
                    label, display.day_name, display.day_number, display.month_name, display.hour, appointment.id
                );
            }
            OccurrenceView::Open { dates, .. } => {
                let available: Vec<String> = dates
                    .iter()
                    .filter(|d| !d.disabled)
                    .map(|d| format!("{} {}", d.display.day_name, d.date))
                    .collect();
                if available.is_empty() {
                    println!("  {} -> [NO DATES LEFT]", label);
                } else {
                    println!("  {} -> open: {}", label, available.join(", "));
                }
            }
        }
    }
}

pub fn print_participation(rows: &[ParticipationRow]) {
    let booked = rows.iter().filter(|r| r.status == "booked").count();
    println!("\nParticipation: {}/{} mentorships booked", booked, rows.len());
    for row in rows {
        println!(
            "  {} [{}] {} {}",
            format_occurrence_label(row.occurrence),
            row.status,
            row.date,
            row.hour
        );
    }
}

fn activity_state_label(state: ActivityState) -> &'static str {
    match state {
        ActivityState::Upcoming => "upcoming",
        ActivityState::Missing => "MISSING",
        ActivityState::Submitted => "submitted",
        ActivityState::Evaluated => "evaluated",
    }
}

pub fn print_activities(statuses: &[ActivityStatus]) {
    println!("\n=== Activities ===");
    for status in statuses {
        let grade = status.grade.map(|g| format!(" grade {:.1}", g)).unwrap_or_default();
        let edit = if status.editable { " (editable)" } else { "" };
        println!(
            "  {} [{}]{}{}",
            status.title,
            activity_state_label(status.state),
            grade,
            edit
        );
    }
    let missing = missing_activities(statuses);
    if !missing.is_empty() {
        println!("\n{} activity(ies) still owed", missing.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::get_date_object;

    #[test]
    fn confirmation_shows_weekday_day_month_and_hour() {
        let display = get_date_object("2025-09-01 09:00:00");
        assert_eq!(
            confirmation_message(&display),
            "Agendamento confirmado: seg., 1 de setembro às 09:00"
        );
    }

    #[test]
    fn confirmation_without_valid_date_stays_generic() {
        assert_eq!(confirmation_message(&get_date_object("??")), "Agendamento confirmado");
    }

    #[test]
    fn occurrence_label_is_ordinal() {
        assert_eq!(format_occurrence_label(2), "2ª mentoria");
    }
}
