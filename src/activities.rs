use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::dates::{is_date_within_edit_period_at, parse_date_time};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub title: String,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Submitted,
    Evaluated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySubmission {
    pub activity_id: String,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub grade: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    Upcoming,
    Missing,
    Submitted,
    Evaluated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityStatus {
    pub activity_id: String,
    pub title: String,
    pub state: ActivityState,
    pub grade: Option<f64>,
    /// Submission may still be changed
    pub editable: bool,
}

/// One status per activity, in activity order. `now` is a Sao Paulo wall time.
pub fn reconcile(activities: &[Activity], submissions: &[ActivitySubmission], now: NaiveDateTime) -> Vec<ActivityStatus> {
    activities
        .iter()
        .map(|activity| {
            // the backend may list resubmissions; the last one counts
            let submission = submissions.iter().rev().find(|s| s.activity_id == activity.id);
            let opened = parse_date_time(&activity.start_date)
                .map(|start| start <= now)
                .unwrap_or(false);

            let state = match submission.map(|s| s.status) {
                Some(SubmissionStatus::Evaluated) => ActivityState::Evaluated,
                Some(SubmissionStatus::Submitted) => ActivityState::Submitted,
                None if opened => ActivityState::Missing,
                None => ActivityState::Upcoming,
            };
            let editable = state != ActivityState::Evaluated
                && is_date_within_edit_period_at(&activity.start_date, &activity.end_date, now);

            ActivityStatus {
                activity_id: activity.id.clone(),
                title: activity.title.clone(),
                state,
                grade: submission.and_then(|s| s.grade),
                editable,
            }
        })
        .collect()
}

pub fn missing_activities(statuses: &[ActivityStatus]) -> Vec<&ActivityStatus> {
    statuses
        .iter()
        .filter(|s| s.state == ActivityState::Missing)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn activity(id: &str, start: &str, end: &str) -> Activity {
        Activity {
            id: id.to_string(),
            title: format!("Atividade {}", id),
            start_date: start.to_string(),
            end_date: end.to_string(),
        }
    }

    fn submission(id: &str, status: SubmissionStatus, grade: Option<f64>) -> ActivitySubmission {
        ActivitySubmission {
            activity_id: id.to_string(),
            status,
            grade,
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-08-15 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn classifies_each_activity() {
        let activities = vec![
            activity("1", "2025-08-04", "2025-08-08"),
            activity("2", "2025-08-11", "2025-08-15"),
            activity("3", "2025-08-11", "2025-08-15"),
            activity("4", "2025-08-18", "2025-08-22"),
        ];
        let submissions = vec![
            submission("1", SubmissionStatus::Evaluated, Some(9.5)),
            submission("2", SubmissionStatus::Submitted, None),
        ];

        let statuses = reconcile(&activities, &submissions, now());
        let states: Vec<ActivityState> = statuses.iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![
                ActivityState::Evaluated,
                ActivityState::Submitted,
                ActivityState::Missing,
                ActivityState::Upcoming,
            ]
        );
        assert_eq!(statuses[0].grade, Some(9.5));
        assert!(!statuses[0].editable);
        assert!(statuses[1].editable);
        assert!(!statuses[3].editable);

        let missing = missing_activities(&statuses);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].activity_id, "3");
    }

    #[test]
    fn last_submission_wins() {
        let activities = vec![activity("1", "2025-08-11", "2025-08-15")];
        let submissions = vec![
            submission("1", SubmissionStatus::Submitted, None),
            submission("1", SubmissionStatus::Evaluated, Some(7.0)),
        ];
        let statuses = reconcile(&activities, &submissions, now());
        assert_eq!(statuses[0].state, ActivityState::Evaluated);
        assert_eq!(statuses[0].grade, Some(7.0));
    }

    #[test]
    fn editing_closes_after_the_following_monday() {
        // ends Friday 2025-08-08, so editing runs through Monday 2025-08-11
        let activities = vec![activity("1", "2025-08-04", "2025-08-08")];
        let submissions = vec![submission("1", SubmissionStatus::Submitted, None)];
        let monday = NaiveDateTime::parse_from_str("2025-08-11 18:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let tuesday = NaiveDateTime::parse_from_str("2025-08-12 08:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert!(reconcile(&activities, &submissions, monday)[0].editable);
        assert!(!reconcile(&activities, &submissions, tuesday)[0].editable);
    }
}
