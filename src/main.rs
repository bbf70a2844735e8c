use std::fs::File;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use mentor_booking::activities::{reconcile, Activity, ActivitySubmission};
use mentor_booking::client::{HttpSchedulingApi, SchedulingApi};
use mentor_booking::dates::{sao_paulo_now, sao_paulo_today};
use mentor_booking::display::{print_activities, print_occurrences, print_participation};
use mentor_booking::form::{build_participation, validate_cpf, write_participation_csv};
use mentor_booking::schedule::{index_appointments, occurrence_views};
use mentor_booking::settings::Settings;
use mentor_booking::web;

const SETTINGS_PATH: &str = "settings.yaml";

fn usage() -> &'static str {
    "usage: mentor-booking web [port]\n       mentor-booking report <class_id> <cpf> [out.csv]\n       mentor-booking activities <activities.json> <submissions.json>"
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("web") => {
            let mut settings = Settings::from_yaml(SETTINGS_PATH)?;
            if let Some(port) = args.get(2).and_then(|p| p.parse::<u16>().ok()) {
                settings.port = port;
            }
            println!("Access the booking API at http://localhost:{}", settings.port);

            let api: Arc<dyn SchedulingApi> = Arc::new(HttpSchedulingApi::new(&settings));
            web::start_server(settings, api).await?;
        }
        Some("report") => {
            let (Some(class_id), Some(raw_cpf)) = (args.get(2), args.get(3)) else {
                return Err(usage().into());
            };
            let class_id = class_id.as_str();
            let cpf = validate_cpf(raw_cpf)?;
            let out_path = args.get(4).map(String::as_str).unwrap_or("participation.csv");
            let settings = Settings::from_yaml(SETTINGS_PATH)?;
            let api = HttpSchedulingApi::new(&settings);

            println!("Loading class {} for {}...", class_id, cpf);
            let classes = api.classes(&cpf).await?;
            let appointments = api.user_appointments(class_id, &cpf).await?;
            println!("Loaded {} appointment(s)", appointments.len());

            let (Some(class), Some(booked)) = (
                classes.get(class_id),
                index_appointments(Some(appointments.as_slice()), Some(class_id), Some(&classes)),
            ) else {
                return Err(format!("class {} is not in the catalog", class_id).into());
            };

            let today = sao_paulo_today();
            let views = occurrence_views(class, &booked, None, today);
            print_occurrences(class.name.as_deref().unwrap_or(class_id), &views);

            let rows = build_participation(class, &booked, today);
            print_participation(&rows);

            write_participation_csv(&rows, File::create(out_path)?)?;
            println!("\nReport saved to {}", out_path);
        }
        Some("activities") => {
            let (Some(activities_path), Some(submissions_path)) = (args.get(2), args.get(3)) else {
                return Err(usage().into());
            };
            let activities: Vec<Activity> = serde_json::from_reader(File::open(activities_path)?)?;
            let submissions: Vec<ActivitySubmission> = serde_json::from_reader(File::open(submissions_path)?)?;

            let statuses = reconcile(&activities, &submissions, sao_paulo_now());
            print_activities(&statuses);
        }
        _ => return Err(usage().into()),
    }

    Ok(())
}
