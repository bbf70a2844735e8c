use serde::Serialize;

use crate::dates::{parse_date_time, DateError};
use super::types::Slot;

/// Parses a time string (HH:MM or HH:MM:SS) to minutes since midnight
pub fn parse_time_to_minutes(time_str: &str) -> Option<u32> {
    let parts: Vec<&str> = time_str.trim().split(':').collect();
    if parts.len() != 2 && parts.len() != 3 {
        return None;
    }
    let hours: u32 = parts[0].parse().ok()?;
    let minutes: u32 = parts[1].parse().ok()?;
    if hours >= 24 || minutes >= 60 {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Formats minutes since midnight to time string (HH:MM)
pub fn minutes_to_time_string(minutes: u32) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    format!("{:02}:{:02}", hours % 24, mins)
}

/// Seats left in a group slot; negative when the backend overbooked it
pub fn remaining_capacity(group_limit: i64, slot: &Slot) -> i64 {
    group_limit - slot.appointment_count.unwrap_or(0)
}

pub fn is_slot_available(slot: &Slot, is_group: bool, group_limit: i64, class_available: bool) -> bool {
    if is_group && remaining_capacity(group_limit, slot) <= 0 {
        return false;
    }
    class_available
}

/// Some backends send the full "yyyy-MM-dd HH:mm:ss" in `time`
fn slot_clock(slot: &Slot) -> &str {
    slot.time.rsplit(' ').next().unwrap_or(&slot.time)
}

/// "yyyy-MM-dd HH:mm:ss" start time for an appointment in this slot
pub fn compose_start_time(slot: &Slot) -> Result<String, DateError> {
    let invalid = || DateError {
        input: format!("{} {}", slot.date, slot.time),
    };
    let minutes = parse_time_to_minutes(slot_clock(slot)).ok_or_else(invalid)?;
    let start = format!("{} {}:00", slot.date.trim(), minutes_to_time_string(minutes));
    parse_date_time(&start).map_err(|_| invalid())?;
    Ok(start)
}

/// How a slot renders on the ChooseSlot step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotCard {
    pub id: String,
    pub date: String,
    pub time: String,
    pub remaining: Option<i64>,
    pub available: bool,
}

pub fn slot_card(slot: &Slot, is_group: bool, group_limit: i64, class_available: bool) -> SlotCard {
    let time = parse_time_to_minutes(slot_clock(slot))
        .map(minutes_to_time_string)
        .unwrap_or_else(|| slot.time.clone());
    SlotCard {
        id: slot.id.clone(),
        date: slot.date.clone(),
        time,
        remaining: is_group.then(|| remaining_capacity(group_limit, slot)),
        available: is_slot_available(slot, is_group, group_limit, class_available),
    }
}
