use chrono::{DateTime, Local, NaiveDateTime};

/// Second-resolution stamp embedded in recording file names.
pub const RECORDING_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// Get current local timestamp as a formatted string
pub fn current_local_timestamp_str(format_str: &str) -> String {
    let now: DateTime<Local> = Local::now();
    now.format(format_str).to_string()
}

pub fn format_recording_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(RECORDING_TIMESTAMP_FORMAT).to_string()
}

pub fn parse_recording_timestamp(date_part: &str, time_part: &str) -> Option<NaiveDateTime> {
    if date_part.len() != 8 || time_part.len() != 6 {
        return None;
    }
    let joined = format!("{}_{}", date_part, time_part);
    NaiveDateTime::parse_from_str(&joined, RECORDING_TIMESTAMP_FORMAT).ok()
}
