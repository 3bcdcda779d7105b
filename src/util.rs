use chrono::Timelike;

/// Bucket a local hour (0-23) into the label passed to the generator.
pub fn time_of_day(hour: u32) -> &'static str {
    match hour {
        5..=11 => "Morning",
        12..=16 => "Afternoon",
        17..=20 => "Evening",
        _ => "Night",
    }
}

pub fn local_time_of_day() -> &'static str {
    time_of_day(chrono::Local::now().hour())
}
