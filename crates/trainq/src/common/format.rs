pub fn human_duration(duration: chrono::Duration) -> String {
    // Truncate to reasonable precision
    if duration.num_hours() > 0 {
        chrono::Duration::minutes(duration.num_minutes())
    } else if duration.num_minutes() > 0 {
        chrono::Duration::seconds(duration.num_seconds())
    } else {
        chrono::Duration::milliseconds(duration.num_milliseconds())
    }
    .to_std()
    .map(|d| humantime::format_duration(d).to_string())
    .unwrap_or_else(|_| "Invalid duration".to_string())
}

pub fn human_seconds(seconds: f64) -> String {
    human_duration(chrono::Duration::milliseconds((seconds * 1000.0) as i64))
}

pub fn human_memory_mb(memory_mb: u64) -> String {
    if memory_mb < 2048 {
        format!("{memory_mb} MiB")
    } else {
        format!("{:.2} GiB", memory_mb as f64 / 1024.0)
    }
}

pub fn format_cost(cost: f64) -> String {
    format!("{cost:.6}")
}
