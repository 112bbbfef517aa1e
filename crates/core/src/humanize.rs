//! Human-readable durations for chat and dashboard output.

use std::time::Duration;

fn plural(count: u64, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {plural}")
    }
}

/// Join words as an English series: `a`, `a and b`, `a, b and c`.
fn word_series(words: &[String]) -> String {
    match words {
        [] => String::new(),
        [only] => only.clone(),
        [head @ .., last] => format!("{} and {last}", head.join(", ")),
    }
}

/// Format a track length, e.g. `"3 minutes, 5 seconds"`.
///
/// Hours are folded into minutes, matching how track lengths are usually
/// displayed next to a "now playing" card.
pub fn format_duration(total_secs: u64) -> String {
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    match (minutes, seconds) {
        (0, s) => plural(s, "second", "seconds"),
        (m, 0) => plural(m, "minute", "minutes"),
        (m, s) => format!(
            "{}, {}",
            plural(m, "minute", "minutes"),
            plural(s, "second", "seconds")
        ),
    }
}

/// Describe the time remaining in the current track.
///
/// `"1 hour, 2 minutes and 3 seconds"`; zero or sub-second remainders read
/// `"less than a second"`.
pub fn describe_remaining(left: Duration) -> String {
    let total = left.as_secs();
    let hours = total / 3600;
    let minutes = (total / 60) % 60;
    let seconds = total % 60;

    let mut words = Vec::with_capacity(3);
    if hours > 0 {
        words.push(plural(hours, "hour", "hours"));
    }
    if minutes > 0 {
        words.push(plural(minutes, "minute", "minutes"));
    }
    if seconds > 0 {
        words.push(plural(seconds, "second", "seconds"));
    }

    if words.is_empty() {
        "less than a second".to_string()
    } else {
        word_series(&words)
    }
}
