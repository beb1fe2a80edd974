//! Text helpers shared by rendering and transports

use unicode_segmentation::UnicodeSegmentation;

/// Render a counter, switching to `x.y万` above ten thousand
///
/// # Examples
///
/// ```
/// use bililink_core::utils::human_num;
/// assert_eq!(human_num(9999), "9999");
/// assert_eq!(human_num(123_456), "12.3万");
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn human_num(n: i64) -> String {
    if n > 10_000 {
        format!("{:.1}万", n as f64 / 10_000.0)
    } else {
        n.to_string()
    }
}

/// Render a second offset as `m:ss`
#[must_use]
pub fn format_timestamp(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Split a message into parts of at most `max_length` bytes, preferring line
/// boundaries and never cutting through a grapheme cluster.
///
/// # Examples
///
/// ```
/// use bililink_core::utils::split_long_message;
/// let long_msg = "A very long message...\n".repeat(300);
/// let parts = split_long_message(&long_msg, 4096);
/// assert!(parts.len() > 1);
/// ```
#[must_use]
pub fn split_long_message(message: &str, max_length: usize) -> Vec<String> {
    if message.is_empty() {
        return Vec::new();
    }
    if message.len() <= max_length {
        return vec![message.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();

    for line in message.lines() {
        if line.len() > max_length {
            if !current.is_empty() {
                parts.push(current.trim_end().to_string());
                current.clear();
            }
            for grapheme in line.graphemes(true) {
                if current.len() + grapheme.len() > max_length {
                    parts.push(current.trim_end().to_string());
                    current.clear();
                }
                current.push_str(grapheme);
            }
            current.push('\n');
            continue;
        }

        if current.len() + line.len() + 1 > max_length && !current.is_empty() {
            parts.push(current.trim_end().to_string());
            current.clear();
        }
        current.push_str(line);
        current.push('\n');
    }

    if !current.trim_end().is_empty() {
        parts.push(current.trim_end().to_string());
    }
    parts
}

/// Safely truncates a string to a maximum character length (not bytes).
///
/// # Examples
///
/// ```
/// use bililink_core::utils::truncate_str;
/// assert_eq!(truncate_str("哔哩哔哩干杯", 4), "哔哩哔哩");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters() {
        assert_eq!(human_num(10_000), "10000");
        assert_eq!(human_num(10_001), "1.0万");
        assert_eq!(human_num(2_500_000), "250.0万");
    }

    #[test]
    fn timestamps_pad_seconds() {
        assert_eq!(format_timestamp(5), "0:05");
        assert_eq!(format_timestamp(125), "2:05");
        assert_eq!(format_timestamp(3600), "60:00");
    }

    #[test]
    fn split_respects_limit() {
        let text = "第一行\n".repeat(50);
        let parts = split_long_message(&text, 64);
        assert!(parts.len() > 1);
        assert!(parts.iter().all(|p| p.len() <= 64));
        assert_eq!(parts.concat().matches("第一行").count(), 50);
    }

    #[test]
    fn split_long_single_line() {
        let text = "字".repeat(100);
        let parts = split_long_message(&text, 30);
        assert!(parts.iter().all(|p| p.len() <= 30));
        assert_eq!(parts.concat(), text);
    }
}
