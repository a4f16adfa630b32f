//! Line-oriented `key=value` config files.
//!
//! The device config is shared with the doorbell daemon, so edits must keep
//! every line this service does not own exactly as it was.

use std::fs;
use std::io;
use std::path::Path;

/// Trim the characters the config format treats as padding.
pub fn trim(value: &str) -> &str {
    value.trim_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
}

/// Read a file as lines without trailing newlines.
pub fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content.lines().map(str::to_string).collect())
}

/// Like [`read_lines`], but a missing file reads as empty.
pub fn read_lines_if_exists(path: &Path) -> io::Result<Vec<String>> {
    match read_lines(path) {
        Ok(lines) => Ok(lines),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Join lines back into file content, always ending in a newline.
pub fn join_lines(lines: &[String]) -> String {
    if lines.is_empty() {
        return "\n".to_string();
    }
    let mut content = String::new();
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }
    content
}

/// Split a non-comment line into its trimmed key and value.
fn split_entry(line: &str) -> Option<(&str, &str)> {
    let trimmed = trim(line);
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    Some((trim(key), trim(value)))
}

/// Value of `key`, last occurrence winning. Empty when absent.
pub fn value_of(lines: &[String], key: &str) -> String {
    lines
        .iter()
        .filter_map(|line| split_entry(line))
        .filter(|(k, _)| *k == key)
        .last()
        .map(|(_, v)| v.to_string())
        .unwrap_or_default()
}

/// Read one key from a config file, `None` when the file or key is absent.
pub fn read_value(path: &Path, key: &str) -> Option<String> {
    let lines = read_lines(path).ok()?;
    let value = value_of(&lines, key);
    (!value.is_empty()).then_some(value)
}

/// Split a comma separated list, dropping empty entries.
pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match trim(value).to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a TCP port, `None` outside 1-65535.
pub fn parse_port(value: &str) -> Option<i64> {
    trim(value)
        .parse::<i64>()
        .ok()
        .filter(|port| (1..=65535).contains(port))
}

pub fn bool_value(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Rewrite owned keys in place and append the ones the file lacks.
///
/// Comments, blank lines and unknown keys are left untouched and in order.
pub fn rewrite(mut lines: Vec<String>, replacements: &[(&str, String)]) -> Vec<String> {
    let mut seen = vec![false; replacements.len()];

    for line in lines.iter_mut() {
        let Some((key, _)) = split_entry(line) else {
            continue;
        };
        if let Some(index) = replacements.iter().position(|(k, _)| *k == key) {
            let (key, value) = &replacements[index];
            *line = format!("{}={}", key, value);
            seen[index] = true;
        }
    }

    for ((key, value), seen) in replacements.iter().zip(seen) {
        if !seen {
            lines.push(format!("{}={}", key, value));
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_value_last_occurrence_wins() {
        let config = lines("mqtt_host=a\n# mqtt_host=commented\nmqtt_host = b \nother=1");
        assert_eq!(value_of(&config, "mqtt_host"), "b");
        assert_eq!(value_of(&config, "missing"), "");
    }

    #[test]
    fn test_split_csv_drops_empties() {
        assert_eq!(split_csv(" a, ,b ,,c"), vec!["a", "b", "c"]);
        assert!(split_csv("").is_empty());
    }

    #[test]
    fn test_parse_bool_and_port() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_port("1883"), Some(1883));
        assert_eq!(parse_port("0"), None);
        assert_eq!(parse_port("70000"), None);
        assert_eq!(parse_port("12x"), None);
    }

    #[test]
    fn test_rewrite_preserves_unknown_lines() {
        let original = lines("# header\naudio_device=hw:0\nmqtt_host=old\n\nmqtt_port=1");
        let replacements = [
            ("mqtt_host", "broker".to_string()),
            ("mqtt_port", "1883".to_string()),
            ("ring_topic", "door/ring".to_string()),
        ];

        let rewritten = rewrite(original, &replacements);

        assert_eq!(
            rewritten,
            lines("# header\naudio_device=hw:0\nmqtt_host=broker\n\nmqtt_port=1883\nring_topic=door/ring")
        );
    }

    #[test]
    fn test_join_lines_trailing_newline() {
        assert_eq!(join_lines(&[]), "\n");
        assert_eq!(join_lines(&lines("a\nb")), "a\nb\n");
    }
}
