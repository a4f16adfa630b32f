//! `wpa_supplicant` network block editing.
//!
//! Only the first closed `network={ ... }` block is read or edited. Lines
//! outside it, and keys inside it other than `ssid`/`psk`, are preserved.

use crate::kv::trim;

/// Lines written to a fresh credentials file before the network block.
pub const DEFAULT_HEADER: [&str; 4] = [
    "ctrl_interface=/var/run/wpa_supplicant",
    "update_config=1",
    "country=US",
    "",
];

/// A parsed credentials file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WpaFile {
    lines: Vec<String>,
    /// Line indexes of `network={` and its closing `}`.
    block: Option<(usize, usize)>,
    ssid: String,
    psk: String,
    /// The stored psk was written without quotes (a raw 64-hex key).
    psk_raw: bool,
}

impl WpaFile {
    pub fn parse(lines: Vec<String>) -> Self {
        let mut file = WpaFile {
            lines,
            ..Default::default()
        };

        let Some(start) = file.lines.iter().position(|l| trim(l) == "network={") else {
            return file;
        };

        let mut ssid = String::new();
        let mut psk = String::new();
        let mut psk_raw = false;
        for (index, line) in file.lines.iter().enumerate().skip(start + 1) {
            let trimmed = trim(line);
            if trimmed == "}" {
                file.block = Some((start, index));
                file.ssid = ssid;
                file.psk = psk;
                file.psk_raw = psk_raw;
                return file;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                continue;
            };
            match trim(key) {
                "ssid" => ssid = strip_quotes(value),
                "psk" => {
                    psk_raw = !is_quoted(trim(value));
                    psk = strip_quotes(value);
                }
                _ => {}
            }
        }

        // Unclosed block: treat as absent.
        file
    }

    pub fn has_network_block(&self) -> bool {
        self.block.is_some()
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn psk(&self) -> &str {
        &self.psk
    }

    /// Set ssid and psk, creating the block when needed.
    ///
    /// [`PskUpdate::Keep`] rewrites the stored psk in its original form: a
    /// raw 64-hex psk stays unquoted, a passphrase stays quoted.
    pub fn set_credentials(&mut self, ssid: &str, psk: PskUpdate<'_>) {
        if self.lines.is_empty() {
            self.lines = DEFAULT_HEADER.iter().map(|l| l.to_string()).collect();
        }

        let ssid_line = format!("    ssid={}", quote(ssid));
        let psk_line = match psk {
            PskUpdate::Replace(value) => format!("    psk={}", quote(value)),
            PskUpdate::Keep if self.psk_raw => format!("    psk={}", self.psk),
            PskUpdate::Keep => format!("    psk={}", quote(&self.psk)),
        };

        let Some((start, end)) = self.block else {
            if self.lines.last().is_some_and(|l| !l.is_empty()) {
                self.lines.push(String::new());
            }
            let start = self.lines.len();
            self.lines.push("network={".to_string());
            self.lines.push(ssid_line);
            self.lines.push(psk_line);
            self.lines.push("}".to_string());
            self.block = Some((start, start + 3));
            return;
        };

        let mut ssid_written = false;
        let mut psk_written = false;
        for line in &mut self.lines[start + 1..end] {
            let key = trim(line).split_once('=').map(|(k, _)| trim(k).to_string());
            match key.as_deref() {
                Some("ssid") => {
                    *line = ssid_line.clone();
                    ssid_written = true;
                }
                Some("psk") => {
                    *line = psk_line.clone();
                    psk_written = true;
                }
                _ => {}
            }
        }

        let mut end = end;
        if !ssid_written {
            self.lines.insert(end, ssid_line);
            end += 1;
        }
        if !psk_written {
            self.lines.insert(end, psk_line);
            end += 1;
        }
        self.block = Some((start, end));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// How the psk line is rewritten on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PskUpdate<'a> {
    Keep,
    Replace(&'a str),
}

fn is_quoted(value: &str) -> bool {
    value.len() >= 2 && value.starts_with('"') && value.ends_with('"')
}

/// Remove surrounding quotes and backslash escapes.
pub fn strip_quotes(value: &str) -> String {
    let trimmed = trim(value);
    if !is_quoted(trimmed) {
        return trimmed.to_string();
    }

    let inner = &trimmed[1..trimmed.len() - 1];
    let mut output = String::with_capacity(inner.len());
    let mut escape = false;
    for c in inner.chars() {
        if escape {
            output.push(c);
            escape = false;
        } else if c == '\\' {
            escape = true;
        } else {
            output.push(c);
        }
    }
    output
}

/// Quote a value, escaping `\` and `"`.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_parse_first_closed_block() {
        let file = WpaFile::parse(lines(
            "ctrl_interface=/var/run/wpa_supplicant\nnetwork={\n    ssid=\"Home \\\"5G\\\"\"\n    psk=\"secret\\\\pass\"\n}\nnetwork={\n    ssid=\"Other\"\n}",
        ));

        assert!(file.has_network_block());
        assert_eq!(file.ssid(), "Home \"5G\"");
        assert_eq!(file.psk(), "secret\\pass");
    }

    #[test]
    fn test_unclosed_block_is_absent() {
        let file = WpaFile::parse(lines("network={\n    ssid=\"Home\"\n    psk=\"password\""));
        assert!(!file.has_network_block());
        assert_eq!(file.ssid(), "");
        assert_eq!(file.psk(), "");
    }

    #[test]
    fn test_empty_file_gets_header_and_block() {
        let mut file = WpaFile::parse(Vec::new());
        file.set_credentials("Home", PskUpdate::Replace("password1"));

        assert_eq!(
            file.into_lines(),
            lines(
                "ctrl_interface=/var/run/wpa_supplicant\nupdate_config=1\ncountry=US\n\nnetwork={\n    ssid=\"Home\"\n    psk=\"password1\"\n}"
            )
        );
    }

    #[test]
    fn test_block_appended_after_separator() {
        let mut file = WpaFile::parse(lines("ctrl_interface=/var/run/wpa_supplicant"));
        file.set_credentials("Home", PskUpdate::Replace("password1"));

        assert_eq!(
            file.lines(),
            lines("ctrl_interface=/var/run/wpa_supplicant\n\nnetwork={\n    ssid=\"Home\"\n    psk=\"password1\"\n}")
        );
    }

    #[test]
    fn test_update_in_place_inserts_missing_psk() {
        let mut file = WpaFile::parse(lines("network={\n\tssid=\"Old\"\n\tkey_mgmt=WPA-PSK\n}\n# tail"));
        file.set_credentials("New", PskUpdate::Replace("password1"));

        assert_eq!(
            file.lines(),
            lines("network={\n    ssid=\"New\"\n\tkey_mgmt=WPA-PSK\n    psk=\"password1\"\n}\n# tail")
        );
    }

    #[test]
    fn test_keep_raw_hex_psk_unquoted() {
        let hex = "a".repeat(64);
        let mut file = WpaFile::parse(lines(&format!("network={{\n    ssid=\"Home\"\n    psk={}\n}}", hex)));
        assert_eq!(file.psk(), hex);

        file.set_credentials("Home", PskUpdate::Keep);

        assert_eq!(file.lines()[2], format!("    psk={}", hex));
    }

    #[test]
    fn test_keep_passphrase_stays_quoted() {
        let mut file = WpaFile::parse(lines("network={\n    ssid=\"Home\"\n    psk=\"pass \\\"word\\\"\"\n}"));

        file.set_credentials("Cabin", PskUpdate::Keep);

        assert_eq!(
            file.lines(),
            lines("network={\n    ssid=\"Cabin\"\n    psk=\"pass \\\"word\\\"\"\n}")
        );
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
        assert_eq!(strip_quotes(&quote(r#"a"b\c"#)), r#"a"b\c"#);
        assert_eq!(strip_quotes("  bare "), "bare");
    }
}
