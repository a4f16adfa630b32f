//! Wi-Fi network scanning.
//!
//! Strategies are tried in order, the first success wins:
//!
//! 1. `airport -s` (macOS development hosts only)
//! 2. `wpa_cli scan` followed by polling `wpa_cli scan_results`
//! 3. `iw dev <if> scan`
//!
//! Results are deduplicated by SSID, keeping the strongest signal, and
//! sorted strongest first.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use chime_core::{Security, WifiNetwork};

use crate::process::{self, describe_failure, CommandResult};

/// Signal reported when a tool gives none or an unparseable one.
pub const UNKNOWN_SIGNAL_DBM: i32 = -1000;

const SCAN_RESULTS_ATTEMPTS: usize = 6;
const SCAN_RESULTS_DELAY: Duration = Duration::from_millis(750);

#[cfg(target_os = "macos")]
const AIRPORT_PATH: &str =
    "/System/Library/PrivateFrameworks/Apple80211.framework/Versions/Current/Resources/airport";

/// Every strategy failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("wifi scan failed: {primary} | {fallback}")]
pub struct ScanError {
    /// Why the `wpa_cli` strategy failed.
    pub primary: String,
    /// Why the `iw` strategy failed.
    pub fallback: String,
}

/// Scans one wireless interface.
#[derive(Debug, Clone)]
pub struct WifiScanner {
    interface: String,
    timeout: Duration,
    poll_delay: Duration,
}

impl WifiScanner {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            timeout: process::COMMAND_TIMEOUT,
            poll_delay: SCAN_RESULTS_DELAY,
        }
    }

    /// Override the delay between `scan_results` polls.
    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Run the strategy chain.
    pub async fn scan(&self) -> Result<Vec<WifiNetwork>, ScanError> {
        #[cfg(target_os = "macos")]
        {
            match self.scan_with_airport().await {
                Ok(networks) => return Ok(networks),
                Err(e) => warn!(error = %e, "airport scan failed, falling back to Linux scanners"),
            }
        }

        let primary = match self.scan_with_wpa_cli().await {
            Ok(networks) => {
                info!(interface = %self.interface, count = networks.len(), "wifi scan via wpa_cli");
                return Ok(networks);
            }
            Err(reason) => reason,
        };
        warn!(error = %primary, "wpa_cli scan failed, falling back to iw");

        let fallback = match self.scan_with_iw().await {
            Ok(networks) => {
                info!(interface = %self.interface, count = networks.len(), "wifi scan via iw");
                return Ok(networks);
            }
            Err(reason) => reason,
        };
        warn!(error = %fallback, "iw scan failed");

        Err(ScanError { primary, fallback })
    }

    async fn run(&self, label: &str, program: &str, args: &[&str]) -> Result<String, Failure> {
        match process::run_command(program, args, self.timeout, process::MAX_OUTPUT_BYTES).await {
            Ok(result) if result.success() => Ok(result.output),
            Ok(result) => Err(Failure::from_result(label, result)),
            Err(e) => Err(Failure {
                output: String::new(),
                reason: format!("{} failed: {}", label, e),
            }),
        }
    }

    async fn scan_with_wpa_cli(&self) -> Result<Vec<WifiNetwork>, String> {
        let interface = self.interface.as_str();

        let trigger_busy = match self.run("wpa_cli scan", "wpa_cli", &["-i", interface, "scan"]).await {
            Ok(_) => false,
            Err(failure) if failure.output.to_lowercase().contains("busy") => {
                debug!("wpa_cli reports a scan already in progress");
                true
            }
            Err(failure) => return Err(failure.reason),
        };

        let mut last_error: Option<String> = None;
        let mut networks = Vec::new();
        for _ in 0..SCAN_RESULTS_ATTEMPTS {
            tokio::time::sleep(self.poll_delay).await;

            match self
                .run("wpa_cli scan_results", "wpa_cli", &["-i", interface, "scan_results"])
                .await
            {
                Ok(output) => {
                    networks = parse_wpa_cli_scan_results(&output);
                    if !networks.is_empty() {
                        break;
                    }
                }
                Err(failure) => last_error = Some(failure.reason),
            }
        }

        if !networks.is_empty() {
            return Ok(dedup_strongest(networks));
        }

        Err(match last_error {
            Some(reason) => reason,
            None if trigger_busy => "wpa_cli scan busy and no cached scan results available".to_string(),
            None => "wpa_cli returned no scan results".to_string(),
        })
    }

    async fn scan_with_iw(&self) -> Result<Vec<WifiNetwork>, String> {
        let output = self
            .run("iw scan", "iw", &["dev", self.interface.as_str(), "scan"])
            .await
            .map_err(|failure| failure.reason)?;
        Ok(dedup_strongest(parse_iw_scan(&output)))
    }

    #[cfg(target_os = "macos")]
    async fn scan_with_airport(&self) -> Result<Vec<WifiNetwork>, String> {
        let output = self
            .run("airport scan", AIRPORT_PATH, &["-s"])
            .await
            .map_err(|_| "airport scan command failed".to_string())?;
        Ok(dedup_strongest(parse_airport_scan(&output)))
    }
}

/// A failed command: what it printed and how to describe it.
struct Failure {
    output: String,
    reason: String,
}

impl Failure {
    fn from_result(label: &str, result: CommandResult) -> Self {
        let reason = describe_failure(label, &result);
        Self {
            output: result.output,
            reason,
        }
    }
}

// ============================================================================
// Parsers
// ============================================================================

fn lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(|line| line.strip_suffix('\r').unwrap_or(line))
}

fn parse_signal(field: &str) -> i32 {
    field.parse::<i32>().unwrap_or(UNKNOWN_SIGNAL_DBM)
}

/// Parse `wpa_cli scan_results`: `bssid / frequency / signal level / flags / ssid`.
pub fn parse_wpa_cli_scan_results(output: &str) -> Vec<WifiNetwork> {
    lines(output)
        .filter(|line| !line.is_empty() && !line.starts_with("bssid"))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 5 || fields[4].is_empty() {
                return None;
            }
            Some(WifiNetwork::new(
                fields[4],
                parse_signal(fields[2]),
                Security::from_flags(fields[3]),
            ))
        })
        .collect()
}

/// Parse `iw dev <if> scan`. Each network starts with a `BSS ` line.
pub fn parse_iw_scan(output: &str) -> Vec<WifiNetwork> {
    let mut networks = Vec::new();
    let mut current: Option<WifiNetwork> = None;

    fn push(network: Option<WifiNetwork>, networks: &mut Vec<WifiNetwork>) {
        if let Some(network) = network.filter(|n| !n.ssid.is_empty()) {
            networks.push(network);
        }
    }

    for line in lines(output) {
        let trimmed = line.trim();
        if trimmed.starts_with("BSS ") {
            push(current.take(), &mut networks);
            current = Some(WifiNetwork::new("", UNKNOWN_SIGNAL_DBM, Security::Open));
            continue;
        }

        let Some(network) = current.as_mut() else {
            continue;
        };

        if let Some(ssid) = trimmed.strip_prefix("SSID:") {
            network.ssid = ssid.trim().to_string();
        } else if let Some(signal) = trimmed.strip_prefix("signal:") {
            let value = signal.split_whitespace().next().unwrap_or("");
            if let Ok(dbm) = value.parse::<f64>() {
                network.signal_dbm = dbm as i32;
            }
        } else if trimmed.starts_with("RSN:") {
            network.security = Security::Wpa2;
        } else if trimmed.starts_with("WPA:") {
            network.security = Security::Wpa;
        } else if trimmed.contains("WEP") {
            network.security = Security::Wep;
        }
    }
    push(current.take(), &mut networks);

    networks
}

/// Parse `airport -s`. Lines are located by their BSSID column since the
/// SSID column is space padded and may itself contain spaces.
pub fn parse_airport_scan(output: &str) -> Vec<WifiNetwork> {
    let Ok(bssid) = regex::Regex::new(r"([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}") else {
        return Vec::new();
    };

    let mut networks = Vec::new();
    for line in lines(output) {
        let line = line.trim();
        if line.is_empty() || line.starts_with("SSID") {
            continue;
        }
        let Some(found) = bssid.find(line) else {
            continue;
        };

        let ssid = line[..found.start()].trim();
        if ssid.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line[found.end()..].split_whitespace().collect();
        let Some(signal) = fields.first() else {
            continue;
        };
        let security = fields.get(4..).map(|rest| rest.join(" ")).unwrap_or_default();

        networks.push(WifiNetwork::new(ssid, parse_signal(signal), Security::from_flags(&security)));
    }
    networks
}

/// One entry per SSID with the strongest signal, strongest first.
pub fn dedup_strongest(networks: Vec<WifiNetwork>) -> Vec<WifiNetwork> {
    let mut strongest: BTreeMap<String, WifiNetwork> = BTreeMap::new();
    for network in networks {
        if network.ssid.is_empty() {
            continue;
        }
        match strongest.get(&network.ssid) {
            Some(existing) if existing.signal_dbm >= network.signal_dbm => {}
            _ => {
                strongest.insert(network.ssid.clone(), network);
            }
        }
    }

    let mut output: Vec<WifiNetwork> = strongest.into_values().collect();
    output.sort_by(|a, b| b.signal_dbm.cmp(&a.signal_dbm));
    output
}
