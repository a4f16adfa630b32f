//! # chime-system
//!
//! The parts of chime-webd that talk to the operating system rather than to
//! files or sockets of its own:
//!
//! - [`process`] - bounded subprocess execution with process-group kill
//! - [`wifi_scan`] - `wpa_cli` / `iw` scan orchestration and output parsing
//! - [`apply`] - the single-flight "apply changes" job
//! - [`mdns`] - a minimal A-record mDNS responder on its own thread

pub mod apply;
pub mod mdns;
pub mod process;
pub mod wifi_scan;

pub use apply::{ApplyConfig, ApplyManager};
pub use mdns::{MdnsConfig, MdnsError, MdnsResponder};
pub use process::{CommandResult, CommandStatus};
pub use wifi_scan::{ScanError, WifiScanner};
