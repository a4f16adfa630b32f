//! Minimal mDNS responder.
//!
//! Answers A and ANY questions for `<host-label>.local` with the device's
//! IPv4 address and re-announces that address to the multicast group every
//! two minutes. Runs on its own thread with a blocking socket and a one
//! second receive timeout so the stop flag is checked regularly.
//!
//! Malformed or unrelated packets are dropped without a word.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use if_addrs::{get_if_addrs, IfAddr};
use nix::sys::socket::{bind, setsockopt, socket, sockopt, AddressFamily, SockFlag, SockType, SockaddrIn};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use chime_protocol::dns::{build_answer, query_requests_host};

pub const MDNS_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
pub const MDNS_PORT: u16 = 5353;

const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(120);
const RECV_TIMEOUT: Duration = Duration::from_secs(1);
const ADDRESS_RETRY_DELAY: Duration = Duration::from_secs(2);
const RECV_BUFFER_LEN: usize = 1500;

#[derive(Debug, Error)]
pub enum MdnsError {
    #[error("failed to open mDNS socket: {0}")]
    Socket(#[from] nix::Error),

    #[error("failed to configure mDNS socket: {0}")]
    Io(#[from] io::Error),

    #[error("failed to start mDNS thread: {0}")]
    Thread(#[source] io::Error),
}

/// Responder settings.
#[derive(Debug, Clone)]
pub struct MdnsConfig {
    /// Left-most label of the advertised name, e.g. `chime`.
    pub host_label: String,
    /// Interface whose IPv4 address is preferred.
    pub interface: String,
}

impl Default for MdnsConfig {
    fn default() -> Self {
        Self {
            host_label: "chime".to_string(),
            interface: "wlan0".to_string(),
        }
    }
}

impl MdnsConfig {
    /// The advertised name, `<host_label>.local`.
    pub fn host_name(&self) -> String {
        format!("{}.local", self.host_label)
    }
}

/// Handle to the running responder thread. Dropping it stops the thread.
#[derive(Debug)]
pub struct MdnsResponder {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MdnsResponder {
    /// Bind the socket and start the responder thread.
    ///
    /// Socket errors are returned here; everything after that is logged by
    /// the thread itself.
    pub fn start(config: MdnsConfig) -> Result<Self, MdnsError> {
        let socket = open_socket()?;
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = stop.clone();
        let thread = thread::Builder::new()
            .name("mdns".to_string())
            .spawn(move || run(socket, config, thread_stop))
            .map_err(MdnsError::Thread)?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Whether the responder thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map_or(false, |t| !t.is_finished())
    }

    /// Signal the thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("mDNS thread panicked");
            }
        }
    }
}

impl Drop for MdnsResponder {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_socket() -> Result<UdpSocket, MdnsError> {
    let fd = socket(AddressFamily::Inet, SockType::Datagram, SockFlag::empty(), None)?;
    setsockopt(&fd, sockopt::ReuseAddr, &true)?;
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    setsockopt(&fd, sockopt::ReusePort, &true)?;
    bind(fd.as_raw_fd(), &SockaddrIn::new(0, 0, 0, 0, MDNS_PORT))?;

    let socket = UdpSocket::from(fd);
    socket.join_multicast_v4(&MDNS_GROUP, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_multicast_ttl_v4(255)?;
    socket.set_read_timeout(Some(RECV_TIMEOUT))?;
    Ok(socket)
}

/// Pick the address of `interface`, else the first candidate.
///
/// `candidates` are non-loopback IPv4 addresses in enumeration order.
pub fn select_address(candidates: &[(String, Ipv4Addr)], interface: &str) -> Option<Ipv4Addr> {
    candidates
        .iter()
        .find(|(name, _)| name == interface)
        .or_else(|| candidates.first())
        .map(|(_, address)| *address)
}

fn resolve_ipv4(interface: &str) -> Option<Ipv4Addr> {
    let interfaces = match get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            warn!(error = %e, "failed to enumerate interfaces");
            return None;
        }
    };

    let candidates: Vec<(String, Ipv4Addr)> = interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.addr {
            IfAddr::V4(v4) => Some((iface.name, v4.ip)),
            IfAddr::V6(_) => None,
        })
        .collect();

    select_address(&candidates, interface)
}

/// The reply owed to `packet`, if it asks about `host`.
pub fn reply_for<'a>(packet: &[u8], host: &str, answer: &'a [u8]) -> Option<&'a [u8]> {
    query_requests_host(packet, host).then_some(answer)
}

fn run(socket: UdpSocket, config: MdnsConfig, stop: Arc<AtomicBool>) {
    let host = config.host_name();
    let group = SocketAddr::V4(SocketAddrV4::new(MDNS_GROUP, MDNS_PORT));
    info!(host = %host, interface = %config.interface, "mDNS responder started");

    let mut answer: Option<(Ipv4Addr, Vec<u8>)> = None;
    let mut last_announce: Option<Instant> = None;
    let mut buf = [0u8; RECV_BUFFER_LEN];

    while !stop.load(Ordering::Relaxed) {
        let Some(address) = resolve_ipv4(&config.interface) else {
            warn!(interface = %config.interface, "no IPv4 address to advertise yet");
            thread::sleep(ADDRESS_RETRY_DELAY);
            continue;
        };

        if answer.as_ref().map_or(true, |(current, _)| *current != address) {
            match build_answer(&host, address) {
                Ok(packet) => {
                    info!(host = %host, %address, "advertising address");
                    answer = Some((address, packet));
                    last_announce = None;
                }
                Err(e) => {
                    error!(host = %host, error = %e, "cannot encode mDNS name, responder stopped");
                    return;
                }
            }
        }
        let Some((_, packet)) = answer.as_ref() else {
            continue;
        };

        if last_announce.map_or(true, |at| at.elapsed() >= ANNOUNCE_INTERVAL) {
            match socket.send_to(packet, group) {
                Ok(_) => debug!(host = %host, "sent mDNS announcement"),
                Err(e) => warn!(error = %e, "failed to send mDNS announcement"),
            }
            last_announce = Some(Instant::now());
        }

        match socket.recv_from(&mut buf) {
            Ok((len, peer)) => {
                if let Some(reply) = reply_for(&buf[..len], &host, packet) {
                    debug!(%peer, "answering mDNS query");
                    if let Err(e) = socket.send_to(reply, peer) {
                        warn!(%peer, error = %e, "failed to send mDNS reply");
                    }
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => {
                warn!(error = %e, "mDNS receive failed");
                thread::sleep(RECV_TIMEOUT);
            }
        }
    }

    info!("mDNS responder stopped");
}
