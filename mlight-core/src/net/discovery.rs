//! Local-network service advertisement.
//!
//! The capture device periodically broadcasts a small UDP beacon
//! naming its service type and TCP port; the controller listens for a
//! matching type and dials the advertised port. Service type strings
//! distinguish the instruction and result roles of the link.
//!
//! ## Beacon layout (little-endian)
//!
//! ```text
//! magic:        [u8; 4]  "MLB1"
//! port:         u16      TCP port the service listens on
//! service_len:  u8
//! service:      [u8]     UTF-8 service type string
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::MlightError;

/// Service type for the controller → device instruction link.
pub const SERVICE_INSTRUCTION: &str = "_mlight-instruction._tcp";

/// Service type for the device → controller result link.
pub const SERVICE_RESULT: &str = "_mlight-result._tcp";

/// UDP port beacons are broadcast to.
pub const DISCOVERY_PORT: u16 = 7411;

const BEACON_MAGIC: [u8; 4] = *b"MLB1";

// ── Beacon ───────────────────────────────────────────────────────

/// One advertisement datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    /// Service type string (see [`SERVICE_INSTRUCTION`]).
    pub service: String,
    /// TCP port the advertised service listens on.
    pub port: u16,
}

impl Beacon {
    pub fn new(service: impl Into<String>, port: u16) -> Self {
        Self {
            service: service.into(),
            port,
        }
    }

    /// Serialize to datagram bytes.
    pub fn encode(&self) -> Vec<u8> {
        let name = self.service.as_bytes();
        let len = name.len().min(u8::MAX as usize);
        let mut buf = Vec::with_capacity(7 + len);
        buf.extend_from_slice(&BEACON_MAGIC);
        buf.extend_from_slice(&self.port.to_le_bytes());
        buf.push(len as u8);
        buf.extend_from_slice(&name[..len]);
        buf
    }

    /// Deserialize from datagram bytes.
    pub fn decode(data: &[u8]) -> Result<Self, MlightError> {
        if data.len() < 7 {
            return Err(MlightError::MalformedFrame("beacon too short"));
        }
        if data[0..4] != BEACON_MAGIC {
            return Err(MlightError::MalformedFrame("bad beacon magic"));
        }
        let port = u16::from_le_bytes(data[4..6].try_into().expect("2 bytes"));
        let len = data[6] as usize;
        if data.len() < 7 + len {
            return Err(MlightError::MalformedFrame("beacon service truncated"));
        }
        let service = std::str::from_utf8(&data[7..7 + len])
            .map_err(|_| MlightError::MalformedFrame("beacon service not utf-8"))?
            .to_string();
        Ok(Self { service, port })
    }
}

// ── Advertiser ───────────────────────────────────────────────────

/// Background task broadcasting a beacon at a fixed interval.
#[derive(Debug)]
pub struct Advertiser {
    cancel: CancellationToken,
}

impl Advertiser {
    /// Broadcast to the LAN on [`DISCOVERY_PORT`].
    pub async fn spawn(beacon: Beacon, interval: Duration) -> Result<Self, MlightError> {
        let target = SocketAddr::from((Ipv4Addr::BROADCAST, DISCOVERY_PORT));
        Self::spawn_to(beacon, target, interval).await
    }

    /// Broadcast to an explicit target (loopback in tests).
    pub async fn spawn_to(
        beacon: Beacon,
        target: SocketAddr,
        interval: Duration,
    ) -> Result<Self, MlightError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let bytes = beacon.encode();

        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        if let Err(e) = socket.send_to(&bytes, target).await {
                            trace!("beacon send failed: {e}");
                        }
                    }
                }
            }
            debug!("advertiser for {} stopped", beacon.service);
        });

        Ok(Self { cancel })
    }

    /// Stop broadcasting.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Advertiser {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Browse ───────────────────────────────────────────────────────

/// Listen on [`DISCOVERY_PORT`] until a beacon for `service` arrives.
///
/// Returns the advertising host with the beacon's TCP port, or
/// [`MlightError::Timeout`] if none shows up in time.
pub async fn browse(service: &str, timeout: Duration) -> Result<SocketAddr, MlightError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, DISCOVERY_PORT)).await?;
    browse_on(socket, service, timeout).await
}

/// As [`browse`], on a caller-supplied socket.
pub async fn browse_on(
    socket: UdpSocket,
    service: &str,
    timeout: Duration,
) -> Result<SocketAddr, MlightError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut buf = [0u8; 512];
    loop {
        let recv = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await;
        let (n, from) = match recv {
            Ok(io) => io?,
            Err(_) => return Err(MlightError::Timeout(timeout)),
        };
        match Beacon::decode(&buf[..n]) {
            Ok(beacon) if beacon.service == service => {
                debug!("found {} at {}:{}", service, from.ip(), beacon.port);
                return Ok(SocketAddr::new(from.ip(), beacon.port));
            }
            Ok(other) => trace!("ignoring beacon for {}", other.service),
            Err(e) => trace!("ignoring malformed beacon: {e}"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
