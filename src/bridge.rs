//! # Bridge Transport
//!
//! HTTP and UDP plumbing to a WeatherLink Live unit, plus the driver error
//! enum. The bridge is treated as an external collaborator: payloads are
//! parsed exactly, failures are surfaced as [`WllError`] values, and nothing
//! here retries forever — the acquisition loop decides what is fatal.
//!
//! ## HTTP
//!
//! Requests use a short timeout and a small linear-backoff retry budget,
//! because the bridge lives on flaky home WiFi. A response with the `error`
//! field populated is a *device-reported* failure: the HTTP exchange worked
//! but the payload must not be used.
//!
//! ## UDP
//!
//! The bridge only broadcasts after `GET /v1/real_time?duration=N` and stops
//! once the granted duration lapses, so the caller tracks a countdown and
//! re-arms early. Receives are bounded by a socket timeout so the loop can
//! notice a silent bridge.

use std::io;
use std::net::UdpSocket;
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::conditions::{Datagram, HttpEnvelope, Observation};

/// Everything that can go wrong between the bridge and a decoded observation.
#[derive(Error, Debug)]
pub enum WllError {
    /// Transport-level HTTP failure (connect, timeout, bad status).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// UDP socket failure.
    #[error("socket IO: {0}")]
    Io(#[from] io::Error),

    /// The bridge answered but reported its own failure in the envelope.
    #[error("bridge-reported error: {0}")]
    Device(String),

    /// Payload was not valid JSON for the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Envelope parsed but carried no usable conditions.
    #[error("payload carried no conditions")]
    MissingConditions,

    /// `rain_size` code outside the vendor-defined 1..=4 range.
    #[error("unsupported rain bucket size code {0}")]
    UnsupportedBucketSize(u8),

    /// First snapshot lacked the records needed to seed the driver.
    #[error("no usable snapshot to seed the driver")]
    NoSeed,
}

const HTTP_TIMEOUT: Duration = Duration::from_secs(3);
const HTTP_ATTEMPTS: u32 = 3;
const HTTP_BACKOFF: Duration = Duration::from_secs(1);

/// Socket read timeout; the bridge broadcasts every ~2.5 s, so two missed
/// intervals means the broadcast has lapsed or the network dropped.
pub const UDP_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Bridge datagrams are well under this; one recv buffer is reused for all.
const MAX_DATAGRAM: usize = 2048;

/// Blocking HTTP client bound to one bridge IP.
pub struct BridgeClient {
    http: reqwest::blocking::Client,
    current_conditions_url: String,
    real_time_url: String,
}

impl BridgeClient {
    /// `broadcast_duration_secs` is the duration requested on each re-arm.
    pub fn new(ip: &str, broadcast_duration_secs: u32) -> Result<Self, WllError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(BridgeClient {
            http,
            current_conditions_url: format!("http://{ip}:80/v1/current_conditions"),
            real_time_url: format!("http://{ip}:80/v1/real_time?duration={broadcast_duration_secs}"),
        })
    }

    /// Fetch one current-conditions snapshot.
    pub fn current_conditions(&self) -> Result<Observation, WllError> {
        let envelope: HttpEnvelope = self.get_json(&self.current_conditions_url)?;
        if let Some(error) = envelope.error {
            return Err(WllError::Device(error.to_string()));
        }
        envelope.data.ok_or(WllError::MissingConditions)
    }

    /// Ask the bridge to (re)start UDP broadcasting; returns the duration in
    /// seconds the bridge granted.
    pub fn request_broadcast(&self) -> Result<u64, WllError> {
        #[derive(Deserialize)]
        struct RealTimeData {
            duration: u64,
        }
        #[derive(Deserialize)]
        struct RealTimeEnvelope {
            data: Option<RealTimeData>,
            error: Option<serde_json::Value>,
        }

        let envelope: RealTimeEnvelope = self.get_json(&self.real_time_url)?;
        if let Some(error) = envelope.error {
            return Err(WllError::Device(error.to_string()));
        }
        Ok(envelope.data.ok_or(WllError::MissingConditions)?.duration)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, WllError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_get(url) {
                Ok(value) => return Ok(value),
                Err(error) if attempt < HTTP_ATTEMPTS => {
                    warn!("GET {url} failed (attempt {attempt}/{HTTP_ATTEMPTS}): {error}");
                    thread::sleep(HTTP_BACKOFF * attempt);
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn try_get<T: DeserializeOwned>(&self, url: &str) -> Result<T, WllError> {
        let response = self.http.get(url).send()?.error_for_status()?;
        Ok(response.json()?)
    }
}

/// Outcome of one bounded UDP receive.
#[derive(Debug)]
pub enum Received {
    Observation(Observation),
    /// Nothing arrived within [`UDP_READ_TIMEOUT`]; the caller should force a
    /// broadcast re-arm check.
    Timeout,
}

/// Broadcast listener socket, owned by the session rather than living at
/// process scope, so dropping the session closes it.
pub struct UdpChannel {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpChannel {
    pub fn bind(port: u16) -> Result<Self, WllError> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        socket.set_broadcast(true)?;
        socket.set_read_timeout(Some(UDP_READ_TIMEOUT))?;
        Ok(UdpChannel {
            socket,
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    /// Block for the next datagram, bounded by the socket timeout.
    ///
    /// A device-side error payload (`conditions: null`) comes back as
    /// [`WllError::MissingConditions`] after logging the bridge's message;
    /// invalid JSON comes back as [`WllError::Malformed`]. Neither is fatal to
    /// the loop.
    pub fn recv(&mut self) -> Result<Received, WllError> {
        match self.socket.recv_from(&mut self.buf) {
            Ok((len, _peer)) => {
                let datagram: Datagram = serde_json::from_slice(&self.buf[..len])?;
                match datagram.into_observation() {
                    Ok(observation) => Ok(Received::Observation(observation)),
                    Err(error) => {
                        if let Some(message) = error {
                            debug!("bridge UDP error payload: {message}");
                        }
                        Err(WllError::MissingConditions)
                    }
                }
            }
            Err(error) if is_timeout(&error) => Ok(Received::Timeout),
            Err(error) => Err(error.into()),
        }
    }
}

// recv timeouts surface as WouldBlock on Unix and TimedOut on Windows.
fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
