//! # Station Session and Acquisition Loop
//!
//! [`Session`] owns every long-lived resource: the HTTP client(s), the UDP
//! listener socket, and the one shared [`RainAccumulator`]. Dropping the
//! session closes the socket; no in-flight work needs rollback because each
//! yielded packet is a complete, independent unit.
//!
//! The loop itself is a plain iterator ([`Packets`]): lazy, infinite, and
//! non-restartable. Each cycle fetches one HTTP snapshot (unless inside the
//! midnight quiet window), re-arms the bridge's UDP broadcast when its granted
//! duration is about to lapse, then listens on the socket until the poll
//! interval elapses, yielding one packet per decoded observation from either
//! source. Nothing inside the loop is fatal; the only loud failure is
//! [`Session::connect`], because the rain accumulator cannot be seeded without
//! one good snapshot.

use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate, TimeZone, Timelike};
use log::{debug, error, info, warn};

use crate::bridge::{BridgeClient, Received, UdpChannel, WllError};
use crate::conditions::{classify, structure_type, Observation};
use crate::config::Config;
use crate::decoder;
use crate::rain::{BucketSize, RainAccumulator};
use crate::Packet;

/// Re-arm the broadcast this long before the granted duration lapses.
const BROADCAST_REARM_MARGIN: Duration = Duration::from_secs(360);

/// A connected WeatherLink Live station.
pub struct Session {
    config: Config,
    bridge: BridgeClient,
    air_quality: Option<BridgeClient>,
    udp: UdpChannel,
    accumulator: RainAccumulator,
    primary_txid: u8,
    /// When the bridge's current broadcast grant lapses; `None` forces an
    /// immediate re-arm on the next check.
    broadcast_until: Option<Instant>,
}

impl Session {
    /// Make first contact with the bridge and seed the driver state.
    ///
    /// The first snapshot supplies the primary transmitter id (unless
    /// overridden in the config), the rain bucket calibration, and the daily
    /// counter baseline. An unreachable bridge is a hard error: without a
    /// seed snapshot the rain accumulator cannot start safely.
    ///
    /// An out-of-range `rain_size` code is *not* fatal: the calibration stays
    /// unset and every rain field is suppressed until restart.
    pub fn connect(config: Config) -> Result<Self, WllError> {
        let bridge = BridgeClient::new(&config.bridge.ip, config.bridge.broadcast_duration_secs)?;
        let air_quality = match config.bridge.air_quality_ip.as_deref() {
            Some(ip) => Some(BridgeClient::new(ip, config.bridge.broadcast_duration_secs)?),
            None => None,
        };
        let udp = UdpChannel::bind(config.bridge.udp_port)?;

        let snapshot = bridge.current_conditions()?;
        let primary_txid = match config.station.transmitter_id {
            Some(id) => id,
            None => snapshot
                .conditions
                .iter()
                .find(|r| r.data_structure_type == structure_type::ISS)
                .and_then(|r| r.txid)
                .ok_or(WllError::NoSeed)?,
        };
        info!("primary transmitter id is {primary_txid}");

        let seed = snapshot
            .conditions
            .iter()
            .find(|r| {
                r.data_structure_type == structure_type::ISS && r.txid == Some(primary_txid)
            })
            .ok_or(WllError::NoSeed)?;

        let daily = seed.rainfall_daily.unwrap_or_else(|| {
            warn!("seed snapshot carried no daily rain counter; baseline starts at 0");
            0
        });
        let mut accumulator = RainAccumulator::seed(daily, local_date_of(snapshot.ts));

        match seed.rain_size {
            Some(code) => match BucketSize::from_code(code) {
                Ok(bucket) => accumulator.calibrate(bucket),
                Err(e) => error!("{e}; rain fields will be suppressed"),
            },
            None => warn!("seed snapshot carried no rain_size; rain fields will be suppressed"),
        }

        Ok(Session {
            config,
            bridge,
            air_quality,
            udp,
            accumulator,
            primary_txid,
            broadcast_until: None,
        })
    }

    /// Produce the lazy, infinite packet sequence. Consumes the session: the
    /// stream is not restartable because the accumulator state it carries is
    /// not rewindable.
    pub fn packets(self) -> Packets {
        Packets {
            session: self,
            udp_deadline: None,
        }
    }

    fn decode(&mut self, observation: &Observation) -> Packet {
        let roles = classify(
            &observation.conditions,
            self.primary_txid,
            self.config.station.auxiliary_id,
        );
        decoder::assemble(
            observation.ts,
            local_date_of(observation.ts),
            &roles,
            &mut self.accumulator,
        )
    }

    /// One HTTP cycle: snapshot, optional air-quality merge, decode.
    /// Returns `None` when skipped or failed; neither stops the loop.
    fn poll_snapshot(&mut self) -> Option<Packet> {
        if self.in_quiet_window() {
            debug!("inside midnight quiet window; skipping HTTP poll");
            return None;
        }

        let mut observation = match self.bridge.current_conditions() {
            Ok(observation) => observation,
            Err(e) => {
                error!("current conditions poll failed: {e}");
                return None;
            }
        };

        // Same-cycle merge: AirLink records fetched now belong to this
        // packet, keyed by the main snapshot's timestamp.
        if let Some(air_quality) = &self.air_quality {
            match air_quality.current_conditions() {
                Ok(extra) => observation.conditions.extend(extra.conditions),
                Err(e) => warn!("air quality poll failed: {e}"),
            }
        }

        Some(self.decode(&observation))
    }

    fn in_quiet_window(&self) -> bool {
        within_quiet_window(
            Local::now().time().num_seconds_from_midnight(),
            self.config.poll.quiet_window_secs,
        )
    }

    /// Re-request broadcasting when the current grant is gone or about to
    /// lapse. Failure is logged and retried on the next check.
    fn ensure_broadcast(&mut self) {
        let due = match self.broadcast_until {
            Some(until) => Instant::now() + BROADCAST_REARM_MARGIN >= until,
            None => true,
        };
        if !due {
            return;
        }
        match self.bridge.request_broadcast() {
            Ok(duration) => {
                info!("UDP broadcast armed for {duration}s");
                self.broadcast_until = Some(Instant::now() + Duration::from_secs(duration));
            }
            Err(e) => error!("unable to re-arm UDP broadcast: {e}"),
        }
    }
}

/// True when `secs_from_midnight` falls within `window` seconds of local
/// midnight on either side.
fn within_quiet_window(secs_from_midnight: u32, window: u32) -> bool {
    if window == 0 {
        return false;
    }
    const DAY: u32 = 86_400;
    secs_from_midnight < window || DAY - secs_from_midnight <= window
}

/// The observation timestamp's local calendar date, which drives the rain
/// accumulator's midnight reset.
fn local_date_of(ts: i64) -> NaiveDate {
    Local
        .timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.date_naive())
        .unwrap_or_else(|| Local::now().date_naive())
}

/// Lazy, infinite packet stream over one [`Session`]. `next()` never returns
/// `None`; it blocks on the bridge's cadence instead.
pub struct Packets {
    session: Session,
    /// End of the current UDP listen window; `None` between cycles.
    udp_deadline: Option<Instant>,
}

impl Iterator for Packets {
    type Item = Packet;

    fn next(&mut self) -> Option<Packet> {
        loop {
            match self.udp_deadline {
                // Inside the listen window: drain datagrams until the poll
                // interval elapses.
                Some(deadline) if Instant::now() < deadline => {
                    match self.session.udp.recv() {
                        Ok(Received::Observation(observation)) => {
                            return Some(self.session.decode(&observation));
                        }
                        Ok(Received::Timeout) => {
                            // Silence usually means the grant lapsed; zero the
                            // countdown so the check below re-arms now.
                            warn!("UDP receive timed out");
                            self.session.broadcast_until = None;
                            self.session.ensure_broadcast();
                        }
                        Err(e) => debug!("discarding datagram: {e}"),
                    }
                }
                // Window elapsed (or first call): run one HTTP cycle and open
                // the next listen window.
                _ => {
                    let packet = self.session.poll_snapshot();
                    self.session.ensure_broadcast();
                    self.udp_deadline = Some(Instant::now() + self.session.config.poll_interval());
                    if let Some(packet) = packet {
                        return Some(packet);
                    }
                }
            }
        }
    }
}
