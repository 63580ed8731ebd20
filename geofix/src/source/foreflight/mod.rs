//! ForeFlight source - UDP listener for `XGPS` position broadcasts.
//!
//! Flight simulators and GPS apps broadcast ForeFlight-format sentences on
//! UDP port 49002. Position packets become raw samples stamped with the
//! local wall clock and a configured accuracy radius. Emissions are
//! throttled to `min_update_interval`.
//!
//! # Setup
//!
//! In X-Plane: Settings → Network → "Send position to ForeFlight"

mod protocol;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{SampleSink, SourceAdapter, SourceError, SourceHandle};
use crate::config::{
    ForeFlightSettings, DEFAULT_FOREFLIGHT_ACCURACY_M, DEFAULT_FOREFLIGHT_MIN_UPDATE_INTERVAL_MS,
    DEFAULT_FOREFLIGHT_PORT,
};
use crate::sample::{RawPosition, SourceId};
use crate::time::now_millis;
use protocol::{parse_packet, Packet};

/// Maximum packet size we expect.
const MAX_PACKET_SIZE: usize = 1024;

/// ForeFlight receiver configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeFlightConfig {
    /// UDP port to listen on.
    pub port: u16,
    /// Accuracy radius assigned to every position.
    pub accuracy_m: f64,
    /// Source tag to register as.
    pub source: SourceId,
    /// Minimum interval between emitted samples.
    pub min_update_interval: Duration,
}

impl Default for ForeFlightConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_FOREFLIGHT_PORT,
            accuracy_m: DEFAULT_FOREFLIGHT_ACCURACY_M,
            source: SourceId::Gps,
            min_update_interval: Duration::from_millis(DEFAULT_FOREFLIGHT_MIN_UPDATE_INTERVAL_MS),
        }
    }
}

impl From<&ForeFlightSettings> for ForeFlightConfig {
    fn from(settings: &ForeFlightSettings) -> Self {
        Self {
            port: settings.port,
            accuracy_m: settings.accuracy_m,
            source: settings.source,
            min_update_interval: Duration::from_millis(settings.min_update_interval_ms),
        }
    }
}

/// UDP receiver for ForeFlight broadcasts.
#[derive(Debug)]
pub struct ForeFlightSource {
    config: ForeFlightConfig,
    socket: Option<UdpSocket>,
}

impl ForeFlightSource {
    /// Create a receiver that binds its port when started.
    ///
    /// A bind failure ends the source with [`SourceError::Bind`].
    pub fn new(config: ForeFlightConfig) -> Self {
        Self {
            config,
            socket: None,
        }
    }

    /// Create a receiver and bind its port now.
    pub async fn bind(config: ForeFlightConfig) -> Result<Self, SourceError> {
        let socket = bind_socket(config.port).await?;
        Ok(Self {
            config,
            socket: Some(socket),
        })
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Bound address, if the socket is already bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    async fn run(self, sink: SampleSink, cancel: CancellationToken) -> Result<(), SourceError> {
        let socket = match self.socket {
            Some(socket) => socket,
            None => bind_socket(self.config.port).await?,
        };
        let config = self.config;

        info!(
            port = config.port,
            local_addr = ?socket.local_addr().ok(),
            source = %sink.source(),
            "ForeFlight receiver started"
        );

        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let mut last_emit: Option<Instant> = None;
        let mut packets_received: u64 = 0;
        let mut samples_sent: u64 = 0;

        loop {
            let len = tokio::select! {
                _ = cancel.cancelled() => break,
                result = socket.recv(&mut buffer) => match result {
                    Ok(len) => len,
                    Err(e) => {
                        warn!(error = %e, "UDP receive error");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                },
            };

            packets_received += 1;
            if packets_received == 1 {
                info!(port = config.port, len, "Received first ForeFlight packet");
            }

            let report = match parse_packet(&buffer[..len]) {
                Some(Packet::Position(report)) => report,
                Some(Packet::Attitude) => continue,
                None => {
                    if packets_received <= 5 {
                        let preview = String::from_utf8_lossy(&buffer[..len.min(50)]);
                        debug!(
                            packet_num = packets_received,
                            preview = %preview,
                            "Failed to parse packet"
                        );
                    }
                    continue;
                }
            };

            if last_emit.is_some_and(|at| at.elapsed() < config.min_update_interval) {
                continue;
            }
            last_emit = Some(Instant::now());

            sink.submit(RawPosition::new(
                report.latitude,
                report.longitude,
                config.accuracy_m,
                now_millis(),
            ));
            samples_sent += 1;

            if samples_sent == 1 {
                info!(
                    lat = report.latitude,
                    lon = report.longitude,
                    alt_m = report.altitude_m,
                    track = report.track_deg,
                    gs_mps = report.ground_speed_mps,
                    "First ForeFlight position"
                );
            }
        }

        info!(packets_received, samples_sent, "ForeFlight receiver stopped");
        Ok(())
    }
}

impl SourceAdapter for ForeFlightSource {
    fn source_id(&self) -> SourceId {
        self.config.source
    }

    fn start(self: Box<Self>, sink: SampleSink) -> SourceHandle {
        SourceHandle::spawn(move |cancel| self.run(sink, cancel))
    }
}

async fn bind_socket(port: u16) -> Result<UdpSocket, SourceError> {
    UdpSocket::bind(("0.0.0.0", port))
        .await
        .map_err(|e| SourceError::Bind { port, source: e })
}
