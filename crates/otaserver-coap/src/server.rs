use std::future::Future;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use otaserver::Catalog;

use tokio::net::UdpSocket;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use tracing::{info, warn};

use crate::dispatch::Dispatcher;
use crate::error::{Error, ErrorKind, Result};
use crate::tree::ResourceTree;
use crate::watch::FirmwareWatcher;

/// Default `CoAP` port.
pub const DEFAULT_COAP_PORT: u16 = 5683;

// Default address.
//
// The IPv6 unspecified address accepts requests from every interface.
const DEFAULT_ADDRESS: IpAddr = IpAddr::V6(Ipv6Addr::UNSPECIFIED);

// Default interval between two scans of the firmware directory.
//
// Scans only catch the files the directory watcher missed.
const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(30);

// Largest UDP payload, so that no datagram is ever truncated.
const MAX_DATAGRAM_SIZE: usize = u16::MAX as usize;

#[derive(Debug)]
struct ServerData {
    // Server address.
    address: IpAddr,
    // Server port.
    port: u16,
    // Firmware directory.
    firmware_path: PathBuf,
    // Interval between two scans of the firmware directory.
    rescan_interval: Option<Duration>,
}

/// A `CoAP` server running indefinitely and serving the latest firmware
/// images of a directory.
#[derive(Debug)]
pub struct Server {
    data: ServerData,
}

impl Server {
    /// Creates a [`Server`] for the given firmware directory.
    #[must_use]
    pub fn new(firmware_path: impl Into<PathBuf>) -> Self {
        Self {
            data: ServerData {
                address: DEFAULT_ADDRESS,
                port: DEFAULT_COAP_PORT,
                firmware_path: firmware_path.into(),
                rescan_interval: Some(DEFAULT_RESCAN_INTERVAL),
            },
        }
    }

    /// Sets the server address.
    #[must_use]
    #[inline]
    pub fn address(mut self, address: impl Into<IpAddr>) -> Self {
        self.data.address = address.into();
        self
    }

    /// Sets the server port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.data.port = port;
        self
    }

    /// Sets the interval between two scans of the firmware directory.
    ///
    /// Each scan registers the resources of newly deployed firmware which
    /// the directory watcher did not notify.
    #[must_use]
    pub const fn rescan_interval(mut self, interval: Duration) -> Self {
        self.data.rescan_interval = Some(interval);
        self
    }

    /// Disables the periodic scans of the firmware directory.
    ///
    /// Newly deployed firmware are then registered only through the
    /// directory watcher.
    #[must_use]
    pub const fn disable_rescan(mut self) -> Self {
        self.data.rescan_interval = None;
        self
    }

    /// Transforms the server into a [`GracefulShutdownServer`].
    ///
    /// The [`Future`] passed as input manages the graceful shutdown of
    /// the server.
    #[must_use]
    #[inline]
    pub fn with_graceful_shutdown<F>(self, signal: F) -> GracefulShutdownServer<F>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        GracefulShutdownServer {
            data: self.data,
            signal,
        }
    }

    /// Runs the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the firmware directory is not accessible or if
    /// the server fails to bind its socket.
    pub async fn run(self) -> Result<()> {
        self.with_graceful_shutdown(std::future::pending())
            .run()
            .await
    }
}

/// A server with graceful shutdown.
///
/// Aside from the graceful shutdown functionality, it behaves the same as
/// [`Server`].
#[derive(Debug)]
pub struct GracefulShutdownServer<F> {
    // Server data.
    data: ServerData,
    // Graceful shutdown signal.
    signal: F,
}

impl<F> GracefulShutdownServer<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    /// Runs the server with graceful shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the firmware directory is not accessible or if
    /// the server fails to bind its socket.
    pub async fn run(self) -> Result<()> {
        let firmware_path = &self.data.firmware_path;
        if !tokio::fs::metadata(firmware_path)
            .await
            .is_ok_and(|metadata| metadata.is_dir())
        {
            return Err(Error::new(
                ErrorKind::Firmware,
                format!("{} is not a directory", firmware_path.display()),
            ));
        }

        let tree = Arc::new(ResourceTree::new(Arc::new(Catalog::new(firmware_path))));

        // Watching starts before the first scan, so no file deployed in
        // between is missed.
        let mut watcher = match FirmwareWatcher::new(firmware_path) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Unable to watch {}, relying on rescans: {e}", firmware_path.display());
                None
            }
        };

        // Resources for the firmware already on disk must exist before the
        // first request is accepted.
        let registered = tree.register_all().await;
        info!(
            "Registered {registered} application slots from {}",
            firmware_path.display()
        );

        let listener_bind = SocketAddr::new(self.data.address, self.data.port);
        let socket = Arc::new(UdpSocket::bind(listener_bind).await?);

        info!("Firmware reachable at this CoAP address: {listener_bind}");

        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&tree)));

        let mut rescan = self.data.rescan_interval.map(rescan_timer);

        let signal = self.signal;
        tokio::pin!(signal);

        info!("Starting server...");

        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            tokio::select! {
                () = &mut signal => {
                    info!("Stopping server...");
                    break;
                }
                received = socket.recv_from(&mut buffer) => match received {
                    Ok((len, peer)) => {
                        let datagram = buffer[..len].to_vec();
                        let socket = Arc::clone(&socket);
                        let dispatcher = Arc::clone(&dispatcher);
                        tokio::spawn(async move {
                            if let Some(response) = dispatcher.handle(&datagram, peer).await
                                && let Err(e) = socket.send_to(&response, peer).await
                            {
                                warn!("Unable to answer {peer}: {e}");
                            }
                        });
                    }
                    Err(e) => warn!("Unable to receive a datagram: {e}"),
                },
                filenames = appeared(&mut watcher) => {
                    for filename in filenames {
                        tree.register_filename(&filename).await;
                    }
                }
                () = tick(&mut rescan) => {
                    let registered = tree.register_all().await;
                    if registered > 0 {
                        info!("Registered {registered} new application slots");
                    }
                }
            }
        }

        Ok(())
    }
}

// The first scan happens one period after startup, since every firmware
// on disk has just been registered.
fn rescan_timer(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn appeared(watcher: &mut Option<FirmwareWatcher>) -> Vec<String> {
    match watcher {
        Some(watcher) => watcher.next().await,
        None => std::future::pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
