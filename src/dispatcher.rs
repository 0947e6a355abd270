use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

use crate::{device::SerialDevice, error::Error, gateway::TcpGateway, outcome::ReadingResult};

/// Runs the central event loop.
///
/// Owns both I/O components. The worker tasks only ever hand results
/// back here and block until permitted to go again, so every queue
/// mutation, active-connection change and error decision is totally
/// ordered, and each source has at most one read in flight.
pub(crate) struct Dispatcher {
    device: SerialDevice,
    gateway: TcpGateway,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub(crate) fn new(
        device: SerialDevice,
        gateway: TcpGateway,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            device,
            gateway,
            shutdown,
        }
    }

    /// Run until the device fails or shutdown is requested.
    ///
    /// Connection failures never surface past here: the active
    /// connection is closed and the next queued one promoted.
    /// A device failure is returned to the caller, which owns any
    /// retry policy.
    pub(crate) async fn run(&mut self) -> Result<(), Error> {
        let (device_results_tx, mut device_results) = mpsc::channel(1);
        let (device_permission, device_permission_rx) = mpsc::channel(1);
        self.device.spawn_reader(device_results_tx, device_permission_rx);

        let (accept_results_tx, mut accept_results) = mpsc::channel(1);
        let (accept_permission, accept_permission_rx) = mpsc::channel(1);
        self.gateway.spawn_acceptor(accept_results_tx, accept_permission_rx);

        // Standing permission for the first operations.
        let mut device_reader_armed = grant(&device_permission).await;
        grant(&accept_permission).await;

        // The active connection's results channel. Each promotion
        // replaces it, and closing the connection drops it, so a stale
        // result of a closed connection is never read as the
        // successor's.
        let mut connection_results: Option<mpsc::Receiver<ReadingResult>> = None;

        let shutdown = self.shutdown.clone();

        loop {
            let mut device_failure = None;
            let mut connection_failure = None;

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                Some(accepted) = accept_results.recv() => {
                    self.gateway.enqueue(accepted);
                    grant(&accept_permission).await;

                    self.try_promote(&mut connection_results, &device_permission, &mut device_reader_armed)
                        .await;
                }
                Some(reading) = recv_active(&mut connection_results) => {
                    let (from_connection, from_device) = self.device.write(reading).await;
                    connection_failure = from_connection;
                    device_failure = from_device;

                    if connection_failure.is_none() && device_failure.is_none() {
                        self.gateway.allow_active_read().await;
                    }
                }
                Some(reading) = device_results.recv() => {
                    device_reader_armed = false;

                    let (from_device, from_connection) = self.gateway.write_to_active(reading).await;
                    device_failure = from_device;
                    connection_failure = from_connection;

                    if device_failure.is_none() && self.gateway.has_active() {
                        device_reader_armed = grant(&device_permission).await;
                    }
                }
            }

            if let Some(failure) = device_failure {
                error!(%failure, "Device failure, giving up");
                return Err(failure);
            }

            if self.gateway.has_active() {
                if let Some(failure) = connection_failure {
                    if failure.is_graceful_close() {
                        info!(peer = ?self.gateway.active_peer(), "Connection handling ended");
                    } else {
                        error!(
                            peer = ?self.gateway.active_peer(),
                            %failure,
                            "Unexpected connection failure"
                        );
                    }

                    self.gateway.close_active();
                    connection_results = None;

                    // A queued connection, if any, takes over right away
                    // rather than waiting for a new accept.
                    self.try_promote(&mut connection_results, &device_permission, &mut device_reader_armed)
                        .await;
                }
            }
        }
    }

    /// Promote the next queued connection and arm its reader.
    ///
    /// Also re-arms the device reader if it went unarmed while nothing
    /// was active; it stays one-read-at-a-time either way.
    async fn try_promote(
        &mut self,
        connection_results: &mut Option<mpsc::Receiver<ReadingResult>>,
        device_permission: &mpsc::Sender<()>,
        device_reader_armed: &mut bool,
    ) {
        let Some(results) = self.gateway.promote_next() else {
            return;
        };

        *connection_results = Some(results);
        self.gateway.allow_active_read().await;

        if !*device_reader_armed {
            trace!("Re-arming device reader");
            *device_reader_armed = grant(device_permission).await;
        }
    }

    /// Release the device, the active connection, every queued
    /// connection and the listener. Idempotent.
    pub(crate) async fn stop(&mut self) {
        self.gateway.close_all().await;
        self.device.close().await;
    }
}

async fn grant(permission: &mpsc::Sender<()>) -> bool {
    permission.send(()).await.is_ok()
}

/// Receive from the active connection's results channel, or park
/// forever while no connection is active.
async fn recv_active(
    results: &mut Option<mpsc::Receiver<ReadingResult>>,
) -> Option<ReadingResult> {
    match results {
        Some(results) => results.recv().await,
        None => std::future::pending().await,
    }
}
