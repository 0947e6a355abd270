use std::{collections::VecDeque, future::Future, net::SocketAddr, time::Duration};

use bytes::Bytes;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::{
    config::ListenerConfig,
    error::Error,
    outcome::{AcceptedConnection, ReadingResult, BUFFER_CAPACITY},
};

/// The single connection currently allowed to talk to the device.
struct ActiveConnection {
    peer: SocketAddr,
    writer: OwnedWriteHalf,

    /// Grants the connection's reader worker its next read.
    permission: mpsc::Sender<()>,

    reader_task: JoinHandle<()>,
}

/// Listens for connections, queues them, and serves one at a time.
///
/// The queue and the active slot are only ever touched from the
/// dispatcher's event loop, so their mutations are totally ordered.
pub(crate) struct TcpGateway {
    config: ListenerConfig,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    queue: VecDeque<(TcpStream, SocketAddr)>,
    active: Option<ActiveConnection>,
    acceptor_task: Option<JoinHandle<()>>,
}

impl TcpGateway {
    /// Bind and listen on the configured address.
    pub(crate) async fn start_listening(config: &ListenerConfig) -> Result<Self, Error> {
        let listener = TcpListener::bind(config.bind_addr())
            .await
            .map_err(|e| Error::Bind(e.to_string()))?;

        let local_addr = listener.local_addr().map_err(|e| Error::Bind(e.to_string()))?;
        info!(%local_addr, "Listening");

        Ok(Self {
            config: config.clone(),
            listener: Some(listener),
            local_addr,
            queue: VecDeque::new(),
            active: None,
            acceptor_task: None,
        })
    }

    /// The address actually bound.
    /// Differs from the configured one when port 0 was asked for.
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawn the acceptor worker: one accept per permission signal.
    pub(crate) fn spawn_acceptor(
        &mut self,
        results: mpsc::Sender<AcceptedConnection>,
        permission: mpsc::Receiver<()>,
    ) {
        let listener = self
            .listener
            .take()
            .expect("The acceptor worker is spawned once per gateway");

        let span = info_span!("acceptor", addr = %self.local_addr);
        self.acceptor_task = Some(tokio::spawn(
            accept_loop(listener, results, permission).instrument(span),
        ));
    }

    /// Queue an accepted connection for later promotion.
    ///
    /// Failed accepts carry no usable connection and are dropped here
    /// rather than poisoning the queue.
    pub(crate) fn enqueue(&mut self, accepted: AcceptedConnection) {
        match accepted {
            Ok((connection, peer)) => {
                self.queue.push_back((connection, peer));
                debug!(%peer, queued = self.queue.len(), "Connection queued");
            }
            Err(e) => warn!(%e, "Discarding failed accept"),
        }
    }

    pub(crate) fn queued(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn has_active(&self) -> bool {
        self.active.is_some()
    }

    pub(crate) fn active_peer(&self) -> Option<SocketAddr> {
        self.active.as_ref().map(|active| active.peer)
    }

    /// Promote the head of the queue, unless a connection already is
    /// active. Returns the promoted connection's results channel, or
    /// `None` if no promotion happened.
    ///
    /// This is the sole write path for the active slot and the queue's
    /// head. The promoted connection gets its own reader worker (which
    /// starts out holding no read permission) and its own results
    /// channel: the caller drops the receiver when the connection is
    /// closed, so an in-flight result of a closed connection can never
    /// be read as the successor's.
    pub(crate) fn promote_next(&mut self) -> Option<mpsc::Receiver<ReadingResult>> {
        if self.active.is_some() {
            return None;
        }

        let Some((connection, peer)) = self.queue.pop_front() else {
            trace!("Queue is empty");
            return None;
        };

        let (reader, writer) = connection.into_split();
        let (results_tx, results_rx) = mpsc::channel(1);
        let (permission_tx, permission_rx) = mpsc::channel(1);

        let span = info_span!("connection-reader", %peer);
        let reader_task = tokio::spawn(
            connection_read_loop(reader, self.config.read_timeout(), results_tx, permission_rx)
                .instrument(span),
        );

        info!(%peer, queued = self.queue.len(), "Connection taken to work");

        self.active = Some(ActiveConnection {
            peer,
            writer,
            permission: permission_tx,
            reader_task,
        });

        Some(results_rx)
    }

    /// Let the active connection's reader perform its next read.
    /// No-op when nothing is active.
    pub(crate) async fn allow_active_read(&self) {
        if let Some(active) = &self.active {
            if active.permission.send(()).await.is_err() {
                trace!("Active reader is gone");
            }
        }
    }

    /// Close and clear the active connection.
    pub(crate) fn close_active(&mut self) {
        if let Some(active) = self.active.take() {
            debug!(peer = %active.peer, "Closing active connection");
            active.reader_task.abort();
        }
    }

    /// Close the active connection, every queued connection, and the
    /// listener. Idempotent.
    pub(crate) async fn close_all(&mut self) {
        self.close_active();

        if !self.queue.is_empty() {
            debug!(dropped = self.queue.len(), "Dropping queued connections");
            self.queue.clear();
        }

        if let Some(task) = self.acceptor_task.take() {
            task.abort();
            let _ = task.await;
        }
        self.listener = None;
    }

    /// Forward one read outcome to the active connection, honoring the
    /// configured write deadline.
    ///
    /// Mirrors the device driver's write: the pair is (upstream read
    /// failure passed through, connection write failure).
    pub(crate) async fn write_to_active(
        &mut self,
        reading: ReadingResult,
    ) -> (Option<Error>, Option<Error>) {
        match reading {
            Err(read_failure) => (Some(read_failure), None),
            Ok(chunk) => {
                let deadline = self.config.write_timeout();
                let deadline_ms = self.config.write_timeout_ms;

                let Some(active) = self.active.as_mut() else {
                    warn!(len = chunk.len(), "No active connection, dropping device bytes");
                    return (None, None);
                };

                trace!(len = chunk.len(), peer = %active.peer, "Writing to active connection");

                let write_failure =
                    match maybe_timeout(deadline, active.writer.write_all(&chunk)).await {
                        Some(Ok(())) => None,
                        Some(Err(e)) => Some(Error::ConnectionIo(e.to_string())),
                        None => Some(Error::ConnectionIo(format!(
                            "write timed out after {deadline_ms}ms"
                        ))),
                    };

                (None, write_failure)
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    results: mpsc::Sender<AcceptedConnection>,
    mut permission: mpsc::Receiver<()>,
) {
    while permission.recv().await.is_some() {
        let outcome = match listener.accept().await {
            Ok((connection, peer)) => {
                info!(%peer, "Accepted connection");
                Ok((connection, peer))
            }
            Err(e) => Err(Error::Accept(e.to_string())),
        };

        if results.send(outcome).await.is_err() {
            break;
        }
    }

    debug!("Acceptor done");
}

async fn connection_read_loop(
    mut reader: OwnedReadHalf,
    read_timeout: Option<Duration>,
    results: mpsc::Sender<ReadingResult>,
    mut permission: mpsc::Receiver<()>,
) {
    let mut buffer = [0u8; BUFFER_CAPACITY];

    while permission.recv().await.is_some() {
        let outcome = match maybe_timeout(read_timeout, reader.read(&mut buffer)).await {
            Some(Ok(0)) => Err(Error::ConnectionClosed),
            Some(Ok(n)) => {
                trace!(n, "Read from connection");
                Ok(Bytes::copy_from_slice(&buffer[..n]))
            }
            Some(Err(e)) => Err(Error::ConnectionIo(e.to_string())),
            None => Err(Error::ConnectionIo(format!(
                "read timed out after {}ms",
                read_timeout.map(|t| t.as_millis()).unwrap_or_default()
            ))),
        };

        if results.send(outcome).await.is_err() {
            break;
        }
    }

    trace!("Connection reader done");
}

/// Applies `deadline` to `operation` if one is configured.
/// `None` in the output means the deadline passed.
async fn maybe_timeout<F: Future>(deadline: Option<Duration>, operation: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => timeout(deadline, operation).await.ok(),
        None => Some(operation.await),
    }
}
