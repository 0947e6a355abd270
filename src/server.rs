use std::net::SocketAddr;

use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::oneshot,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    config::Config,
    device::{DeviceIo, SerialDevice},
    dispatcher::Dispatcher,
    error::Error,
    gateway::TcpGateway,
};

enum DeviceSource {
    Serial,
    Stream(Option<Box<dyn DeviceIo>>),
}

/// A serial-to-TCP gateway instance.
///
/// [`Gateway::start`] runs until a fatal device failure (returned as
/// the error) or until [`StopHandle::stop`] is called (a clean `Ok`).
/// Either way everything is torn down before returning; the caller
/// owns any retry policy.
pub struct Gateway {
    config: Config,
    device_source: DeviceSource,
    shutdown: CancellationToken,
    bound_tx: Option<oneshot::Sender<SocketAddr>>,
}

impl Gateway {
    /// A gateway bridging the configured serial device.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            device_source: DeviceSource::Serial,
            shutdown: CancellationToken::new(),
            bound_tx: None,
        }
    }

    /// A gateway bridging an already opened stream instead of a serial
    /// device. Lets tests run against in-memory pipes.
    pub fn with_device_stream(
        config: Config,
        stream: impl AsyncRead + AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            config,
            device_source: DeviceSource::Stream(Some(Box::new(stream))),
            shutdown: CancellationToken::new(),
            bound_tx: None,
        }
    }

    /// The bound listener address is sent here once listening starts.
    /// Useful when the configured port is 0.
    pub fn notify_bound(&mut self, tx: oneshot::Sender<SocketAddr>) {
        self.bound_tx = Some(tx);
    }

    /// A handle which can stop this gateway from elsewhere.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.shutdown.clone())
    }

    /// Open the device, bind the listener and serve connections.
    ///
    /// Fails fast with [`Error::DeviceUnavailable`] or [`Error::Bind`]
    /// when either resource cannot be had; the device is released again
    /// if only the listener failed.
    pub async fn start(&mut self) -> Result<(), Error> {
        let mut device = self.open_device()?;

        let gateway = match TcpGateway::start_listening(&self.config.listener).await {
            Ok(gateway) => gateway,
            Err(e) => {
                // The device is a shared resource; release it before bailing.
                device.close().await;
                return Err(e);
            }
        };

        if let Some(tx) = self.bound_tx.take() {
            let _ = tx.send(gateway.local_addr());
        }

        let mut dispatcher = Dispatcher::new(device, gateway, self.shutdown.clone());
        let outcome = dispatcher.run().await;

        debug!("Tearing down");
        dispatcher.stop().await;

        outcome
    }

    fn open_device(&mut self) -> Result<SerialDevice, Error> {
        match &mut self.device_source {
            DeviceSource::Serial => SerialDevice::open(&self.config.device),
            DeviceSource::Stream(stream) => {
                let stream = stream.take().ok_or_else(|| {
                    Error::DeviceUnavailable("the provided device stream was already used".into())
                })?;

                Ok(SerialDevice::from_stream("in-memory", stream))
            }
        }
    }
}

/// Stops a running [`Gateway`].
#[derive(Debug, Clone)]
pub struct StopHandle(CancellationToken);

impl StopHandle {
    /// Ask the gateway to stop. Idempotent.
    pub fn stop(&self) {
        self.0.cancel();
    }
}
