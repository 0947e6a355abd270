#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use color_eyre::{eyre::ensure, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::info;

use serial_gate::config::{Config, ListenerConfig};
use serial_gate::error::Error;
use serial_gate::logging;
use serial_gate::server::{Gateway, StopHandle};

const PATIENCE: Duration = Duration::from_secs(5);

/// A gateway running against an in-memory device.
pub struct TestGateway {
    /// Far end of the device pipe, i.e. "the hardware".
    device: Option<DuplexStream>,

    pub addr: SocketAddr,
    pub stop: StopHandle,

    task: JoinHandle<Result<(), Error>>,
}

/// Gateway with no connection deadlines.
pub async fn start_gateway() -> Result<TestGateway> {
    start_gateway_with_timeouts(0, 0).await
}

pub async fn start_gateway_with_timeouts(
    read_timeout_ms: u64,
    write_timeout_ms: u64,
) -> Result<TestGateway> {
    logging::init().await;

    let (device, gateway_side) = tokio::io::duplex(1024);

    let config = Config {
        listener: ListenerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            read_timeout_ms,
            write_timeout_ms,
        },
        ..Default::default()
    };

    let mut gateway = Gateway::with_device_stream(config, gateway_side);
    let stop = gateway.stop_handle();

    let (addr_tx, addr_rx) = oneshot::channel();
    gateway.notify_bound(addr_tx);

    let task = tokio::spawn(async move { gateway.start().await });

    let addr = addr_rx.await?;
    info!(%addr, "Test gateway up");

    Ok(TestGateway {
        device: Some(device),
        addr,
        stop,
        task,
    })
}

impl TestGateway {
    /// Wait for the gateway to finish and return its outcome.
    pub async fn outcome(self) -> Result<Result<(), Error>> {
        Ok(timeout(PATIENCE, self.task).await??)
    }

    /// Read exactly `n` bytes arriving at the device.
    pub async fn device_receives(&mut self, n: usize) -> Result<Vec<u8>> {
        let device = self.device.as_mut().expect("Device is still alive");

        let mut bytes = vec![0u8; n];
        timeout(PATIENCE, device.read_exact(&mut bytes)).await??;

        Ok(bytes)
    }

    /// Make the device produce bytes.
    pub async fn device_sends(&mut self, bytes: &[u8]) -> Result<()> {
        let device = self.device.as_mut().expect("Device is still alive");

        device.write_all(bytes).await?;

        Ok(())
    }

    /// Drop the device end of the pipe, as if the hardware died.
    pub fn kill_device(&mut self) {
        self.device.take();
    }
}

pub async fn connect(addr: SocketAddr) -> Result<TcpStream> {
    Ok(TcpStream::connect(addr).await?)
}

pub async fn recv_exact(client: &mut TcpStream, n: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; n];
    timeout(PATIENCE, client.read_exact(&mut bytes)).await??;

    Ok(bytes)
}

/// Expect the gateway to hang up on this client.
pub async fn recv_eof(client: &mut TcpStream) -> Result<()> {
    let mut buffer = [0u8; 1];
    let n = timeout(PATIENCE, client.read(&mut buffer)).await??;
    ensure!(n == 0, "Expected EOF, got {n} byte(s)");

    Ok(())
}
