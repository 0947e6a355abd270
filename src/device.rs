use bytes::Bytes;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info_span, trace, Instrument};

use crate::{
    config::DeviceConfig,
    error::Error,
    outcome::{ReadingResult, BUFFER_CAPACITY},
};

/// Anything which can stand in for the serial device proper.
/// Tests use in-memory pipes.
pub(crate) trait DeviceIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> DeviceIo for T {}

/// Owns the opened device handle.
///
/// Reads happen on a dedicated worker task (see [`SerialDevice::spawn_reader`]),
/// writes happen from the dispatcher through [`SerialDevice::write`].
pub(crate) struct SerialDevice {
    path: String,
    reader: Option<ReadHalf<Box<dyn DeviceIo>>>,
    writer: WriteHalf<Box<dyn DeviceIo>>,
    reader_task: Option<JoinHandle<()>>,
}

impl SerialDevice {
    /// Open the configured device.
    pub(crate) fn open(config: &DeviceConfig) -> Result<Self, Error> {
        debug!(%config.path, config.baud, "Opening device");

        let stream = tokio_serial::new(&config.path, config.baud)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        Ok(Self::from_stream(&config.path, Box::new(stream)))
    }

    /// Use an already opened stream as the device.
    pub(crate) fn from_stream(path: &str, stream: Box<dyn DeviceIo>) -> Self {
        let (reader, writer) = tokio::io::split(stream);

        Self {
            path: path.into(),
            reader: Some(reader),
            writer,
            reader_task: None,
        }
    }

    /// Spawn the device reader worker.
    ///
    /// The worker performs one read per permission signal and hands the
    /// outcome over `results`. It never has more than one read in flight,
    /// and the device side has no deadline: a stalled device stalls the
    /// pipeline.
    pub(crate) fn spawn_reader(
        &mut self,
        results: mpsc::Sender<ReadingResult>,
        permission: mpsc::Receiver<()>,
    ) {
        let reader = self
            .reader
            .take()
            .expect("The reader worker is spawned once per opened device");

        let span = info_span!("device-reader", path = %self.path);
        self.reader_task = Some(tokio::spawn(
            read_loop(reader, results, permission).instrument(span),
        ));
    }

    /// Forward one read outcome to the device.
    ///
    /// A failed read is not written; its failure is passed through as the
    /// first element of the pair so the caller can still tell which side
    /// gave out. The second element is any failure from the device write
    /// itself.
    pub(crate) async fn write(&mut self, reading: ReadingResult) -> (Option<Error>, Option<Error>) {
        match reading {
            Err(read_failure) => (Some(read_failure), None),
            Ok(chunk) => {
                trace!(len = chunk.len(), "Writing to device");

                let write_failure = self
                    .writer
                    .write_all(&chunk)
                    .await
                    .map_err(|e| Error::DeviceIo(e.to_string()))
                    .err();

                (None, write_failure)
            }
        }
    }

    /// Close the device. Idempotent.
    pub(crate) async fn close(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
            let _ = task.await;
        }
        self.reader = None;

        if self.writer.shutdown().await.is_err() {
            trace!("Device writer was already gone");
        }

        debug!(path = %self.path, "Device closed");
    }
}

async fn read_loop(
    mut reader: ReadHalf<Box<dyn DeviceIo>>,
    results: mpsc::Sender<ReadingResult>,
    mut permission: mpsc::Receiver<()>,
) {
    let mut buffer = [0u8; BUFFER_CAPACITY];

    while permission.recv().await.is_some() {
        let outcome = match reader.read(&mut buffer).await {
            Ok(0) => Err(Error::DeviceIo("end of stream".into())),
            Ok(n) => {
                trace!(n, "Read from device");
                Ok(Bytes::copy_from_slice(&buffer[..n]))
            }
            Err(e) => Err(Error::DeviceIo(e.to_string())),
        };

        if results.send(outcome).await.is_err() {
            break;
        }
    }

    debug!("Device reader done");
}
