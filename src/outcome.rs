use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::TcpStream;

use crate::error::Error;

/// Each read produces at most this many bytes per chunk.
pub(crate) const BUFFER_CAPACITY: usize = 1024;

/// The outcome of one read attempt against a byte source:
/// the bytes read (possibly empty), or why the source gave out.
///
/// Produced by a reader worker and consumed exactly once by the
/// dispatcher. The worker does not read again until permitted,
/// so there is never more than one of these in flight per source.
pub(crate) type ReadingResult = Result<Bytes, Error>;

/// The outcome of one accept attempt on the listener.
pub(crate) type AcceptedConnection = Result<(TcpStream, SocketAddr), Error>;
