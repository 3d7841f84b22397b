//! Mailbox drain loop
//!
//! Moves formatted messages from a subscriber's mailbox to its client. The
//! transport is reached only through two capabilities:
//!
//! - [`EventWriter`]: write and flush bytes
//! - [`CloseSignal`]: resolves when the client goes away
//!
//! so the loop can run over an HTTP body, a raw socket, or a test double.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::time::Duration;

use axum::body::Body;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::hub::message::{sse_data, CLOSING_PAYLOAD};
use crate::hub::{Mailbox, Subscriber};

/// Upper bound on the final `closing connection` write to an evicted client
pub const CLOSE_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Write side of a client connection
pub trait EventWriter: Send {
    /// Write one chunk
    fn write(&mut self, chunk: Bytes) -> impl Future<Output = io::Result<()>> + Send;

    /// Push written chunks to the client
    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

/// Client-initiated disconnect notification
pub trait CloseSignal: Send {
    /// Resolves once the client has disconnected; must be cancel safe
    fn closed(&mut self) -> impl Future<Output = ()> + Send;
}

/// Why a drain loop stopped
#[derive(Debug)]
pub enum DrainOutcome {
    /// The client disconnected
    ClientClosed,
    /// Writing to the client failed
    WriteFailed(io::Error),
    /// The hub evicted the subscriber for a full mailbox
    Evicted,
    /// The hub closed the mailbox (unregistered or shut down)
    MailboxClosed,
}

/// Drain `mailbox` into `writer` until the client leaves or the hub closes
/// the mailbox
///
/// The sent counter is bumped only after a chunk was written and flushed.
/// Eviction interrupts a pending write, so a client that stopped reading
/// cannot hold the loop. A final `closing connection` event is then attempted
/// for at most [`CLOSE_WRITE_TIMEOUT`]; its failure is ignored. The caller is
/// responsible for unregistering the subscriber.
pub async fn drain<W, C>(
    subscriber: &Subscriber,
    mailbox: &mut Mailbox,
    writer: &mut W,
    close: &mut C,
) -> DrainOutcome
where
    W: EventWriter,
    C: CloseSignal,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = close.closed() => return DrainOutcome::ClientClosed,
            next = mailbox.recv() => next,
        };

        // Messages still queued behind an eviction are not worth sending
        let chunk = match next {
            Some(chunk) if !subscriber.is_evicted() => chunk,
            _ => break,
        };

        let written = tokio::select! {
            biased;
            _ = close.closed() => return DrainOutcome::ClientClosed,
            _ = subscriber.evicted() => break,
            written = write_chunk(writer, chunk) => written,
        };

        match written {
            Ok(()) => subscriber.record_sent(),
            Err(e) => return DrainOutcome::WriteFailed(e),
        }
    }

    if subscriber.is_evicted() {
        let closing = write_chunk(writer, sse_data(CLOSING_PAYLOAD));
        match tokio::time::timeout(CLOSE_WRITE_TIMEOUT, closing).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(
                    subscriber_id = subscriber.id(),
                    error = %e,
                    "Close event not delivered to evicted subscriber"
                );
            }
            Err(_) => {
                tracing::debug!(
                    subscriber_id = subscriber.id(),
                    "Close event timed out for evicted subscriber"
                );
            }
        }
        DrainOutcome::Evicted
    } else {
        DrainOutcome::MailboxClosed
    }
}

async fn write_chunk<W: EventWriter>(writer: &mut W, chunk: Bytes) -> io::Result<()> {
    writer.write(chunk).await?;
    writer.flush().await
}

/// Writer feeding a streaming HTTP response body
pub struct ChannelWriter {
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
}

/// Fires when the HTTP layer drops the response body
pub struct ChannelCloseSignal {
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
}

/// Create a streaming response body plus the writer and close signal for it
///
/// `capacity` is the number of chunks buffered between the drain loop and the
/// transport. The close signal fires when the transport drops the body, which
/// happens when the client disconnects or the connection fails.
pub fn body_channel(capacity: usize) -> (ChannelWriter, ChannelCloseSignal, Body) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let body = Body::from_stream(ReceiverStream::new(rx));

    (ChannelWriter { tx: tx.clone() }, ChannelCloseSignal { tx }, body)
}

impl EventWriter for ChannelWriter {
    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))
    }

    async fn flush(&mut self) -> io::Result<()> {
        // The HTTP layer flushes each body chunk as it is produced
        Ok(())
    }
}

impl CloseSignal for ChannelCloseSignal {
    async fn closed(&mut self) {
        self.tx.closed().await
    }
}
