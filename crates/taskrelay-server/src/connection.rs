use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use taskrelay_frame::{Frame, FrameError, LineCodec};
use taskrelay_task::{classify, decode_inbound, ErrorEnvelope, HandlerError, Inbound, Reply};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore, SemaphorePermit};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn, Instrument};

use crate::completion::{Completion, WriteOutcome};
use crate::config::ServerConfig;
use crate::handler::SharedHandler;
use crate::queue::ReplyQueue;

/// Lifecycle of a client connection.
///
/// `Open` moves to `PeerClosed` when the client half-closes and to `Closed`
/// on a socket error or server shutdown. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    PeerClosed,
    Closed,
}

/// Shared per-connection state, owned jointly by the reader loop, the writer
/// task and every outstanding [`Completion`].
pub(crate) struct Connection {
    id: u64,
    peer: SocketAddr,
    // One permit per reply that may be outstanding; closed once the
    // connection stops accepting frames.
    slots: Semaphore,
    // Cancelled on the move to `Closed`, so a reader parked on the socket stops.
    closed: CancellationToken,
    inner: Mutex<Inner>,
}

struct Inner {
    state: ConnectionState,
    queue: ReplyQueue<Bytes>,
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
}

impl Connection {
    fn new(
        id: u64,
        peer: SocketAddr,
        outbound: mpsc::UnboundedSender<Bytes>,
        max_pending: usize,
    ) -> Self {
        Self {
            id,
            peer,
            slots: Semaphore::new(max_pending.clamp(1, Semaphore::MAX_PERMITS)),
            closed: CancellationToken::new(),
            inner: Mutex::new(Inner {
                state: ConnectionState::Open,
                queue: ReplyQueue::new(),
                outbound: Some(outbound),
            }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reserve(&self) -> u64 {
        self.lock().queue.reserve()
    }

    /// Fill `slot` and hand every reply now at the head to the writer.
    ///
    /// `None` releases the slot without a reply.
    pub(crate) fn finish(&self, slot: u64, reply: Option<Reply>) -> WriteOutcome {
        let mut inner = self.lock();
        match inner.state {
            ConnectionState::Open => {}
            ConnectionState::PeerClosed => return WriteOutcome::PeerClosed,
            ConnectionState::Closed => return WriteOutcome::ConnectionLost,
        }

        inner.queue.fill(slot, reply.map(|reply| encode_reply(&reply)));
        let flushed = inner.queue.flush();
        if flushed.skipped > 0 {
            self.slots.add_permits(flushed.skipped);
        }

        let delivered = match inner.outbound.as_ref() {
            Some(outbound) => flushed
                .replies
                .into_iter()
                .all(|payload| outbound.send(payload).is_ok()),
            None => false,
        };
        if !delivered {
            self.close_locked(&mut inner, ConnectionState::Closed);
            return WriteOutcome::ConnectionLost;
        }
        WriteOutcome::Written
    }

    /// Move to `state` and stop accepting replies. A closed connection stays closed.
    pub(crate) fn close(&self, state: ConnectionState) {
        let mut inner = self.lock();
        self.close_locked(&mut inner, state);
    }

    fn close_locked(&self, inner: &mut Inner, state: ConnectionState) {
        if inner.state == ConnectionState::Closed || inner.state == state {
            return;
        }
        debug!(connection = self.id, from = ?inner.state, to = ?state, "connection state change");
        inner.state = state;
        inner.outbound = None;
        self.slots.close();
        if state == ConnectionState::Closed {
            self.closed.cancel();
        }
    }

    fn release(&self, written: usize) {
        self.slots.add_permits(written);
    }
}

fn encode_reply(reply: &Reply) -> Bytes {
    match reply.to_json() {
        Ok(bytes) => Bytes::from(bytes),
        Err(err) => {
            error!(error = %err, detail = ?err, "failed to serialize reply");
            let fallback = Reply::Error(classify(&HandlerError::Unserializable(err.to_string())));
            Bytes::from(fallback.to_json().unwrap_or_default())
        }
    }
}

enum ReadEnd {
    PeerEnded,
    Failed(FrameError),
    Shutdown,
    Aborted,
}

/// Serve one accepted client until it disconnects or `shutdown` fires.
pub(crate) async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    id: u64,
    handler: SharedHandler,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    if let Err(err) = stream.set_nodelay(true) {
        debug!(error = %err, "failed to set TCP_NODELAY");
    }
    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let connection = Arc::new(Connection::new(
        id,
        peer,
        outbound_tx,
        config.max_pending_replies,
    ));

    let sink = FramedWrite::new(write_half, LineCodec::with_config(&config.frame));
    let writer = tokio::spawn(
        write_replies(sink, outbound_rx, Arc::clone(&connection)).in_current_span(),
    );
    let mut frames = FramedRead::new(read_half, LineCodec::with_config(&config.frame));
    debug!("connection opened");

    let end = loop {
        let permit = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break ReadEnd::Shutdown,
            permit = connection.slots.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => break ReadEnd::Aborted,
            },
        };

        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break ReadEnd::Shutdown,
            _ = connection.closed.cancelled() => break ReadEnd::Aborted,
            next = frames.next() => next,
        };

        match next {
            Some(Ok(frame)) => dispatch_frame(&connection, &handler, frame, permit),
            Some(Err(err)) => break ReadEnd::Failed(err),
            None => break ReadEnd::PeerEnded,
        }
    };

    match end {
        ReadEnd::PeerEnded => {
            debug!("peer closed connection");
            connection.close(ConnectionState::PeerClosed);
        }
        ReadEnd::Failed(FrameError::Io(err)) => {
            error!(error = %err, detail = ?err, "socket error; closing connection");
            connection.close(ConnectionState::Closed);
        }
        ReadEnd::Failed(err) => {
            warn!(error = %err, "framing error; closing connection");
            connection.close(ConnectionState::Closed);
        }
        ReadEnd::Shutdown => {
            debug!("closing connection for shutdown");
            connection.close(ConnectionState::Closed);
        }
        ReadEnd::Aborted => debug!("reply writer stopped"),
    }

    // Replies already queued still go out after a half-close; a torn-down
    // connection drops them.
    if connection.state() == ConnectionState::Closed {
        writer.abort();
    }
    if let Err(err) = writer.await {
        if err.is_panic() {
            error!(error = %err, "reply writer panicked");
        }
    }
    debug!("connection finished");
}

fn dispatch_frame(
    connection: &Arc<Connection>,
    handler: &SharedHandler,
    frame: Frame,
    permit: SemaphorePermit<'_>,
) {
    let inbound = match decode_inbound(&frame.payload) {
        Ok(inbound) => inbound,
        Err(err) => {
            warn!(seq = frame.seq, error = %err, "rejecting frame");
            permit.forget();
            let slot = connection.reserve();
            connection.finish(slot, Some(Reply::Error(ErrorEnvelope::parse_failure(&err))));
            return;
        }
    };

    match inbound {
        Inbound::Null => debug!(seq = frame.seq, "ignoring null task"),
        Inbound::HealthCheck => {
            permit.forget();
            let slot = connection.reserve();
            connection.finish(slot, Some(Reply::ready()));
        }
        Inbound::Task(task) => {
            permit.forget();
            let slot = connection.reserve();
            debug!(
                seq = frame.seq,
                slot,
                task_id = task.task_id.as_deref(),
                task_type = ?task.task_type(),
                "dispatching task"
            );
            handler.handle(*task, Completion::new(Arc::clone(connection), slot));
        }
    }
}

async fn write_replies(
    mut sink: FramedWrite<OwnedWriteHalf, LineCodec>,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    connection: Arc<Connection>,
) {
    while let Some(payload) = outbound.recv().await {
        if let Err(err) = sink.send(payload).await {
            error!(error = %err, detail = ?err, "failed to write reply; closing connection");
            connection.close(ConnectionState::Closed);
            return;
        }
        connection.release(1);
    }

    if let Err(err) = sink.get_mut().shutdown().await {
        debug!(error = %err, "write shutdown failed");
    }
}
