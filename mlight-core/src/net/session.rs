//! Transport session: one ordered, single-outstanding-frame connection
//! to a peer.
//!
//! A [`Session`] owns the framed TCP stream through background reader
//! and writer tasks. Outbound messages are queued and written strictly
//! in send order; the session is *ready* only while the link is up and
//! the outbound queue is drained, so time-sensitive instructions can
//! await [`Session::ready`] instead of polling a flag.
//!
//! Inbound messages are delivered to registered one-shot handlers
//! ([`Session::expect`]): each handler is consumed by exactly one
//! message, and messages arriving before a handler is registered are
//! buffered in arrival order. Connection loss resolves every pending
//! and future expectation to [`MlightError::LinkLost`]; there is no
//! automatic reconnect.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::codec::FrameCodec;
use crate::error::MlightError;
use crate::message::{Instruction, Reply, WireMessage};

/// Outbound queue depth. Sends block (asynchronously) past this.
const SEND_QUEUE_DEPTH: usize = 64;

// ── Inbox ────────────────────────────────────────────────────────

#[derive(Default)]
struct Inbox {
    /// One-shot handlers awaiting a message, oldest first.
    waiting: VecDeque<oneshot::Sender<WireMessage>>,
    /// Messages that arrived with no handler registered.
    backlog: VecDeque<WireMessage>,
}

fn lock_inbox(inbox: &Mutex<Inbox>) -> std::sync::MutexGuard<'_, Inbox> {
    inbox.lock().unwrap_or_else(|e| e.into_inner())
}

// ── Session ──────────────────────────────────────────────────────

/// A connected peer session. See module docs for guarantees.
pub struct Session {
    tx: mpsc::Sender<WireMessage>,
    pending_writes: Arc<AtomicUsize>,
    idle_tx: Arc<watch::Sender<bool>>,
    idle_rx: watch::Receiver<bool>,
    link_rx: watch::Receiver<bool>,
    inbox: Arc<Mutex<Inbox>>,
}

impl Session {
    /// Wrap an established TCP stream.
    pub fn new(stream: TcpStream) -> Self {
        let (mut sink, mut source) = Framed::new(stream, FrameCodec).split();

        let (user_tx, mut queue_rx) = mpsc::channel::<WireMessage>(SEND_QUEUE_DEPTH);
        let (idle_tx, idle_rx) = watch::channel(true);
        let idle_tx = Arc::new(idle_tx);
        let (link_tx, link_rx) = watch::channel(true);
        let link_tx = Arc::new(link_tx);
        let pending_writes = Arc::new(AtomicUsize::new(0));
        let inbox = Arc::new(Mutex::new(Inbox::default()));

        // Writer: drains the queue one frame at a time, preserving
        // send order and the single-outstanding-write guarantee.
        {
            let pending = Arc::clone(&pending_writes);
            let idle = Arc::clone(&idle_tx);
            let link = Arc::clone(&link_tx);
            tokio::spawn(async move {
                while let Some(msg) = queue_rx.recv().await {
                    if let Err(e) = sink.send(msg).await {
                        warn!("session write failed: {e}");
                        break;
                    }
                    if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                        let _ = idle.send(true);
                    }
                }
                let _ = link.send(false);
            });
        }

        // Reader: hands each inbound message to the oldest live
        // one-shot handler, or buffers it until one is registered.
        {
            let inbox = Arc::clone(&inbox);
            let link = Arc::clone(&link_tx);
            tokio::spawn(async move {
                while let Some(result) = source.next().await {
                    match result {
                        Ok(msg) => deliver(&inbox, msg),
                        Err(e) => {
                            warn!("session read failed: {e}");
                            break;
                        }
                    }
                }
                debug!("session reader finished");
                let _ = link.send(false);
                // Wake every waiter with LinkLost (dropped senders).
                lock_inbox(&inbox).waiting.clear();
            });
        }

        Self {
            tx: user_tx,
            pending_writes,
            idle_tx,
            idle_rx,
            link_rx,
            inbox,
        }
    }

    /// Dial a peer.
    pub async fn connect(info: &ConnectionInfo) -> Result<Self, MlightError> {
        let stream = TcpStream::connect(info.to_socket_string()).await?;
        Ok(Self::new(stream))
    }

    // ── Outbound ─────────────────────────────────────────────────

    /// Queue a message for ordered delivery.
    pub async fn send(&self, msg: impl Into<WireMessage>) -> Result<(), MlightError> {
        if !*self.link_rx.borrow() {
            return Err(MlightError::LinkLost);
        }
        self.pending_writes.fetch_add(1, Ordering::SeqCst);
        let _ = self.idle_tx.send(false);
        self.tx
            .send(msg.into())
            .await
            .map_err(|_| MlightError::LinkLost)
    }

    /// Link up and outbound queue empty.
    pub fn is_ready(&self) -> bool {
        *self.link_rx.borrow() && self.pending_writes.load(Ordering::SeqCst) == 0
    }

    /// Wait until [`is_ready`](Self::is_ready), or fail on link loss.
    pub async fn ready(&self) -> Result<(), MlightError> {
        let mut idle = self.idle_rx.clone();
        let mut link = self.link_rx.clone();
        loop {
            if !*link.borrow() {
                return Err(MlightError::LinkLost);
            }
            if self.is_ready() {
                return Ok(());
            }
            tokio::select! {
                changed = idle.changed() => {
                    if changed.is_err() {
                        return Err(MlightError::LinkLost);
                    }
                }
                changed = link.changed() => {
                    if changed.is_err() {
                        return Err(MlightError::LinkLost);
                    }
                }
            }
        }
    }

    // ── Inbound ──────────────────────────────────────────────────

    /// Register a one-shot handler for the next inbound message.
    ///
    /// Handlers registered earlier receive earlier messages; a message
    /// already buffered is delivered immediately. The returned
    /// [`Expectation`] must be awaited to consume the message.
    pub fn expect(&self) -> Expectation {
        let (tx, rx) = oneshot::channel();
        let mut inbox = lock_inbox(&self.inbox);
        if let Some(msg) = inbox.backlog.pop_front() {
            let _ = tx.send(msg);
        } else if *self.link_rx.borrow() {
            inbox.waiting.push_back(tx);
        }
        // Link already down: tx drops here and recv() reports LinkLost.
        Expectation { rx }
    }

    /// Discard every buffered inbound message.
    ///
    /// Used at the start of a fresh exchange so stale replies from an
    /// aborted sequence cannot satisfy new expectations. Returns how
    /// many messages were dropped.
    pub fn drain_backlog(&self) -> usize {
        let mut inbox = lock_inbox(&self.inbox);
        let dropped = inbox.backlog.len();
        inbox.backlog.clear();
        if dropped > 0 {
            debug!("dropped {dropped} stale buffered messages");
        }
        dropped
    }

    /// Resolves when the connection is gone.
    pub async fn closed(&self) {
        let mut link = self.link_rx.clone();
        while *link.borrow() {
            if link.changed().await.is_err() {
                return;
            }
        }
    }

    /// True while the TCP link is alive (independent of queue state).
    pub fn is_connected(&self) -> bool {
        *self.link_rx.borrow()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("connected", &self.is_connected())
            .field(
                "pending_writes",
                &self.pending_writes.load(Ordering::SeqCst),
            )
            .finish()
    }
}

fn deliver(inbox: &Mutex<Inbox>, msg: WireMessage) {
    let mut inbox = lock_inbox(inbox);
    let mut msg = Some(msg);
    while let Some(tx) = inbox.waiting.pop_front() {
        let Some(m) = msg.take() else { break };
        if let Err(m) = tx.send(m) {
            // Handler was dropped (e.g. cancelled sweep); try the next.
            msg = Some(m);
        } else {
            break;
        }
    }
    if let Some(m) = msg.take() {
        inbox.backlog.push_back(m);
    }
}

// ── Expectation ──────────────────────────────────────────────────

/// A registered one-shot handler; consumed by exactly one message.
#[derive(Debug)]
pub struct Expectation {
    rx: oneshot::Receiver<WireMessage>,
}

impl Expectation {
    /// Wait for the message this handler was registered for.
    pub async fn recv(self) -> Result<WireMessage, MlightError> {
        self.rx.await.map_err(|_| MlightError::LinkLost)
    }

    /// As [`recv`](Self::recv), requiring a [`Reply`].
    pub async fn recv_reply(self) -> Result<Reply, MlightError> {
        match self.recv().await? {
            WireMessage::Reply(r) => Ok(r),
            WireMessage::Instruction(_) => Err(MlightError::UnexpectedReply(
                "instruction arrived on the result channel",
            )),
        }
    }

    /// As [`recv`](Self::recv), requiring an [`Instruction`].
    pub async fn recv_instruction(self) -> Result<Instruction, MlightError> {
        match self.recv().await? {
            WireMessage::Instruction(i) => Ok(i),
            WireMessage::Reply(_) => Err(MlightError::UnexpectedReply(
                "reply arrived on the instruction channel",
            )),
        }
    }
}

// ── ConnectionInfo ───────────────────────────────────────────────

/// Peer address in dotted-host + port form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn to_socket_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
