//! A local SOCKS5 stream host.
//!
//! When the initiator announces itself as a stream host, the target
//! connects directly to one of our advertised addresses and performs
//! the SOCKS5 exchange, naming the rendezvous digest of the stream it
//! wants.  This module owns that listener: it accepts connections,
//! runs the server handshake on each in its own task, and pairs every
//! digest it hears with whoever registered a pending transfer for it.
//!
//! Registration must happen before the offer leaves the initiator, so
//! that the target's connect can never race ahead of the waiter.

use crate::stanza::StreamHost;
use crate::{Error, Jid, Result};

use s5b_socksproto::{Error as SocksError, ServerHandshake, SocksAddr, SocksStatus};

use std::collections::HashMap;
use std::io::{Error as IoError, ErrorKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

/// A transfer that has been registered but not yet paired with an
/// accepted connection.
///
/// The sender half is taken by the accept loop when a matching
/// connection arrives; the receiver half is taken by the single waiter
/// in [`LocalProxy::socket_for`].  Dropping either half cancels the
/// other side.
struct TransferSlot {
    /// Distinguishes this registration from any later one under the
    /// same digest, so a finished waiter never tears down a
    /// replacement slot.
    seq: u64,
    /// Where the accept loop delivers the paired socket.
    tx: Option<oneshot::Sender<TcpStream>>,
    /// Where the waiter picks the paired socket up.
    rx: Option<oneshot::Receiver<TcpStream>>,
}

/// State for a proxy that is currently listening.
struct Running {
    /// The port the listener is bound to.
    port: u16,
    /// The accept-loop task.
    handle: JoinHandle<()>,
}

/// Shared state behind every clone of a [`LocalProxy`].
struct ProxyInner {
    /// The address the listener binds to.
    bind_addr: Mutex<String>,
    /// Addresses we advertise in stream-host offers.  Starts with the
    /// loopback literal; grows, never shrinks.
    addrs: Mutex<Vec<String>>,
    /// Pending transfers, keyed by rendezvous digest.
    transfers: Mutex<HashMap<String, TransferSlot>>,
    /// Source of slot sequence numbers.
    next_seq: AtomicU64,
    /// Listener state; None while stopped.
    state: Mutex<Option<Running>>,
}

/// A SOCKS5 listener that accepts target connections and pairs them
/// with pending transfers by rendezvous digest.
///
/// Clones share one proxy.  `start` is idempotent; `stop` closes the
/// listener and cancels every pending transfer.
#[derive(Clone)]
pub struct LocalProxy {
    /// Shared state.
    inner: Arc<ProxyInner>,
}

impl LocalProxy {
    /// Make a new stopped proxy advertising only the loopback address.
    pub fn new() -> Self {
        LocalProxy {
            inner: Arc::new(ProxyInner {
                bind_addr: Mutex::new("127.0.0.1".to_string()),
                addrs: Mutex::new(vec!["127.0.0.1".to_string()]),
                transfers: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(0),
                state: Mutex::new(None),
            }),
        }
    }

    /// Start listening, on `port` if given, or on an ephemeral port.
    ///
    /// Does nothing if the proxy is already running.
    pub async fn start(&self, port: Option<u16>) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let bind_addr = self
            .inner
            .bind_addr
            .lock()
            .expect("poisoned bind-address lock")
            .clone();
        let listener = TcpListener::bind((bind_addr.as_str(), port.unwrap_or(0))).await?;
        let bound = listener.local_addr()?.port();

        let mut state = self.inner.state.lock().expect("poisoned proxy state lock");
        if state.is_some() {
            // Someone else finished starting while we were binding;
            // our listener just gets dropped.
            return Ok(());
        }
        let handle = tokio::spawn(run_accept_loop(Arc::clone(&self.inner), listener));
        *state = Some(Running { port: bound, handle });
        debug!("local stream host listening on port {}", bound);
        Ok(())
    }

    /// Stop listening and cancel every pending transfer.
    pub fn stop(&self) {
        let running = self
            .inner
            .state
            .lock()
            .expect("poisoned proxy state lock")
            .take();
        if let Some(running) = running {
            running.handle.abort();
            debug!("local stream host on port {} stopped", running.port);
        }
        self.inner
            .transfers
            .lock()
            .expect("poisoned transfer lock")
            .clear();
    }

    /// Return true if the proxy is currently listening.
    pub fn is_running(&self) -> bool {
        self.inner
            .state
            .lock()
            .expect("poisoned proxy state lock")
            .is_some()
    }

    /// Return the port the proxy is listening on, if it is running.
    pub fn port(&self) -> Option<u16> {
        self.inner
            .state
            .lock()
            .expect("poisoned proxy state lock")
            .as_ref()
            .map(|r| r.port)
    }

    /// Change the address the listener binds to.  Takes effect the
    /// next time the proxy starts.
    pub fn set_bind_address(&self, addr: impl Into<String>) {
        *self
            .inner
            .bind_addr
            .lock()
            .expect("poisoned bind-address lock") = addr.into();
    }

    /// Add an address to advertise in future stream-host offers.
    ///
    /// Addresses accumulate; adding one that is already present does
    /// nothing.
    pub fn add_local_address(&self, addr: impl Into<String>) {
        let addr = addr.into();
        let mut addrs = self.inner.addrs.lock().expect("poisoned address lock");
        if !addrs.contains(&addr) {
            addrs.push(addr);
        }
    }

    /// Return the advertised addresses, in insertion order.
    pub fn local_addresses(&self) -> Vec<String> {
        self.inner
            .addrs
            .lock()
            .expect("poisoned address lock")
            .clone()
    }

    /// Describe this proxy as stream hosts owned by `jid`, one per
    /// advertised address.  Empty while the proxy is not running.
    pub fn stream_hosts(&self, jid: &Jid) -> Vec<StreamHost> {
        let port = match self.port() {
            Some(p) => p,
            None => return Vec::new(),
        };
        self.local_addresses()
            .into_iter()
            .map(|addr| StreamHost::new(jid.clone(), addr, port))
            .collect()
    }

    /// Register a pending transfer under `digest`.
    ///
    /// If a transfer is already registered under the same digest it is
    /// replaced, and its waiter (if any) observes cancellation.
    pub fn add_transfer(&self, digest: &str) {
        let (tx, rx) = oneshot::channel();
        let slot = TransferSlot {
            seq: self.inner.next_seq.fetch_add(1, Ordering::Relaxed),
            tx: Some(tx),
            rx: Some(rx),
        };
        self.inner
            .transfers
            .lock()
            .expect("poisoned transfer lock")
            .insert(digest.to_string(), slot);
    }

    /// Drop the pending transfer under `digest`, if any.  Its waiter
    /// (if any) observes cancellation.
    pub fn remove_transfer(&self, digest: &str) {
        self.inner
            .transfers
            .lock()
            .expect("poisoned transfer lock")
            .remove(digest);
    }

    /// Wait until the transfer registered under `digest` is paired
    /// with an accepted connection, and return that connection.
    ///
    /// At most one waiter may wait per digest.  Gives
    /// [`Error::Timeout`] if `deadline` passes first, and
    /// [`Error::Canceled`] if the transfer is removed, replaced, or the
    /// proxy stops.
    pub async fn socket_for(&self, digest: &str, deadline: Duration) -> Result<TcpStream> {
        let (seq, rx) = {
            let mut transfers = self
                .inner
                .transfers
                .lock()
                .expect("poisoned transfer lock");
            let slot = transfers.get_mut(digest).ok_or(Error::Canceled)?;
            let rx = slot
                .rx
                .take()
                .ok_or(Error::Internal("second waiter for one pending transfer"))?;
            (slot.seq, rx)
        };

        let outcome = timeout(deadline, rx).await;
        // The registration we waited on is finished; a replacement
        // registered in the meantime must stay.
        {
            let mut transfers = self
                .inner
                .transfers
                .lock()
                .expect("poisoned transfer lock");
            if transfers.get(digest).map(|slot| slot.seq) == Some(seq) {
                transfers.remove(digest);
            }
        }
        match outcome {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(_)) => Err(Error::Canceled),
            Err(_) => Err(Error::Timeout),
        }
    }
}

impl Default for LocalProxy {
    fn default() -> Self {
        Self::new()
    }
}

/// Accept connections until the proxy is stopped, handing each one to
/// its own handshake task.
async fn run_accept_loop(inner: Arc<ProxyInner>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("stream host accepted a connection from {}", peer);
                let inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(inner, stream).await {
                        warn!("stream host connection failed: {}", e);
                    }
                });
            }
            Err(e) => {
                warn!("stream host accept failed: {}", e);
            }
        }
    }
}

/// Run the server side of the SOCKS5 exchange on one accepted
/// connection, then pair it with a pending transfer or refuse it.
async fn handle_connection(inner: Arc<ProxyInner>, mut stream: TcpStream) -> Result<()> {
    let mut handshake = ServerHandshake::new();

    let mut inbuf = [0_u8; 1024];
    let mut n_read = 0;
    let request = loop {
        // Read some more stuff.
        let n = stream.read(&mut inbuf[n_read..]).await?;
        if n == 0 {
            return Err(Error::Io(IoError::new(
                ErrorKind::UnexpectedEof,
                "peer closed mid-handshake",
            )));
        }
        n_read += n;

        // Try to advance the handshake.
        let action = match handshake.handshake(&inbuf[..n_read]) {
            Err(SocksError::Truncated) => continue,
            Err(e) => return Err(e.into()),
            Ok(action) => action,
        };

        if action.drain > 0 {
            inbuf.copy_within(action.drain..n_read, 0);
            n_read -= action.drain;
        }
        if !action.reply.is_empty() {
            stream.write_all(&action.reply).await?;
        }
        if action.finished {
            break handshake.into_request();
        }
    };
    let request = match request {
        Some(r) => r,
        None => return Err(Error::Internal("finished handshake with no request")),
    };

    // The requested "hostname" is the rendezvous digest.  Anything
    // else (an IP literal, say) can't name a pending transfer.
    let digest = match request.addr() {
        SocksAddr::Hostname(h) => h.clone(),
        _ => String::new(),
    };

    let tx = {
        let mut transfers = inner.transfers.lock().expect("poisoned transfer lock");
        transfers.get_mut(&digest).and_then(|slot| slot.tx.take())
    };

    match tx {
        Some(tx) => {
            stream
                .write_all(&request.reply(SocksStatus::SUCCEEDED))
                .await?;
            stream.flush().await?;
            debug!("paired incoming connection for digest {}", digest);
            if tx.send(stream).is_err() {
                debug!("waiter for digest {} went away", digest);
            }
        }
        None => {
            debug!("no pending transfer for digest {}; refusing", digest);
            stream
                .write_all(&request.reply(SocksStatus::HOST_UNREACHABLE))
                .await?;
        }
    }
    Ok(())
}
