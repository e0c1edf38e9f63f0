//! Initiator-side negotiation of XMPP SOCKS5 bytestreams (XEP-0065).
//!
//! An XMPP client that wants to push bytes to a peer out-of-band asks
//! it to connect to a *stream host*: either a SOCKS5 proxy discovered
//! on the server, or the initiator itself, listening on a local port.
//! Getting there takes a small pile of protocol: discover whether the
//! target can do bytestreams at all, find and classify candidate
//! proxies, learn their addresses, offer an ordered list of hosts,
//! and, once the target has picked one, either accept its incoming
//! SOCKS5 connection (local host) or dial the proxy and ask it to
//! splice the two sides together (remote host).
//!
//! The [`BytestreamManager`] drives all of that.  There is one manager
//! per live connection; get yours with
//! [`BytestreamManager::for_connection`] and call
//! [`BytestreamManager::establish_session`] to receive a
//! [`BytestreamSession`], a plain duplex byte stream.
//!
//! The manager also remembers what it learns: entities that turned out
//! not to be SOCKS5 proxies are never probed again, and the proxy that
//! carried the last successful stream is offered first the next time
//! (switchable with
//! [`BytestreamManager::set_proxy_prioritization_enabled`]).
//!
//! The messaging stack itself stays outside this crate, behind the
//! [`XmppConnection`] trait.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(clippy::await_holding_lock)]

mod cache;
mod conn;
mod connect;
mod disco;
mod err;
mod jid;
mod proxy;
mod resolver;
mod session;
mod stanza;
#[cfg(test)]
mod testing;

pub use conn::{ConnectionId, IqFailure, IqRequest, IqResponse, XmppConnection};
pub use err::Error;
pub use jid::Jid;
pub use proxy::LocalProxy;
pub use session::BytestreamSession;
pub use stanza::{
    DiscoIdentity, DiscoInfo, DiscoItem, DiscoItems, StanzaError, StreamHost, StreamOffer,
    NS_BYTESTREAMS,
};

use crate::cache::ProxyCache;

use once_cell::sync::Lazy;
use rand::{distributions::Alphanumeric, Rng};
use s5b_socksproto::digest::stream_digest;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{debug, info};

/// A Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// How long a negotiation may spend on the socket work it owns (the
/// SOCKS5 connect and the wait for the target to reach our local
/// stream host), unless configured otherwise.
const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Length of auto-generated session IDs.
const SESSION_ID_LEN: usize = 24;

/// The process-wide map from connection to its manager.
///
/// Entries are weak so that dropping the last handle to a manager
/// frees it; dead entries are pruned on every lookup.
static MANAGERS: Lazy<Mutex<HashMap<ConnectionId, Weak<BytestreamManager>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Negotiates outgoing SOCKS5 bytestreams on one XMPP connection.
///
/// Use [`BytestreamManager::for_connection`] to get the manager for a
/// connection; repeated calls with the same connection return the same
/// manager.
pub struct BytestreamManager {
    /// The connection we negotiate over.
    conn: Arc<dyn XmppConnection>,
    /// What we remember about proxies on this connection.
    cache: ProxyCache,
    /// Our own stream host, started on demand.
    proxy: LocalProxy,
    /// Whether offers include our local stream host.
    announce_local: std::sync::atomic::AtomicBool,
    /// Deadline for the socket work of one negotiation.
    session_timeout: Mutex<Duration>,
    /// Fixed port for the local proxy; None means ephemeral.
    proxy_port: Mutex<Option<u16>>,
    /// Session IDs with a live or in-flight stream.
    live_sessions: Arc<Mutex<HashSet<String>>>,
}

impl BytestreamManager {
    /// Return the manager for `conn`, creating it first if this is the
    /// connection's first lookup.
    ///
    /// Creating a manager announces the bytestream feature through the
    /// connection's service discovery.
    pub fn for_connection(conn: Arc<dyn XmppConnection>) -> Arc<BytestreamManager> {
        let mut managers = MANAGERS.lock().expect("poisoned manager registry lock");
        managers.retain(|_, weak| weak.strong_count() > 0);

        let id = conn.id();
        if let Some(mgr) = managers.get(&id).and_then(Weak::upgrade) {
            return mgr;
        }
        let mgr = Arc::new(BytestreamManager::new(conn));
        managers.insert(id, Arc::downgrade(&mgr));
        mgr
    }

    /// Construct a manager for `conn` and announce the feature.
    fn new(conn: Arc<dyn XmppConnection>) -> Self {
        conn.add_feature(NS_BYTESTREAMS);
        BytestreamManager {
            conn,
            cache: ProxyCache::new(),
            proxy: LocalProxy::new(),
            announce_local: std::sync::atomic::AtomicBool::new(true),
            session_timeout: Mutex::new(DEFAULT_SESSION_TIMEOUT),
            proxy_port: Mutex::new(None),
            live_sessions: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Stop advertising the bytestream feature.
    pub fn disable_service(&self) {
        self.conn.remove_feature(NS_BYTESTREAMS);
    }

    /// Advertise the bytestream feature again.
    pub fn enable_service(&self) {
        self.conn.add_feature(NS_BYTESTREAMS);
    }

    /// Control whether offers include our own stream host.  On by
    /// default.
    pub fn set_announce_local_stream_host(&self, announce: bool) {
        self.announce_local
            .store(announce, std::sync::atomic::Ordering::Release);
    }

    /// Return true if offers include our own stream host.
    pub fn announce_local_stream_host(&self) -> bool {
        self.announce_local
            .load(std::sync::atomic::Ordering::Acquire)
    }

    /// Control whether the last successful proxy is offered first.  On
    /// by default; turning it off forgets nothing.
    pub fn set_proxy_prioritization_enabled(&self, enabled: bool) {
        self.cache.set_prioritization_enabled(enabled);
    }

    /// Return true if the last successful proxy is offered first.
    pub fn proxy_prioritization_enabled(&self) -> bool {
        self.cache.prioritization_enabled()
    }

    /// Set the deadline for the socket work of one negotiation.
    pub fn set_session_timeout(&self, timeout: Duration) {
        *self
            .session_timeout
            .lock()
            .expect("poisoned session-timeout lock") = timeout;
    }

    /// Return the deadline for the socket work of one negotiation.
    pub fn session_timeout(&self) -> Duration {
        *self
            .session_timeout
            .lock()
            .expect("poisoned session-timeout lock")
    }

    /// Fix the port the local stream host binds to, or pass None to
    /// use an ephemeral port.  Takes effect the next time the proxy
    /// starts.
    pub fn set_local_proxy_port(&self, port: Option<u16>) {
        *self
            .proxy_port
            .lock()
            .expect("poisoned proxy-port lock") = port;
    }

    /// Return the configured local proxy port, if one is fixed.
    pub fn local_proxy_port(&self) -> Option<u16> {
        *self
            .proxy_port
            .lock()
            .expect("poisoned proxy-port lock")
    }

    /// Return the local stream host this manager announces.
    pub fn local_proxy(&self) -> &LocalProxy {
        &self.proxy
    }

    /// Negotiate a bytestream to `target` under a fresh session ID.
    pub async fn establish_session(&self, target: &Jid) -> Result<BytestreamSession> {
        self.establish_session_with_id(target, fresh_session_id())
            .await
    }

    /// Negotiate a bytestream to `target` under the given session ID.
    ///
    /// The ID must be unique among this manager's live sessions; it is
    /// released when the returned stream is closed, or on failure.
    pub async fn establish_session_with_id(
        &self,
        target: &Jid,
        sid: String,
    ) -> Result<BytestreamSession> {
        {
            let mut live = self
                .live_sessions
                .lock()
                .expect("poisoned live-session lock");
            if !live.insert(sid.clone()) {
                return Err(Error::SessionIdInUse(sid));
            }
        }
        let mut guard = NegotiationGuard::new(
            Arc::clone(&self.live_sessions),
            sid.clone(),
            self.proxy.clone(),
        );

        debug!("negotiating bytestream session {} with {}", sid, target);

        let announce = self.announce_local_stream_host();
        if announce {
            self.proxy.start(self.local_proxy_port()).await?;
        }
        let local_hosts = if announce {
            self.proxy.stream_hosts(self.conn.local_jid())
        } else {
            Vec::new()
        };

        let hosts =
            resolver::resolve_stream_hosts(&*self.conn, &self.cache, local_hosts, target).await?;

        let digest = stream_digest(&sid, self.conn.local_jid().as_str(), target.as_str());
        if announce {
            // Register before the offer goes out: the target may
            // connect the instant it reads the offer.
            self.proxy.add_transfer(&digest);
            guard.track_transfer(digest.clone());
        }

        let offer = StreamOffer {
            sid: sid.clone(),
            hosts: hosts.clone(),
        };
        let used = match self.conn.send_iq(target, IqRequest::Offer(offer)).await {
            Ok(IqResponse::Used(jid)) => jid,
            Ok(_) => return Err(Error::Internal("offer reply had the wrong shape")),
            Err(IqFailure::Stanza(e)) => return Err(Error::RemoteRejected(e)),
            Err(e) => return Err(e.into()),
        };

        // If the target somehow names a JID that appears twice, the
        // first offered entry wins.
        let host = hosts
            .iter()
            .find(|h| h.jid == used)
            .ok_or_else(|| Error::UnknownUsedHost(used.clone()))?;

        let deadline = self.session_timeout();
        let local_win = host.jid == *self.conn.local_jid();
        let stream = if local_win {
            debug!("session {}: target connects to our stream host", sid);
            self.proxy.socket_for(&digest, deadline).await?
        } else {
            debug!("session {}: connecting to stream host {}", sid, used);
            let stream = connect::connect_stream_host(host, &digest, deadline).await?;
            let activate = IqRequest::Activate {
                sid: sid.clone(),
                target: target.clone(),
            };
            match self.conn.send_iq(&used, activate).await {
                Ok(_) => {}
                Err(IqFailure::Stanza(e)) => return Err(Error::RemoteError(e)),
                Err(e) => return Err(e.into()),
            }
            stream
        };

        if !local_win {
            // A local win doesn't shadow a remembered remote proxy.
            self.cache.note_success(&used);
        }
        info!("bytestream session {} established via {}", sid, used);

        guard.succeed();
        Ok(BytestreamSession::new(
            stream,
            sid,
            Arc::clone(&self.live_sessions),
        ))
    }
}

/// Cleanup that must happen if a negotiation fails or is dropped
/// mid-flight: release the session ID and unregister the pending
/// transfer from the local proxy.
struct NegotiationGuard {
    /// The manager's live-session set.
    live: Arc<Mutex<HashSet<String>>>,
    /// The session ID this negotiation claimed.
    sid: String,
    /// The local proxy a transfer may be registered on.
    proxy: LocalProxy,
    /// The digest of the registered transfer, if any.
    transfer: Option<String>,
    /// False once the negotiation has succeeded.
    armed: bool,
}

impl NegotiationGuard {
    /// Arm a guard for `sid`.
    fn new(live: Arc<Mutex<HashSet<String>>>, sid: String, proxy: LocalProxy) -> Self {
        NegotiationGuard {
            live,
            sid,
            proxy,
            transfer: None,
            armed: true,
        }
    }

    /// Record that a pending transfer was registered under `digest`.
    fn track_transfer(&mut self, digest: String) {
        self.transfer = Some(digest);
    }

    /// The negotiation succeeded: drop any leftover pending transfer
    /// (the target may have picked a remote proxy instead), but leave
    /// the session ID claimed; the session now owns it.
    fn succeed(mut self) {
        if let Some(digest) = self.transfer.take() {
            self.proxy.remove_transfer(&digest);
        }
        self.armed = false;
    }
}

impl Drop for NegotiationGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(digest) = &self.transfer {
            self.proxy.remove_transfer(digest);
        }
        self.live
            .lock()
            .expect("poisoned live-session lock")
            .remove(&self.sid);
    }
}

/// Generate a random session ID.
fn fresh_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}
