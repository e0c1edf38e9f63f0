//! The capability trait through which the negotiation reaches the
//! messaging transport.
//!
//! Everything the manager needs from an XMPP stack fits in a narrow
//! interface: who am I, who is my server, one typed IQ round trip at a
//! time, and the per-connection feature registry that service
//! discovery answers from.  Keeping the seam this small is what lets
//! the tests drive entire negotiations from a scripted stub.

use crate::stanza::{DiscoInfo, DiscoItems, StanzaError, StreamHost, StreamOffer};
use crate::Jid;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// A token identifying one live connection.
///
/// Managers are cached per connection; this is the cache key.  Two
/// connections must never share a token, so tokens come from a
/// process-wide counter rather than from the connection itself.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Return a fresh token, distinct from every other token handed
    /// out by this process.
    pub fn next() -> Self {
        /// The process-wide source of tokens.
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ConnectionId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// One IQ request, addressed to some entity.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum IqRequest {
    /// A disco#info get: what features and identities does the entity
    /// have?
    DiscoInfo,
    /// A disco#items get: what items does the entity host?
    DiscoItems,
    /// A bytestream get: at which network addresses does this proxy
    /// listen?
    StreamHosts,
    /// The stream offer sent to the target.
    Offer(StreamOffer),
    /// The activation request sent to the proxy the target picked.
    Activate {
        /// The session being activated.
        sid: String,
        /// The target the proxy should splice us to.
        target: Jid,
    },
}

/// The reply to one [`IqRequest`].
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum IqResponse {
    /// Reply to [`IqRequest::DiscoInfo`].
    DiscoInfo(DiscoInfo),
    /// Reply to [`IqRequest::DiscoItems`].
    DiscoItems(DiscoItems),
    /// Reply to [`IqRequest::StreamHosts`].
    StreamHosts(Vec<StreamHost>),
    /// Reply to [`IqRequest::Offer`]: the stream host the target chose.
    Used(Jid),
    /// An empty result, as for [`IqRequest::Activate`].
    Empty,
}

/// Ways an IQ round trip can fail.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IqFailure {
    /// The remote entity answered with an error stanza.
    #[error("remote answered with stanza error: {0}")]
    Stanza(StanzaError),

    /// The transport could not complete the round trip at all.
    #[error("IQ transport failed: {0}")]
    Transport(#[source] std::io::Error),
}

/// The face of one XMPP connection, as seen by the bytestream manager.
///
/// Implementations are expected to route each request as a single IQ
/// of the appropriate type and resolve with the typed reply; request
/// timeouts and stanza-level plumbing are theirs to handle.
#[async_trait]
pub trait XmppConnection: Send + Sync {
    /// Return the token identifying this connection.
    fn id(&self) -> ConnectionId;

    /// Return our own full JID on this connection: the initiator JID
    /// in every negotiation we start.
    fn local_jid(&self) -> &Jid;

    /// Return the JID of the server this connection is logged in to,
    /// whose items are searched for bytestream proxies.
    fn service_jid(&self) -> &Jid;

    /// Perform one IQ round trip: send `request` to `to` and wait for
    /// the typed reply.
    async fn send_iq(&self, to: &Jid, request: IqRequest) -> Result<IqResponse, IqFailure>;

    /// Add `feature` to the features this connection advertises
    /// through service discovery.  Adding a feature twice is a no-op.
    fn add_feature(&self, feature: &str);

    /// Remove `feature` from the advertised features.
    fn remove_feature(&self, feature: &str);

    /// Return true if `feature` is currently advertised.
    fn has_feature(&self, feature: &str) -> bool;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unique_ids() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert_eq!(a, a);
    }
}
