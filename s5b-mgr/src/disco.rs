//! A thin typed gateway over the service-discovery round trips.
//!
//! The manager asks three questions during resolution: does an entity
//! support a feature, what items does an entity host, and what
//! identities does an entity carry.  Each is one IQ round trip; the
//! gateway unwraps the typed reply and passes failures through
//! untouched so the caller can decide which of them are fatal.

use crate::conn::{IqRequest, IqResponse, XmppConnection};
use crate::stanza::{DiscoIdentity, DiscoItem, StreamHost};
use crate::{Error, Jid, Result};

/// Typed access to discovery (and the bytestream address query) on one
/// connection.
pub(crate) struct Discovery<'a> {
    /// The connection we send queries through.
    conn: &'a dyn XmppConnection,
}

impl<'a> Discovery<'a> {
    /// Wrap a connection.
    pub(crate) fn new(conn: &'a dyn XmppConnection) -> Self {
        Discovery { conn }
    }

    /// Return true if `jid` advertises `feature` in its disco#info.
    pub(crate) async fn supports(&self, jid: &Jid, feature: &str) -> Result<bool> {
        match self.conn.send_iq(jid, IqRequest::DiscoInfo).await? {
            IqResponse::DiscoInfo(info) => Ok(info.has_feature(feature)),
            _ => Err(Error::Internal("disco#info reply had the wrong shape")),
        }
    }

    /// Return the items hosted at `jid`.
    pub(crate) async fn items(&self, jid: &Jid) -> Result<Vec<DiscoItem>> {
        match self.conn.send_iq(jid, IqRequest::DiscoItems).await? {
            IqResponse::DiscoItems(items) => Ok(items.items),
            _ => Err(Error::Internal("disco#items reply had the wrong shape")),
        }
    }

    /// Return the identities of `jid`.
    pub(crate) async fn identities(&self, jid: &Jid) -> Result<Vec<DiscoIdentity>> {
        match self.conn.send_iq(jid, IqRequest::DiscoInfo).await? {
            IqResponse::DiscoInfo(info) => Ok(info.identities),
            _ => Err(Error::Internal("disco#info reply had the wrong shape")),
        }
    }

    /// Ask a proxy at which network addresses it listens.
    ///
    /// This is a bytestream query rather than a discovery one, but it
    /// is the same kind of single typed round trip.
    pub(crate) async fn stream_hosts(&self, jid: &Jid) -> Result<Vec<StreamHost>> {
        match self.conn.send_iq(jid, IqRequest::StreamHosts).await? {
            IqResponse::StreamHosts(hosts) => Ok(hosts),
            _ => Err(Error::Internal("streamhost reply had the wrong shape")),
        }
    }
}
