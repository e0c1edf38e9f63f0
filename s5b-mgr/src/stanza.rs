//! Typed stanza payloads exchanged during a bytestream negotiation.
//!
//! The messaging transport owns XML; what crosses the
//! [`XmppConnection`](crate::XmppConnection) boundary are the values
//! below.  They correspond one-to-one with the `<query/>` payloads of
//! XEP-0065 and the service-discovery results the negotiation consumes.

use crate::Jid;

use std::fmt;

/// The namespace that advertises SOCKS5 bytestream support.
pub const NS_BYTESTREAMS: &str = "http://jabber.org/protocol/bytestreams";

/// One network location at which a stream host can be reached.
///
/// The triple is what gets advertised to the target: connect to
/// `addr:port` and name the rendezvous digest, and `jid` is who you
/// will be talking to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamHost {
    /// The JID of the entity operating the stream host.
    pub jid: Jid,
    /// An IP literal or DNS name.
    pub addr: String,
    /// TCP port, 1..=65535.
    pub port: u16,
}

impl StreamHost {
    /// Construct a new StreamHost.
    pub fn new(jid: Jid, addr: impl Into<String>, port: u16) -> Self {
        StreamHost {
            jid,
            addr: addr.into(),
            port,
        }
    }
}

/// The initiator's stream offer: a session ID and an ordered list of
/// stream hosts the target may pick from.  Mode is always TCP.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamOffer {
    /// The session this offer belongs to.
    pub sid: String,
    /// Candidate stream hosts, in the order the target should try them.
    pub hosts: Vec<StreamHost>,
}

/// A single identity from a disco#info result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoIdentity {
    /// The identity's category, e.g. "proxy".
    pub category: String,
    /// The identity's type, e.g. "bytestreams".
    pub kind: String,
    /// Optional human-readable name.
    pub name: Option<String>,
}

impl DiscoIdentity {
    /// Construct an identity with no name.
    pub fn new(category: impl Into<String>, kind: impl Into<String>) -> Self {
        DiscoIdentity {
            category: category.into(),
            kind: kind.into(),
            name: None,
        }
    }

    /// Return true if this identity marks a SOCKS5 bytestream proxy.
    pub fn is_bytestream_proxy(&self) -> bool {
        self.category == "proxy" && self.kind == "bytestreams"
    }
}

/// A disco#info result: the features and identities of one entity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiscoInfo {
    /// Feature namespaces the entity advertises.
    pub features: Vec<String>,
    /// Identities the entity advertises.
    pub identities: Vec<DiscoIdentity>,
}

impl DiscoInfo {
    /// Return true if `feature` is among the advertised features.
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

/// A single item from a disco#items result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoItem {
    /// The item's JID.
    pub jid: Jid,
    /// Optional human-readable name.
    pub name: Option<String>,
    /// Optional node attribute.
    pub node: Option<String>,
}

impl DiscoItem {
    /// Construct an item with neither name nor node.
    pub fn new(jid: Jid) -> Self {
        DiscoItem {
            jid,
            name: None,
            node: None,
        }
    }
}

/// A disco#items result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiscoItems {
    /// The items found at the queried entity.
    pub items: Vec<DiscoItem>,
}

/// A stanza error condition, as defined by RFC 6120 §8.3.
///
/// The negotiation never looks inside an error stanza beyond its
/// condition, so the condition is all we model.  Conditions this crate
/// has no special handling for arrive as [`StanzaError::Other`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum StanzaError {
    /// `<not-acceptable/>`
    NotAcceptable,
    /// `<not-allowed/>`
    NotAllowed,
    /// `<item-not-found/>`
    ItemNotFound,
    /// `<service-unavailable/>`
    ServiceUnavailable,
    /// `<forbidden/>`
    Forbidden,
    /// `<internal-server-error/>`
    InternalServerError,
    /// `<remote-server-timeout/>`
    RemoteServerTimeout,
    /// Any other condition, carried verbatim.
    Other(String),
}

impl fmt::Display for StanzaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            StanzaError::NotAcceptable => "not-acceptable",
            StanzaError::NotAllowed => "not-allowed",
            StanzaError::ItemNotFound => "item-not-found",
            StanzaError::ServiceUnavailable => "service-unavailable",
            StanzaError::Forbidden => "forbidden",
            StanzaError::InternalServerError => "internal-server-error",
            StanzaError::RemoteServerTimeout => "remote-server-timeout",
            StanzaError::Other(s) => s.as_str(),
        };
        write!(f, "{}", token)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn proxy_identity() {
        assert!(DiscoIdentity::new("proxy", "bytestreams").is_bytestream_proxy());
        assert!(!DiscoIdentity::new("proxy", "http").is_bytestream_proxy());
        assert!(!DiscoIdentity::new("store", "bytestreams").is_bytestream_proxy());
    }

    #[test]
    fn feature_lookup() {
        let info = DiscoInfo {
            features: vec![NS_BYTESTREAMS.to_string()],
            identities: vec![],
        };
        assert!(info.has_feature(NS_BYTESTREAMS));
        assert!(!info.has_feature("urn:xmpp:jingle:1"));
        assert!(!DiscoInfo::default().has_feature(NS_BYTESTREAMS));
    }

    #[test]
    fn error_conditions() {
        assert_eq!(StanzaError::NotAcceptable.to_string(), "not-acceptable");
        assert_eq!(
            StanzaError::Other("gone".to_string()).to_string(),
            "gone"
        );
    }
}
