//! Declare error types for the bytestream manager.

use crate::conn::IqFailure;
use crate::stanza::StanzaError;
use crate::Jid;

use thiserror::Error;

/// An error produced while negotiating or running a bytestream.
///
/// "The target doesn't do bytestreams" and "there is nothing to offer"
/// are ordinary outcomes of a negotiation, not bugs; they get their own
/// variants so callers can fall back to another transport method.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The target does not advertise the feature we need.
    #[error("{feature} is not supported by {jid}")]
    FeatureNotSupported {
        /// Human-readable name of the missing feature.
        feature: &'static str,
        /// The entity that lacks it.
        jid: Jid,
    },

    /// Resolution produced no stream hosts to offer.
    #[error("no SOCKS5 stream hosts available")]
    NoProxiesAvailable,

    /// The target answered the stream offer with an error stanza.
    #[error("target rejected the stream offer: {0}")]
    RemoteRejected(StanzaError),

    /// The target claimed to have used a stream host we never offered.
    #[error("target used unknown stream host {0}")]
    UnknownUsedHost(Jid),

    /// The proxy refused to activate the stream.
    #[error("stream host failed to activate the bytestream: {0}")]
    RemoteError(StanzaError),

    /// A TCP-level failure: connect refused, reset, unexpected EOF.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The SOCKS5 exchange with a stream host went wrong.
    #[error("SOCKS5 handshake failed: {0}")]
    Socks(#[from] s5b_socksproto::Error),

    /// An IQ round trip failed and no more specific meaning applies.
    #[error("IQ exchange failed: {0}")]
    Iq(#[from] IqFailure),

    /// A deadline expired before the stream was paired.
    #[error("timed out while establishing the bytestream")]
    Timeout,

    /// The negotiation was abandoned: the caller went away, or the
    /// local proxy shut down underneath a pending transfer.
    #[error("bytestream negotiation canceled")]
    Canceled,

    /// The caller reused a session ID that is still live.
    #[error("session ID {0:?} is already in use")]
    SessionIdInUse(String),

    /// Something went wrong with the programming of this crate.
    #[error("internal error: {0}")]
    Internal(&'static str),
}
