//! Declare an error type for s5b_socksproto.

use crate::msg::SocksStatus;
use thiserror::Error;

/// An error that occurs while negotiating a SOCKS5 exchange.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Tried to handle a message that wasn't complete: try again with
    /// more input.
    #[error("Message truncated; need to wait for more")]
    Truncated,

    /// The peer didn't implement SOCKS5 correctly.
    #[error("SOCKS5 protocol syntax violation")]
    Syntax,

    /// The peer declared a protocol version that isn't SOCKS5.
    ///
    /// Usually this means something other than a SOCKS5 implementation
    /// is on the other end of the connection.
    #[error("Unrecognized SOCKS protocol version {0}")]
    BadProtocol(u8),

    /// The peer asked for a SOCKS5 feature that bytestreams never use.
    #[error("SOCKS5 feature not supported")]
    NoSupport,

    /// The server accepted an authentication method other than
    /// "no authentication".
    #[error("Server chose unsupported authentication method {0}")]
    UnexpectedMethod(u8),

    /// The server answered our CONNECT request with a non-success
    /// reply code.
    #[error("Server rejected the connect request: {0}")]
    Rejected(SocksStatus),

    /// Tried to progress the handshake when it was already finished.
    /// This is a programming error.
    #[error("Handshake was finished; no need to call this again")]
    AlreadyFinished,
}
