//! A minimal JID wrapper.
//!
//! Parsing, normalization, and the bare/full distinction all belong to
//! the messaging stack behind [`XmppConnection`](crate::XmppConnection);
//! the negotiation code only ever compares JIDs for equality, orders
//! them, and prints them, so it carries an opaque token.

use std::fmt;

/// The address of an XMPP entity, treated as an opaque string.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Jid(String);

impl Jid {
    /// Wrap a string as a Jid.  No validation is performed.
    pub fn new(s: impl Into<String>) -> Self {
        Jid(s.into())
    }

    /// Return this Jid as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Jid {
    fn from(s: &str) -> Jid {
        Jid::new(s)
    }
}
