//! Derivation of the rendezvous digest.
//!
//! Both halves of a bytestream find each other at the stream host by
//! presenting the same SOCKS5 "hostname": the SHA-1 of the session ID
//! and the two parties' JIDs, concatenated with no separator.  The
//! initiator computes it to register and request the stream; the
//! stream host computes it to match an incoming connection against a
//! pending transfer.

use sha1::{Digest, Sha1};

/// Number of hex characters in a rendezvous digest.
pub const DIGEST_LEN: usize = 40;

/// Compute the rendezvous digest for a session.
///
/// The result is always lowercase hex, [`DIGEST_LEN`] characters long,
/// and depends only on the three inputs.
pub fn stream_digest(session_id: &str, initiator: &str, target: &str) -> String {
    let mut d = Sha1::new();
    d.update(session_id.as_bytes());
    d.update(initiator.as_bytes());
    d.update(target.as_bytes());
    hex::encode(d.finalize())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_values() {
        // SHA-1 of the empty string and of "abc"; the inputs are
        // hashed as one concatenated byte string.
        assert_eq!(
            stream_digest("", "", ""),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
        assert_eq!(
            stream_digest("a", "b", "c"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn shape() {
        let d = stream_digest(
            "session77",
            "initiator@example.org/home",
            "target@example.org/work",
        );
        assert_eq!(d.len(), DIGEST_LEN);
        assert!(d.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }

    #[test]
    fn deterministic_and_sensitive() {
        let d1 = stream_digest("sid", "a@x/1", "b@y/2");
        let d2 = stream_digest("sid", "a@x/1", "b@y/2");
        assert_eq!(d1, d2);

        assert_ne!(d1, stream_digest("sid2", "a@x/1", "b@y/2"));
        assert_ne!(d1, stream_digest("sid", "a@x/2", "b@y/2"));
        assert_ne!(d1, stream_digest("sid", "a@x/1", "b@y/3"));
    }

    #[test]
    fn no_separator() {
        // The three inputs are concatenated directly, so shifting
        // characters between fields yields the same hash.
        assert_eq!(
            stream_digest("ab", "cd", "ef"),
            stream_digest("abc", "d", "ef")
        );
    }
}
