//! Per-manager memory about proxies: which JIDs turned out not to be
//! SOCKS5 proxies, and which proxy last carried a stream to completion.

use crate::Jid;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// What a manager remembers about the proxies it has probed.
///
/// The blacklist only ever grows: once an item has answered discovery
/// with a non-proxy identity there is no reason to ask it again for
/// the life of the manager.  The last-success slot holds at most one
/// JID and is only written while prioritization is switched on.
pub(crate) struct ProxyCache {
    /// JIDs known not to be SOCKS5 proxies.  Insert-only.
    blacklist: Mutex<HashSet<Jid>>,
    /// The most recently successful remote proxy, if any.
    last_success: Mutex<Option<Jid>>,
    /// Whether the last successful proxy gets moved to the front of
    /// the next offer.
    prioritize: AtomicBool,
}

impl ProxyCache {
    /// Make a new empty cache with prioritization switched on.
    pub(crate) fn new() -> Self {
        ProxyCache {
            blacklist: Mutex::new(HashSet::new()),
            last_success: Mutex::new(None),
            prioritize: AtomicBool::new(true),
        }
    }

    /// Return true if `jid` has been ruled out as a proxy.
    pub(crate) fn is_blacklisted(&self, jid: &Jid) -> bool {
        self.blacklist
            .lock()
            .expect("poisoned blacklist lock")
            .contains(jid)
    }

    /// Record that `jid` is not a SOCKS5 proxy.
    pub(crate) fn blacklist(&self, jid: Jid) {
        self.blacklist
            .lock()
            .expect("poisoned blacklist lock")
            .insert(jid);
    }

    /// Record a successful negotiation through the remote proxy `jid`.
    ///
    /// Does nothing while prioritization is disabled.
    pub(crate) fn note_success(&self, jid: &Jid) {
        if !self.prioritization_enabled() {
            return;
        }
        let mut last = self
            .last_success
            .lock()
            .expect("poisoned last-success lock");
        *last = Some(jid.clone());
    }

    /// Return the most recently successful proxy, if one is recorded.
    pub(crate) fn last_success(&self) -> Option<Jid> {
        self.last_success
            .lock()
            .expect("poisoned last-success lock")
            .clone()
    }

    /// Turn prioritization on or off.  Turning it off clears nothing;
    /// it only suppresses reordering and further updates.
    pub(crate) fn set_prioritization_enabled(&self, enabled: bool) {
        self.prioritize.store(enabled, Ordering::Release);
    }

    /// Return true if prioritization is on.
    pub(crate) fn prioritization_enabled(&self) -> bool {
        self.prioritize.load(Ordering::Acquire)
    }
}
