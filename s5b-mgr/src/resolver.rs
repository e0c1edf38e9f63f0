//! Builds the ordered list of stream hosts offered to a target.
//!
//! Resolution walks the protocol's discovery steps in order: make sure
//! the target can do bytestreams at all, list the server's items, ask
//! every not-yet-ruled-out item whether it is a SOCKS5 proxy, and ask
//! each proxy for its network addresses.  Local stream hosts go first
//! in the final list; among the remote proxies, the one that carried
//! the last successful stream is tried first when prioritization is on.

use crate::cache::ProxyCache;
use crate::conn::XmppConnection;
use crate::disco::Discovery;
use crate::stanza::{StreamHost, NS_BYTESTREAMS};
use crate::{Error, Jid, Result};

use std::collections::HashSet;
use tracing::debug;

/// Human-readable name of the bytestream feature, for error reporting.
pub(crate) const FEATURE_SOCKS5_BYTESTREAM: &str = "SOCKS5 Bytestream";

/// Produce the ordered list of stream hosts to offer `target`.
///
/// `local_hosts` are the initiator's own advertised stream hosts (empty
/// when local announcement is off); they are placed ahead of every
/// remote proxy.  Returns [`Error::FeatureNotSupported`] if the target
/// can't do bytestreams and [`Error::NoProxiesAvailable`] if the final
/// list would be empty.
pub(crate) async fn resolve_stream_hosts(
    conn: &dyn XmppConnection,
    cache: &ProxyCache,
    local_hosts: Vec<StreamHost>,
    target: &Jid,
) -> Result<Vec<StreamHost>> {
    let disco = Discovery::new(conn);

    if !disco.supports(target, NS_BYTESTREAMS).await? {
        return Err(Error::FeatureNotSupported {
            feature: FEATURE_SOCKS5_BYTESTREAM,
            jid: target.clone(),
        });
    }

    let items = disco.items(conn.service_jid()).await?;

    let mut seen: HashSet<Jid> = HashSet::new();
    let mut remote: Vec<StreamHost> = Vec::new();
    for item in items {
        // Duplicate items keep their first occurrence only.
        if !seen.insert(item.jid.clone()) {
            continue;
        }
        // An item already ruled out must not be probed again, ever.
        if cache.is_blacklisted(&item.jid) {
            continue;
        }

        let identities = match disco.identities(&item.jid).await {
            Ok(ids) => ids,
            Err(e) => {
                // One unreachable candidate shouldn't sink the whole
                // attempt, and it may answer next time.
                debug!("skipping {}: identity lookup failed: {}", item.jid, e);
                continue;
            }
        };
        if !identities.iter().any(|id| id.is_bytestream_proxy()) {
            debug!("{} is not a SOCKS5 proxy; won't ask again", item.jid);
            cache.blacklist(item.jid);
            continue;
        }

        match disco.stream_hosts(&item.jid).await {
            Ok(hosts) => remote.extend(hosts),
            Err(e) => {
                // A proxy that won't tell us its addresses is useless
                // right now, but still a proxy.
                debug!("skipping {}: streamhost lookup failed: {}", item.jid, e);
            }
        }
    }

    if cache.prioritization_enabled() {
        if let Some(last) = cache.last_success() {
            if let Some(pos) = remote.iter().position(|h| h.jid == last) {
                let preferred = remote.remove(pos);
                remote.insert(0, preferred);
            }
        }
    }

    let mut hosts = local_hosts;
    hosts.extend(remote);

    if hosts.is_empty() {
        return Err(Error::NoProxiesAvailable);
    }
    Ok(hosts)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::conn::{IqFailure, IqResponse};
    use crate::stanza::{DiscoIdentity, DiscoInfo, DiscoItem, DiscoItems};
    use crate::testing::ScriptedConn;

    /// disco#info payload advertising bytestream support.
    fn target_supports() -> IqResponse {
        IqResponse::DiscoInfo(DiscoInfo {
            features: vec![NS_BYTESTREAMS.to_string()],
            identities: vec![],
        })
    }

    /// disco#items payload listing the given JIDs.
    fn items_of(jids: &[&str]) -> IqResponse {
        IqResponse::DiscoItems(DiscoItems {
            items: jids.iter().map(|j| DiscoItem::new(Jid::new(*j))).collect(),
        })
    }

    /// disco#info payload identifying a SOCKS5 proxy.
    fn proxy_identity() -> IqResponse {
        IqResponse::DiscoInfo(DiscoInfo {
            features: vec![],
            identities: vec![DiscoIdentity::new("proxy", "bytestreams")],
        })
    }

    /// A one-entry streamhost reply for `jid`.
    fn hosts_of(jid: &str, port: u16) -> IqResponse {
        IqResponse::StreamHosts(vec![StreamHost::new(Jid::new(jid), "127.0.0.1", port)])
    }

    #[tokio::test]
    async fn target_without_feature() {
        let conn = ScriptedConn::new("init@x/r", "x");
        conn.queue_ok(IqResponse::DiscoInfo(DiscoInfo::default()));
        let cache = ProxyCache::new();

        let e = resolve_stream_hosts(&*conn, &cache, vec![], &Jid::new("tgt@x/r")).await;
        assert!(matches!(
            e,
            Err(Error::FeatureNotSupported { feature, jid })
                if feature == FEATURE_SOCKS5_BYTESTREAM && jid == Jid::new("tgt@x/r")
        ));
    }

    #[tokio::test]
    async fn duplicate_items_probed_once() {
        let conn = ScriptedConn::new("init@x/r", "x");
        conn.queue_ok(target_supports());
        conn.queue_ok(items_of(&["proxy.x", "proxy.x"]));
        conn.queue_ok(proxy_identity());
        conn.queue_ok(hosts_of("proxy.x", 7777));
        let cache = ProxyCache::new();

        let hosts = resolve_stream_hosts(&*conn, &cache, vec![], &Jid::new("tgt@x/r"))
            .await
            .unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].jid, Jid::new("proxy.x"));
        // Exactly one identity probe despite the duplicate item.
        assert_eq!(conn.requests_to(&Jid::new("proxy.x")).len(), 2);
    }

    #[tokio::test]
    async fn non_proxy_blacklisted() {
        let conn = ScriptedConn::new("init@x/r", "x");
        conn.queue_ok(target_supports());
        conn.queue_ok(items_of(&["store.x"]));
        conn.queue_ok(IqResponse::DiscoInfo(DiscoInfo {
            features: vec![],
            identities: vec![DiscoIdentity::new("store", "file")],
        }));
        let cache = ProxyCache::new();

        let e = resolve_stream_hosts(&*conn, &cache, vec![], &Jid::new("tgt@x/r")).await;
        assert!(matches!(e, Err(Error::NoProxiesAvailable)));
        assert!(cache.is_blacklisted(&Jid::new("store.x")));
    }

    #[tokio::test]
    async fn identity_failure_swallowed_and_not_blacklisted() {
        let conn = ScriptedConn::new("init@x/r", "x");
        conn.queue_ok(target_supports());
        conn.queue_ok(items_of(&["flaky.x", "proxy.x"]));
        conn.queue(Err(IqFailure::Transport(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "no answer",
        ))));
        conn.queue_ok(proxy_identity());
        conn.queue_ok(hosts_of("proxy.x", 7777));
        let cache = ProxyCache::new();

        let hosts = resolve_stream_hosts(&*conn, &cache, vec![], &Jid::new("tgt@x/r"))
            .await
            .unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].jid, Jid::new("proxy.x"));
        // Transient failure: the flaky candidate may be probed again.
        assert!(!cache.is_blacklisted(&Jid::new("flaky.x")));
    }

    #[tokio::test]
    async fn streamhost_failure_swallowed_and_not_blacklisted() {
        let conn = ScriptedConn::new("init@x/r", "x");
        conn.queue_ok(target_supports());
        conn.queue_ok(items_of(&["proxy.x"]));
        conn.queue_ok(proxy_identity());
        conn.queue(Err(IqFailure::Stanza(
            crate::stanza::StanzaError::RemoteServerTimeout,
        )));
        let cache = ProxyCache::new();

        let e = resolve_stream_hosts(&*conn, &cache, vec![], &Jid::new("tgt@x/r")).await;
        assert!(matches!(e, Err(Error::NoProxiesAvailable)));
        assert!(!cache.is_blacklisted(&Jid::new("proxy.x")));
    }

    #[tokio::test]
    async fn local_hosts_lead_and_last_success_promoted() {
        let conn = ScriptedConn::new("init@x/r", "x");
        conn.queue_ok(target_supports());
        conn.queue_ok(items_of(&["p1.x", "p2.x"]));
        conn.queue_ok(proxy_identity());
        conn.queue_ok(hosts_of("p1.x", 1111));
        conn.queue_ok(proxy_identity());
        conn.queue_ok(hosts_of("p2.x", 2222));
        let cache = ProxyCache::new();
        cache.note_success(&Jid::new("p2.x"));

        let local = vec![StreamHost::new(Jid::new("init@x/r"), "127.0.0.1", 9000)];
        let hosts = resolve_stream_hosts(&*conn, &cache, local, &Jid::new("tgt@x/r"))
            .await
            .unwrap();
        let jids: Vec<&str> = hosts.iter().map(|h| h.jid.as_str()).collect();
        assert_eq!(jids, vec!["init@x/r", "p2.x", "p1.x"]);
    }

    #[tokio::test]
    async fn no_promotion_when_disabled() {
        let conn = ScriptedConn::new("init@x/r", "x");
        conn.queue_ok(target_supports());
        conn.queue_ok(items_of(&["p1.x", "p2.x"]));
        conn.queue_ok(proxy_identity());
        conn.queue_ok(hosts_of("p1.x", 1111));
        conn.queue_ok(proxy_identity());
        conn.queue_ok(hosts_of("p2.x", 2222));
        let cache = ProxyCache::new();
        cache.note_success(&Jid::new("p2.x"));
        cache.set_prioritization_enabled(false);

        let hosts = resolve_stream_hosts(&*conn, &cache, vec![], &Jid::new("tgt@x/r"))
            .await
            .unwrap();
        let jids: Vec<&str> = hosts.iter().map(|h| h.jid.as_str()).collect();
        assert_eq!(jids, vec!["p1.x", "p2.x"]);
    }
}
