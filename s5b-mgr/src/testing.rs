//! Testing stubs for the bytestream manager.  Only enabled with
//! `cfg(test)`.

#![allow(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

use crate::conn::{ConnectionId, IqFailure, IqRequest, IqResponse, XmppConnection};
use crate::stanza::StreamOffer;
use crate::Jid;

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// Type of the hook a test may install to observe (and react to) the
/// stream offer, e.g. to impersonate the target and dial an offered
/// stream host before the scripted used-host reply is returned.
type OfferHook = Box<dyn Fn(&StreamOffer) + Send + Sync>;

/// An [`XmppConnection`] driven by a queue of scripted replies.
///
/// Every request pops the next queued reply, in order, and is recorded
/// so tests can assert on the traffic that was (or wasn't) emitted.
/// Running past the end of the script is a test bug and panics.
pub(crate) struct ScriptedConn {
    id: ConnectionId,
    jid: Jid,
    server: Jid,
    features: Mutex<HashSet<String>>,
    replies: Mutex<VecDeque<Result<IqResponse, IqFailure>>>,
    log: Mutex<Vec<(Jid, IqRequest)>>,
    offer_hook: Mutex<Option<OfferHook>>,
}

impl ScriptedConn {
    pub(crate) fn new(jid: &str, server: &str) -> Arc<Self> {
        Arc::new(ScriptedConn {
            id: ConnectionId::next(),
            jid: Jid::new(jid),
            server: Jid::new(server),
            features: Mutex::new(HashSet::new()),
            replies: Mutex::new(VecDeque::new()),
            log: Mutex::new(Vec::new()),
            offer_hook: Mutex::new(None),
        })
    }

    /// Queue the next reply.
    pub(crate) fn queue(&self, reply: Result<IqResponse, IqFailure>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Queue the next reply as a success.
    pub(crate) fn queue_ok(&self, reply: IqResponse) {
        self.queue(Ok(reply));
    }

    /// Install a hook that runs on every stream offer, before its
    /// scripted reply is returned.
    pub(crate) fn on_offer(&self, hook: impl Fn(&StreamOffer) + Send + Sync + 'static) {
        *self.offer_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Every request sent so far, in order.
    pub(crate) fn sent(&self) -> Vec<(Jid, IqRequest)> {
        self.log.lock().unwrap().clone()
    }

    /// Every request addressed to `jid`, in order.
    pub(crate) fn requests_to(&self, jid: &Jid) -> Vec<IqRequest> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| to == jid)
            .map(|(_, req)| req)
            .collect()
    }

    /// Every stream offer sent so far, in order.
    pub(crate) fn offers(&self) -> Vec<StreamOffer> {
        self.sent()
            .into_iter()
            .filter_map(|(_, req)| match req {
                IqRequest::Offer(offer) => Some(offer),
                _ => None,
            })
            .collect()
    }

    /// How many disco#info probes have been addressed to `jid`.
    pub(crate) fn info_probes_of(&self, jid: &Jid) -> usize {
        self.requests_to(jid)
            .iter()
            .filter(|req| matches!(req, IqRequest::DiscoInfo))
            .count()
    }
}

#[async_trait]
impl XmppConnection for ScriptedConn {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn local_jid(&self) -> &Jid {
        &self.jid
    }

    fn service_jid(&self) -> &Jid {
        &self.server
    }

    async fn send_iq(&self, to: &Jid, request: IqRequest) -> Result<IqResponse, IqFailure> {
        self.log.lock().unwrap().push((to.clone(), request.clone()));
        if let IqRequest::Offer(offer) = &request {
            if let Some(hook) = &*self.offer_hook.lock().unwrap() {
                hook(offer);
            }
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted connection ran out of replies")
    }

    fn add_feature(&self, feature: &str) {
        self.features.lock().unwrap().insert(feature.to_string());
    }

    fn remove_feature(&self, feature: &str) {
        self.features.lock().unwrap().remove(feature);
    }

    fn has_feature(&self, feature: &str) -> bool {
        self.features.lock().unwrap().contains(feature)
    }
}
