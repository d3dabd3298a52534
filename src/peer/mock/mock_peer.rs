use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::peer::{
    data_channel::DataChannel,
    mock::mock_channel::MockDataChannel,
    peer_connection::{PeerConnection, PeerEvent, PeerFactory},
    peer_error::PeerError,
    signaling_state::{PeerConnectionState, SdpType, SignalingState},
};
use crate::signaling::envelope::IceCandidate;

const OFFER_PREFIX: &str = "mock-offer:";
const ANSWER_PREFIX: &str = "mock-answer:";
const CANDIDATES_PER_PEER: u16 = 2;

#[derive(Debug, Clone, Copy)]
struct NetOptions {
    auto_flush: bool,
    gathering_stalls: bool,
    slow: bool,
}

struct NetInner {
    next_id: u64,
    peers: HashMap<u64, Arc<PeerShared>>,
    opts: NetOptions,
}

/// In-process stand-in for the network between peer connections.
///
/// Offers and answers carry the creating peer's id, so whoever applies a
/// description knows which peer to link with. Linking happens when the
/// initiator applies the answer; at that point every channel the initiator
/// created gets a twin on the joiner side.
#[derive(Clone)]
pub struct MockNetwork {
    inner: Arc<Mutex<NetInner>>,
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNetwork {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(NetInner {
                next_id: 1,
                peers: HashMap::new(),
                opts: NetOptions {
                    auto_flush: true,
                    gathering_stalls: false,
                    slow: false,
                },
            })),
        }
    }

    /// Channels created from now on queue frames until flushed.
    pub fn with_manual_flush(self) -> Self {
        self.lock().opts.auto_flush = false;
        self
    }

    /// Candidate gathering never reports completion.
    pub fn with_stalled_gathering(self) -> Self {
        self.lock().opts.gathering_stalls = true;
        self
    }

    /// Factories report a slow negotiating stack.
    pub fn with_slow_negotiation(self) -> Self {
        self.lock().opts.slow = true;
        self
    }

    pub fn factory(&self) -> MockPeerFactory {
        MockPeerFactory { net: self.clone() }
    }

    /// Probes for every peer created so far, in creation order.
    pub fn peers(&self) -> Vec<MockPeerProbe> {
        let g = self.lock();
        let mut ids: Vec<u64> = g.peers.keys().copied().collect();
        ids.sort_unstable();
        ids.iter()
            .filter_map(|id| g.peers.get(id))
            .map(|p| MockPeerProbe { shared: p.clone() })
            .collect()
    }

    fn register(&self) -> (Arc<PeerShared>, NetOptions) {
        let mut g = self.lock();
        let id = g.next_id;
        g.next_id += 1;
        let shared = Arc::new(PeerShared {
            id,
            state: Mutex::new(PeerState::default()),
        });
        g.peers.insert(id, shared.clone());
        (shared, g.opts)
    }

    fn peer(&self, id: u64) -> Option<Arc<PeerShared>> {
        self.lock().peers.get(&id).cloned()
    }

    fn link(&self, initiator: &Arc<PeerShared>, joiner_id: u64, auto_flush: bool) {
        let Some(joiner) = self.peer(joiner_id) else {
            return;
        };
        let local_channels: Vec<Arc<MockDataChannel>> = initiator.lock().channels.clone();

        let mut twins = Vec::with_capacity(local_channels.len());
        for ch in &local_channels {
            let twin = MockDataChannel::connecting(ch.label(), auto_flush);
            MockDataChannel::link(ch, &twin);
            twins.push(twin);
        }

        {
            let mut j = joiner.lock();
            j.events
                .push_back(PeerEvent::ConnectionState(PeerConnectionState::Connecting));
            j.events
                .push_back(PeerEvent::ConnectionState(PeerConnectionState::Connected));
            for twin in twins {
                j.channels.push(twin.clone());
                j.events.push_back(PeerEvent::DataChannel(twin));
            }
        }
        let mut i = initiator.lock();
        i.events
            .push_back(PeerEvent::ConnectionState(PeerConnectionState::Connecting));
        i.events
            .push_back(PeerEvent::ConnectionState(PeerConnectionState::Connected));
    }

    fn lock(&self) -> MutexGuard<'_, NetInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[derive(Default)]
struct PeerState {
    signaling: Option<SignalingState>,
    local_desc: Option<String>,
    remote_id: Option<u64>,
    has_remote: bool,
    applied: Vec<IceCandidate>,
    events: VecDeque<PeerEvent>,
    channels: Vec<Arc<MockDataChannel>>,
    closed: bool,
}

impl PeerState {
    fn signaling(&self) -> SignalingState {
        self.signaling.unwrap_or(SignalingState::Stable)
    }
}

struct PeerShared {
    id: u64,
    state: Mutex<PeerState>,
}

impl PeerShared {
    fn lock(&self) -> MutexGuard<'_, PeerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Test-side view of a mock peer.
#[derive(Clone)]
pub struct MockPeerProbe {
    shared: Arc<PeerShared>,
}

impl MockPeerProbe {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn signaling_state(&self) -> SignalingState {
        self.shared.lock().signaling()
    }

    /// Remote candidates in the order they were applied.
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.shared.lock().applied.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn channels(&self) -> Vec<Arc<MockDataChannel>> {
        self.shared.lock().channels.clone()
    }

    /// Queues an event as if the lower layers raised it.
    pub fn inject(&self, ev: PeerEvent) {
        self.shared.lock().events.push_back(ev);
    }
}

pub struct MockPeerFactory {
    net: MockNetwork,
}

impl PeerFactory for MockPeerFactory {
    fn create(&self) -> Result<Box<dyn PeerConnection>, PeerError> {
        let (shared, opts) = self.net.register();
        Ok(Box::new(MockPeer {
            shared,
            net: self.net.clone(),
            opts,
        }))
    }

    fn negotiates_slowly(&self) -> bool {
        self.net.lock().opts.slow
    }
}

pub struct MockPeer {
    shared: Arc<PeerShared>,
    net: MockNetwork,
    opts: NetOptions,
}

impl MockPeer {
    fn start_gathering(&self, st: &mut PeerState) {
        for n in 0..CANDIDATES_PER_PEER {
            st.events.push_back(PeerEvent::LocalCandidate(IceCandidate {
                candidate: format!(
                    "candidate:mock{id}{n} 1 udp 2122260223 127.0.0.1 {port} typ host",
                    id = self.shared.id,
                    port = 40_000 + n
                ),
                sdp_mid: Some("0".into()),
                sdp_m_line_index: Some(0),
            }));
        }
        if !self.opts.gathering_stalls {
            st.events.push_back(PeerEvent::GatheringComplete);
        }
    }
}

fn peer_id_from(sdp: &str, prefix: &str) -> Result<u64, PeerError> {
    sdp.lines()
        .next()
        .and_then(|l| l.strip_prefix(prefix))
        .and_then(|id| id.trim().parse().ok())
        .ok_or_else(|| PeerError::Rejected(format!("not a {prefix} description")))
}

impl PeerConnection for MockPeer {
    fn create_offer(&mut self) -> Result<String, PeerError> {
        let st = self.shared.lock();
        if st.closed {
            return Err(PeerError::Closed);
        }
        if st.signaling() != SignalingState::Stable {
            return Err(PeerError::InvalidState("create_offer"));
        }
        Ok(format!("{OFFER_PREFIX}{}", self.shared.id))
    }

    fn create_answer(&mut self) -> Result<String, PeerError> {
        let st = self.shared.lock();
        if st.closed {
            return Err(PeerError::Closed);
        }
        if st.signaling() != SignalingState::HaveRemoteOffer {
            return Err(PeerError::InvalidState("create_answer"));
        }
        Ok(format!("{ANSWER_PREFIX}{}", self.shared.id))
    }

    fn set_local_description(&mut self, kind: SdpType, sdp: &str) -> Result<(), PeerError> {
        let mut st = self.shared.lock();
        if st.closed {
            return Err(PeerError::Closed);
        }
        let next = match (kind, st.signaling()) {
            (SdpType::Offer, SignalingState::Stable) => SignalingState::HaveLocalOffer,
            (SdpType::Answer, SignalingState::HaveRemoteOffer) => SignalingState::Stable,
            _ => return Err(PeerError::InvalidState("set_local_description")),
        };
        st.signaling = Some(next);
        st.local_desc = Some(format!(
            "{sdp}\na=mock-candidates:{CANDIDATES_PER_PEER}"
        ));
        self.start_gathering(&mut st);
        Ok(())
    }

    fn set_remote_description(&mut self, kind: SdpType, sdp: &str) -> Result<(), PeerError> {
        let link_with = {
            let mut st = self.shared.lock();
            if st.closed {
                return Err(PeerError::Closed);
            }
            match (kind, st.signaling()) {
                (SdpType::Offer, SignalingState::Stable) => {
                    st.remote_id = Some(peer_id_from(sdp, OFFER_PREFIX)?);
                    st.signaling = Some(SignalingState::HaveRemoteOffer);
                    st.has_remote = true;
                    None
                }
                (SdpType::Answer, SignalingState::HaveLocalOffer) => {
                    let remote = peer_id_from(sdp, ANSWER_PREFIX)?;
                    st.remote_id = Some(remote);
                    st.signaling = Some(SignalingState::Stable);
                    st.has_remote = true;
                    Some(remote)
                }
                _ => return Err(PeerError::InvalidState("set_remote_description")),
            }
        };
        if let Some(remote) = link_with {
            self.net.link(&self.shared, remote, self.opts.auto_flush);
        }
        Ok(())
    }

    fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), PeerError> {
        let mut st = self.shared.lock();
        if st.closed {
            return Err(PeerError::Closed);
        }
        if !st.has_remote {
            return Err(PeerError::InvalidState("add_ice_candidate"));
        }
        st.applied.push(candidate.clone());
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        self.shared.lock().signaling()
    }

    fn has_remote_description(&self) -> bool {
        self.shared.lock().has_remote
    }

    fn local_description(&self) -> Option<String> {
        self.shared.lock().local_desc.clone()
    }

    fn create_data_channel(&mut self, label: &str) -> Result<Arc<dyn DataChannel>, PeerError> {
        let mut st = self.shared.lock();
        if st.closed {
            return Err(PeerError::Closed);
        }
        let ch = MockDataChannel::connecting(label, self.opts.auto_flush);
        st.channels.push(ch.clone());
        Ok(ch)
    }

    fn poll_event(&mut self) -> Option<PeerEvent> {
        self.shared.lock().events.pop_front()
    }

    fn close(&mut self) {
        let channels = {
            let mut st = self.shared.lock();
            if st.closed {
                return;
            }
            st.closed = true;
            st.signaling = Some(SignalingState::Closed);
            st.events.clear();
            st.channels.clone()
        };
        for ch in channels {
            ch.close();
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::peer::data_channel::{ChannelEvent, ChannelState, Frame};

    fn drain(pc: &mut Box<dyn PeerConnection>) -> Vec<PeerEvent> {
        std::iter::from_fn(|| pc.poll_event()).collect()
    }

    #[test]
    fn offer_answer_links_channels() {
        let net = MockNetwork::new();
        let factory = net.factory();
        let mut a = factory.create().expect("peer");
        let mut b = factory.create().expect("peer");

        let ch_a = a.create_data_channel("shared-channel").expect("channel");
        let offer = a.create_offer().expect("offer");
        a.set_local_description(SdpType::Offer, &offer).expect("local offer");
        assert_eq!(a.signaling_state(), SignalingState::HaveLocalOffer);

        b.set_remote_description(SdpType::Offer, &offer).expect("remote offer");
        let answer = b.create_answer().expect("answer");
        b.set_local_description(SdpType::Answer, &answer).expect("local answer");
        a.set_remote_description(SdpType::Answer, &answer).expect("remote answer");

        assert_eq!(ch_a.ready_state(), ChannelState::Open);
        let b_events = drain(&mut b);
        let ch_b = b_events
            .into_iter()
            .find_map(|e| match e {
                PeerEvent::DataChannel(ch) => Some(ch),
                _ => None,
            })
            .expect("joiner receives the channel");
        assert_eq!(ch_b.label(), "shared-channel");
        assert_eq!(ch_b.poll_event(), Some(ChannelEvent::Open));

        ch_a.send(Frame::Text("hi".into())).expect("send");
        assert_eq!(ch_b.poll_event(), Some(ChannelEvent::Message(Frame::Text("hi".into()))));
    }

    #[test]
    fn candidates_need_remote_description() {
        let net = MockNetwork::new();
        let mut pc = net.factory().create().expect("peer");
        let c = IceCandidate {
            candidate: "candidate:x".into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        };
        assert_eq!(
            pc.add_ice_candidate(&c),
            Err(PeerError::InvalidState("add_ice_candidate"))
        );
    }

    #[test]
    fn stalled_gathering_never_completes() {
        let net = MockNetwork::new().with_stalled_gathering();
        let mut pc = net.factory().create().expect("peer");
        let offer = pc.create_offer().expect("offer");
        pc.set_local_description(SdpType::Offer, &offer).expect("local");
        let events = drain(&mut pc);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, PeerEvent::LocalCandidate(_))));
    }

    #[test]
    fn answer_in_stable_state_is_rejected() {
        let net = MockNetwork::new();
        let mut pc = net.factory().create().expect("peer");
        assert_eq!(
            pc.set_remote_description(SdpType::Answer, "mock-answer:9"),
            Err(PeerError::InvalidState("set_remote_description"))
        );
    }
}
