use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::peer::{
    data_channel::{ChannelEvent, ChannelState, DataChannel, Frame},
    peer_error::ChannelError,
};

struct ChanInner {
    state: ChannelState,
    inbox: VecDeque<ChannelEvent>,
    in_flight: VecDeque<Frame>,
    buffered: usize,
    auto_flush: bool,
    remote: Weak<MockDataChannel>,
}

/// One end of an in-process channel pair.
///
/// With auto-flush on, `send` hands the frame straight to the other end and
/// `buffered_amount` stays zero. With it off, frames queue locally until
/// [`flush`](Self::flush) moves them, which lets tests model a slow link.
pub struct MockDataChannel {
    label: String,
    inner: Mutex<ChanInner>,
}

impl MockDataChannel {
    pub fn connecting(label: &str, auto_flush: bool) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            inner: Mutex::new(ChanInner {
                state: ChannelState::Connecting,
                inbox: VecDeque::new(),
                in_flight: VecDeque::new(),
                buffered: 0,
                auto_flush,
                remote: Weak::new(),
            }),
        })
    }

    /// Two already-open ends, each with an `Open` event queued.
    pub fn pair(label: &str, auto_flush: bool) -> (Arc<Self>, Arc<Self>) {
        let a = Self::connecting(label, auto_flush);
        let b = Self::connecting(label, auto_flush);
        Self::link(&a, &b);
        (a, b)
    }

    /// Connects two ends and opens both.
    pub fn link(a: &Arc<Self>, b: &Arc<Self>) {
        for (this, other) in [(a, b), (b, a)] {
            let mut g = this.lock();
            g.remote = Arc::downgrade(other);
            g.state = ChannelState::Open;
            g.inbox.push_back(ChannelEvent::Open);
        }
    }

    pub fn set_auto_flush(&self, on: bool) {
        self.lock().auto_flush = on;
    }

    /// Delivers queued frames to the remote end until at least `max_bytes`
    /// have moved or the queue is empty. Returns the bytes delivered.
    pub fn flush(&self, max_bytes: usize) -> usize {
        let mut moved = 0;
        while moved < max_bytes {
            let (frame, remote) = {
                let mut g = self.lock();
                let Some(frame) = g.in_flight.pop_front() else {
                    break;
                };
                g.buffered = g.buffered.saturating_sub(frame.len());
                (frame, g.remote.upgrade())
            };
            moved += frame.len();
            if let Some(remote) = remote {
                remote.push(ChannelEvent::Message(frame));
            }
        }
        moved
    }

    pub fn flush_all(&self) -> usize {
        self.flush(usize::MAX)
    }

    /// Queues an event on this end as if the network produced it.
    pub fn push(&self, ev: ChannelEvent) {
        self.lock().inbox.push_back(ev);
    }

    fn lock(&self) -> MutexGuard<'_, ChanInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl DataChannel for MockDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn ready_state(&self) -> ChannelState {
        self.lock().state
    }

    fn send(&self, frame: Frame) -> Result<(), ChannelError> {
        let remote = {
            let mut g = self.lock();
            match g.state {
                ChannelState::Open => {}
                ChannelState::Connecting => return Err(ChannelError::NotOpen),
                ChannelState::Closing | ChannelState::Closed => return Err(ChannelError::Closed),
            }
            if !g.auto_flush {
                g.buffered += frame.len();
                g.in_flight.push_back(frame);
                return Ok(());
            }
            g.remote.upgrade()
        };
        match remote {
            Some(r) => {
                r.push(ChannelEvent::Message(frame));
                Ok(())
            }
            None => Err(ChannelError::Send("remote end dropped".into())),
        }
    }

    fn buffered_amount(&self) -> usize {
        self.lock().buffered
    }

    fn poll_event(&self) -> Option<ChannelEvent> {
        self.lock().inbox.pop_front()
    }

    fn close(&self) {
        let remote = {
            let mut g = self.lock();
            if g.state == ChannelState::Closed {
                return;
            }
            g.state = ChannelState::Closed;
            g.in_flight.clear();
            g.buffered = 0;
            g.remote.upgrade()
        };
        if let Some(r) = remote {
            let mut g = r.lock();
            if g.state != ChannelState::Closed {
                g.state = ChannelState::Closed;
                g.inbox.push_back(ChannelEvent::Closed);
            }
        }
    }
}
