#[cfg(test)]
#[allow(clippy::module_inception)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use serde_json::json;

    use crate::log::{LogLevel, MemoryLogSink, NoopLogSink};
    use crate::mux::{BULK_CHANNEL, ChannelMessage, ChannelSignal, Multiplexer};
    use crate::peer::data_channel::{ChannelEvent, DataChannel, Frame};
    use crate::peer::mock::MockDataChannel;

    type Seen = Arc<Mutex<Vec<String>>>;

    fn recorder(seen: &Seen, tag: &'static str) -> impl FnMut(&ChannelMessage) + Send + 'static {
        let seen = seen.clone();
        move |m: &ChannelMessage| seen.lock().unwrap().push(format!("{tag}:{}", m.kind))
    }

    fn data_recorder(seen: &Seen, tag: &'static str) -> impl FnMut(Bytes) + Send + 'static {
        let seen = seen.clone();
        move |b: Bytes| seen.lock().unwrap().push(format!("{tag}:{}", b.len()))
    }

    fn tagged(kind: &str, channel: &str) -> String {
        ChannelMessage::new(kind, json!({}))
            .on_channel(channel)
            .encode()
            .unwrap()
    }

    #[test]
    fn tagged_messages_reach_only_their_channel() {
        let mux = Multiplexer::new(Arc::new(NoopLogSink));
        let seen = Seen::default();
        let _a = mux.register_handler("file-transfer", recorder(&seen, "file"));
        let _b = mux.register_handler("text-transfer", recorder(&seen, "text"));

        mux.dispatch_text(&tagged("text-sync", "text-transfer"));
        mux.dispatch_text(&tagged("file-list", "file-transfer"));

        assert_eq!(*seen.lock().unwrap(), vec!["text:text-sync", "file:file-list"]);
    }

    #[test]
    fn untagged_messages_are_broadcast() {
        let mux = Multiplexer::new(Arc::new(NoopLogSink));
        let seen = Seen::default();
        let _a = mux.register_handler("a", recorder(&seen, "a"));
        let _b = mux.register_handler("b", recorder(&seen, "b"));

        mux.dispatch_text(r#"{"type":"legacy","payload":{}}"#);

        assert_eq!(*seen.lock().unwrap(), vec!["a:legacy", "b:legacy"]);
    }

    #[test]
    fn unknown_channel_and_garbage_are_dropped_with_warning() {
        let log = Arc::new(MemoryLogSink::new());
        let mux = Multiplexer::new(log.clone());
        let seen = Seen::default();
        let _a = mux.register_handler("a", recorder(&seen, "a"));

        mux.dispatch_text(&tagged("x", "nobody"));
        mux.dispatch_text("{not json");

        assert!(seen.lock().unwrap().is_empty());
        assert!(log.contains(LogLevel::Warn, "no handler for channel 'nobody'"));
        assert!(log.contains(LogLevel::Warn, "undecodable"));
    }

    #[test]
    fn reregistering_replaces_and_stale_token_is_inert() {
        let mux = Multiplexer::new(Arc::new(NoopLogSink));
        let seen = Seen::default();
        let first = mux.register_handler("a", recorder(&seen, "first"));
        let second = mux.register_handler("a", recorder(&seen, "second"));

        assert!(!first.unregister(), "replaced registration is already gone");
        mux.dispatch_text(&tagged("m", "a"));
        assert!(second.unregister());
        mux.dispatch_text(&tagged("m", "a"));

        assert_eq!(*seen.lock().unwrap(), vec!["second:m"]);
    }

    #[test]
    fn binary_prefers_bulk_then_default_then_sole_handler() {
        let mux = Multiplexer::new(Arc::new(NoopLogSink));
        let seen = Seen::default();

        let only = mux.register_data_handler("video", data_recorder(&seen, "sole"));
        mux.dispatch_binary(Bytes::from_static(b"abc"));

        let default = mux.set_default_data_handler(data_recorder(&seen, "default"));
        mux.dispatch_binary(Bytes::from_static(b"abcd"));

        let bulk = mux.register_data_handler(BULK_CHANNEL, data_recorder(&seen, "bulk"));
        mux.dispatch_binary(Bytes::from_static(b"ab"));

        assert!(bulk.unregister());
        assert!(default.unregister());
        let _other = mux.register_data_handler("audio", data_recorder(&seen, "audio"));
        // Two candidates and no explicit default: dropped.
        mux.dispatch_binary(Bytes::from_static(b"z"));
        assert!(only.unregister());

        assert_eq!(*seen.lock().unwrap(), vec!["sole:3", "default:4", "bulk:2"]);
    }

    #[test]
    fn pump_dispatches_frames_and_reports_lifecycle() {
        let mux = Multiplexer::new(Arc::new(NoopLogSink));
        let seen = Seen::default();
        let _t = mux.register_handler("text-transfer", recorder(&seen, "text"));
        let _d = mux.register_data_handler(BULK_CHANNEL, data_recorder(&seen, "bulk"));

        let (local, remote) = MockDataChannel::pair("shared-channel", true);
        mux.attach(local.clone());
        assert!(mux.sender().is_ready());

        remote
            .send(Frame::Text(tagged("text-typing", "text-transfer")))
            .unwrap();
        remote.send(Frame::Binary(Bytes::from_static(b"12345"))).unwrap();
        remote.close();

        assert_eq!(
            mux.pump(),
            vec![ChannelSignal::Opened, ChannelSignal::Closed]
        );
        assert_eq!(*seen.lock().unwrap(), vec!["text:text-typing", "bulk:5"]);
        assert!(!mux.sender().is_ready());
    }

    #[test]
    fn sends_fail_softly_when_not_open() {
        let mux = Multiplexer::new(Arc::new(NoopLogSink));
        let tx = mux.sender();
        assert!(!tx.send_message("text-sync", json!({"text": "x"}), Some("text-transfer")));
        assert!(!tx.send_data(Bytes::from_static(b"x")));

        let (local, remote) = MockDataChannel::pair("shared-channel", true);
        mux.attach(local);
        assert!(tx.send_message("text-sync", json!({"text": "x"}), Some("text-transfer")));
        assert_eq!(remote.poll_event(), Some(ChannelEvent::Open));
        match remote.poll_event() {
            Some(ChannelEvent::Message(Frame::Text(t))) => {
                let m = ChannelMessage::decode(&t).unwrap();
                assert_eq!(m.channel.as_deref(), Some("text-transfer"));
                assert_eq!(m.payload["text"], "x");
            }
            other => panic!("unexpected {other:?}"),
        }

        mux.detach();
        assert!(!tx.send_data(Bytes::from_static(b"x")));
    }
}
