//! The voice session state machine.
//!
//! `connect` runs the whole negotiation as one linear sequence: mint a key,
//! open the peer connection, signal, then schedule the page context. Any
//! failure along the way tears everything down and leaves the session in
//! `Error`; there is no retry.
//!
//! Status is published on a watch channel, so hosts can always read the
//! latest value. The event channel is never awaited from `connect` or
//! `disconnect`: when the host is not draining it, events are dropped and
//! logged rather than stalling the session.

use crate::events::{VoiceEvent, VoiceStatus, parse_server_event};
use crate::mint::{KeySource, MintRequest};
use crate::peer::{IceCandidate, PeerConnection, PeerEvent, PeerFactory};
use crate::signaling::{self, Signaling};
use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use talkbook_core::context::{PageContext, SessionUpdate};
use talkbook_core::provider::Provider;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        watch,
    },
    task::JoinHandle,
};
use tracing::{debug, error, info, instrument, warn};

/// How long after negotiation the first page context is sent.
pub const INITIAL_CONTEXT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub provider: Provider,
    pub model: Option<String>,
    /// User-supplied provider key, forwarded to the backend instead of its own.
    pub api_key: Option<SecretString>,
    pub initial_context_delay: Duration,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            api_key: None,
            initial_context_delay: INITIAL_CONTEXT_DELAY,
        }
    }
}

struct ActiveConnection {
    peer: Arc<dyn PeerConnection>,
    pump: JoinHandle<()>,
    initial_context: Option<JoinHandle<()>>,
}

pub struct VoiceSession {
    config: VoiceConfig,
    keys: Arc<dyn KeySource>,
    peers: Arc<dyn PeerFactory>,
    signaling: Box<dyn Signaling>,
    events: mpsc::Sender<VoiceEvent>,
    status: watch::Sender<VoiceStatus>,
    context: watch::Sender<PageContext>,
    active: Option<ActiveConnection>,
}

impl VoiceSession {
    pub fn new(
        config: VoiceConfig,
        keys: Arc<dyn KeySource>,
        peers: Arc<dyn PeerFactory>,
        signaling: Box<dyn Signaling>,
        events: mpsc::Sender<VoiceEvent>,
    ) -> Self {
        let (context, _) = watch::channel(PageContext::default());
        let (status, _) = watch::channel(VoiceStatus::Idle);
        Self {
            config,
            keys,
            peers,
            signaling,
            events,
            status,
            context,
            active: None,
        }
    }

    /// A session using the signaling the configured provider expects.
    pub fn for_provider(
        config: VoiceConfig,
        keys: Arc<dyn KeySource>,
        peers: Arc<dyn PeerFactory>,
        events: mpsc::Sender<VoiceEvent>,
    ) -> Self {
        let signaling = signaling::for_provider(config.provider, config.model.as_deref());
        Self::new(config, keys, peers, signaling, events)
    }

    pub fn status(&self) -> VoiceStatus {
        *self.status.borrow()
    }

    /// Follows status changes without going through the event channel.
    pub fn subscribe_status(&self) -> watch::Receiver<VoiceStatus> {
        self.status.subscribe()
    }

    pub fn page_context(&self) -> PageContext {
        self.context.borrow().clone()
    }

    #[instrument(name = "voice_connect", skip(self), fields(provider = %self.config.provider))]
    pub async fn connect(&mut self) -> Result<()> {
        let status = self.status();
        if matches!(status, VoiceStatus::Connecting | VoiceStatus::Connected) {
            debug!(%status, "Connect ignored");
            return Ok(());
        }
        self.set_status(VoiceStatus::Connecting);

        match self.establish().await {
            Ok(()) => {
                self.set_status(VoiceStatus::Connected);
                info!("Voice session connected");
                Ok(())
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "Voice session failed to connect");
                self.reset().await;
                publish(&self.events, VoiceEvent::Error(format!("{:#}", e)));
                self.set_status(VoiceStatus::Error);
                Err(e)
            }
        }
    }

    async fn establish(&mut self) -> Result<()> {
        let instructions = self.context.borrow().initial_instructions();
        let key = self
            .keys
            .mint(MintRequest {
                provider: self.config.provider,
                model: self.config.model.clone(),
                api_key: self.config.api_key.clone(),
                instructions: Some(instructions),
            })
            .await?;

        let (peer_tx, peer_rx) = mpsc::channel(64);
        let peer = self.peers.create(peer_tx).await?;
        let (candidate_tx, candidate_rx) = mpsc::channel(64);
        let pump = tokio::spawn(pump_peer_events(peer_rx, candidate_tx, self.events.clone()));
        self.active = Some(ActiveConnection {
            peer: Arc::clone(&peer),
            pump,
            initial_context: None,
        });

        self.signaling
            .negotiate(Arc::clone(&peer), &key, candidate_rx)
            .await?;

        let delay = self.config.initial_context_delay;
        let mut context = self.context.subscribe();
        let initial = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !peer.is_channel_open() {
                warn!("Data channel not open; initial page context not sent");
                return;
            }
            let instructions = context.borrow_and_update().initial_instructions();
            if let Err(e) = send_instructions(peer.as_ref(), instructions).await {
                warn!(error = %e, "Failed to send initial page context");
            }
        });
        if let Some(active) = self.active.as_mut() {
            active.initial_context = Some(initial);
        }
        Ok(())
    }

    /// Records the reader's new page context and, when connected with an open
    /// data channel, pushes it to the model. Returns whether it was sent.
    pub async fn set_page_context(&mut self, context: PageContext) -> Result<bool> {
        if *self.context.borrow() == context {
            return Ok(false);
        }
        let instructions = context.update_instructions();
        self.context.send_replace(context);

        if self.status() != VoiceStatus::Connected {
            return Ok(false);
        }
        let Some(active) = self.active.as_ref() else {
            return Ok(false);
        };
        if !active.peer.is_channel_open() {
            return Ok(false);
        }
        send_instructions(active.peer.as_ref(), instructions).await?;
        debug!("Sent updated page context");
        Ok(true)
    }

    /// Ends the session. Always releases the microphone, the signaling socket
    /// and the peer connection, whatever state the session was in.
    #[instrument(name = "voice_disconnect", skip(self))]
    pub async fn disconnect(&mut self) {
        self.reset().await;
        self.set_status(VoiceStatus::Idle);
        info!("Voice session disconnected");
    }

    async fn reset(&mut self) {
        self.signaling.close().await;
        if let Some(active) = self.active.take() {
            if let Some(initial) = active.initial_context {
                initial.abort();
            }
            if let Err(e) = active.peer.stop_microphone().await {
                warn!(error = %e, "Failed to stop microphone");
            }
            if let Err(e) = active.peer.close().await {
                warn!(error = %e, "Failed to close peer connection");
            }
            active.pump.abort();
        }
    }

    fn set_status(&mut self, status: VoiceStatus) {
        self.status.send_replace(status);
        publish(&self.events, VoiceEvent::Status(status));
    }
}

/// Hands an event to the host without waiting for room in the channel.
fn publish(events: &mpsc::Sender<VoiceEvent>, event: VoiceEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => warn!(?event, "Event channel full; event dropped"),
        Err(TrySendError::Closed(_)) => debug!("Event receiver gone"),
    }
}

async fn send_instructions(peer: &dyn PeerConnection, instructions: String) -> Result<()> {
    let payload = SessionUpdate::instructions(instructions).to_json()?;
    peer.send_text(&payload).await
}

/// Routes peer events: provider messages to the application, local
/// candidates to the signaling strategy. A slow host must not hold up
/// candidate delivery, so application events go through `publish`.
async fn pump_peer_events(
    mut peer_events: mpsc::Receiver<PeerEvent>,
    candidates: mpsc::Sender<IceCandidate>,
    events: mpsc::Sender<VoiceEvent>,
) {
    while let Some(event) = peer_events.recv().await {
        match event {
            PeerEvent::DataChannelMessage(text) => {
                if let Some(event) = parse_server_event(&text) {
                    publish(&events, event);
                }
            }
            PeerEvent::LocalCandidate(candidate) => {
                let _ = candidates.send(candidate).await;
            }
            PeerEvent::DataChannelOpen => debug!("Data channel open"),
            PeerEvent::RemoteAudio => publish(&events, VoiceEvent::RemoteAudio),
            PeerEvent::ConnectionFailed(message) => publish(&events, VoiceEvent::Error(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mint::EphemeralKey;
    use crate::testing::{FakePeer, FakePeerFactory};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FixedKeys {
        fail: bool,
        last: Mutex<Option<MintRequest>>,
    }

    impl FixedKeys {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                last: Mutex::new(None),
            })
        }
        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                last: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl KeySource for FixedKeys {
        async fn mint(&self, request: MintRequest) -> Result<EphemeralKey> {
            *self.last.lock().unwrap() = Some(request);
            if self.fail {
                return Err(anyhow!("Unable to obtain realtime session token"));
            }
            Ok(EphemeralKey::new("ek_test"))
        }
    }

    #[derive(Default)]
    struct SignalingRecord {
        negotiations: AtomicUsize,
        socket_open: AtomicBool,
        closes: AtomicUsize,
    }

    struct FakeSignaling {
        record: Arc<SignalingRecord>,
        fail: bool,
    }

    #[async_trait]
    impl Signaling for FakeSignaling {
        async fn negotiate(
            &mut self,
            peer: Arc<dyn PeerConnection>,
            _key: &EphemeralKey,
            _local_candidates: mpsc::Receiver<IceCandidate>,
        ) -> Result<()> {
            self.record.negotiations.fetch_add(1, Ordering::SeqCst);
            self.record.socket_open.store(true, Ordering::SeqCst);
            let _offer = peer.create_offer(false).await?;
            if self.fail {
                return Err(anyhow!("answer rejected"));
            }
            peer.apply_answer("v=0\r\nanswer").await
        }

        async fn close(&mut self) {
            self.record.closes.fetch_add(1, Ordering::SeqCst);
            self.record.socket_open.store(false, Ordering::SeqCst);
        }
    }

    struct Harness {
        session: VoiceSession,
        peer: Arc<FakePeer>,
        factory: Arc<FakePeerFactory>,
        record: Arc<SignalingRecord>,
        keys: Arc<FixedKeys>,
        events: mpsc::Receiver<VoiceEvent>,
    }

    fn harness(keys: Arc<FixedKeys>, signaling_fails: bool) -> Harness {
        harness_with_capacity(keys, signaling_fails, 128)
    }

    fn harness_with_capacity(
        keys: Arc<FixedKeys>,
        signaling_fails: bool,
        capacity: usize,
    ) -> Harness {
        let peer = Arc::new(FakePeer::default());
        peer.set_channel_open(true);
        let factory = Arc::new(FakePeerFactory::new(Arc::clone(&peer)));
        let record = Arc::new(SignalingRecord::default());
        let (tx, rx) = mpsc::channel(capacity);
        let config = VoiceConfig {
            initial_context_delay: Duration::from_millis(10),
            ..Default::default()
        };
        let session = VoiceSession::new(
            config,
            keys.clone(),
            factory.clone(),
            Box::new(FakeSignaling {
                record: Arc::clone(&record),
                fail: signaling_fails,
            }),
            tx,
        );
        Harness {
            session,
            peer,
            factory,
            record,
            keys,
            events: rx,
        }
    }

    fn drain(rx: &mut mpsc::Receiver<VoiceEvent>) -> Vec<VoiceEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    fn page(n: u32, text: &str) -> PageContext {
        PageContext::new(n, 10, text)
    }

    #[tokio::test]
    async fn test_connect_reaches_connected_and_sends_initial_context() {
        let mut h = harness(FixedKeys::ok(), false);
        h.session.set_page_context(page(1, "opening page")).await.unwrap();

        h.session.connect().await.unwrap();
        assert_eq!(h.session.status(), VoiceStatus::Connected);
        assert_eq!(h.peer.answer().as_deref(), Some("v=0\r\nanswer"));

        let minted = h.keys.last.lock().unwrap().take().unwrap();
        assert!(minted.instructions.unwrap().contains("opening page"));

        tokio::time::sleep(Duration::from_millis(60)).await;
        let sent = h.peer.sent();
        assert_eq!(sent.len(), 1);
        let update: SessionUpdate = serde_json::from_str(&sent[0]).unwrap();
        assert!(update.session.instructions.contains("opening page"));

        assert_eq!(
            drain(&mut h.events),
            vec![
                VoiceEvent::Status(VoiceStatus::Connecting),
                VoiceEvent::Status(VoiceStatus::Connected)
            ]
        );
    }

    #[tokio::test]
    async fn test_page_change_while_connected_resends_instructions() {
        let mut h = harness(FixedKeys::ok(), false);
        h.session.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let before = h.peer.sent().len();

        let sent = h
            .session
            .set_page_context(page(2, "the second page").with_surrounding(3, "third"))
            .await
            .unwrap();
        assert!(sent);

        let messages = h.peer.sent();
        assert_eq!(messages.len(), before + 1);
        let update: SessionUpdate = serde_json::from_str(messages.last().unwrap()).unwrap();
        assert!(update.session.instructions.contains("page 2 of 10"));
        assert!(update.session.instructions.contains("the second page"));
    }

    #[tokio::test]
    async fn test_page_change_while_idle_is_only_recorded() {
        let mut h = harness(FixedKeys::ok(), false);
        let sent = h.session.set_page_context(page(4, "four")).await.unwrap();
        assert!(!sent);
        assert_eq!(h.session.page_context().current_page, 4);
        assert!(h.peer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_context_is_not_resent() {
        let mut h = harness(FixedKeys::ok(), false);
        h.session.set_page_context(page(1, "same")).await.unwrap();
        h.session.connect().await.unwrap();
        assert!(!h.session.set_page_context(page(1, "same")).await.unwrap());
    }

    #[tokio::test]
    async fn test_page_change_with_closed_channel_is_not_sent() {
        let mut h = harness(FixedKeys::ok(), false);
        h.session.connect().await.unwrap();
        h.peer.set_channel_open(false);
        assert!(!h.session.set_page_context(page(5, "five")).await.unwrap());
    }

    #[tokio::test]
    async fn test_disconnect_releases_microphone_and_socket() {
        let mut h = harness(FixedKeys::ok(), false);
        h.session.connect().await.unwrap();
        assert!(h.record.socket_open.load(Ordering::SeqCst));

        h.session.disconnect().await;
        assert_eq!(h.session.status(), VoiceStatus::Idle);
        assert!(h.peer.microphone_stopped());
        assert!(h.peer.is_closed());
        assert!(!h.record.socket_open.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_harmless() {
        let mut h = harness(FixedKeys::ok(), false);
        h.session.disconnect().await;
        assert_eq!(h.session.status(), VoiceStatus::Idle);
        assert_eq!(h.record.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_signaling_failure_resets_to_error() {
        let mut h = harness(FixedKeys::ok(), true);
        let err = h.session.connect().await.unwrap_err();
        assert!(err.to_string().contains("answer rejected"));

        assert_eq!(h.session.status(), VoiceStatus::Error);
        assert!(h.peer.microphone_stopped());
        assert!(h.peer.is_closed());
        assert!(!h.record.socket_open.load(Ordering::SeqCst));

        let events = drain(&mut h.events);
        assert!(events.contains(&VoiceEvent::Error("answer rejected".into())));
        assert_eq!(events.last(), Some(&VoiceEvent::Status(VoiceStatus::Error)));
    }

    #[tokio::test]
    async fn test_mint_failure_never_opens_a_peer() {
        let mut h = harness(FixedKeys::failing(), false);
        assert!(h.session.connect().await.is_err());
        assert_eq!(h.session.status(), VoiceStatus::Error);
        assert_eq!(h.factory.created(), 0);
        assert_eq!(h.record.negotiations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reconnect_after_disconnect() {
        let mut h = harness(FixedKeys::ok(), false);
        h.session.connect().await.unwrap();
        h.session.disconnect().await;
        h.session.connect().await.unwrap();
        assert_eq!(h.factory.created(), 2);
    }

    #[tokio::test]
    async fn test_connect_twice_is_noop() {
        let mut h = harness(FixedKeys::ok(), false);
        h.session.connect().await.unwrap();
        h.session.connect().await.unwrap();
        assert_eq!(h.factory.created(), 1);
        assert_eq!(h.record.negotiations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_data_channel_events_reach_the_application() {
        let mut h = harness(FixedKeys::ok(), false);
        h.session.connect().await.unwrap();
        drain(&mut h.events);

        h.factory
            .emit(PeerEvent::DataChannelMessage(
                r#"{"type":"conversation.item.input_audio_transcription.delta","delta":"what is"}"#
                    .into(),
            ))
            .await;
        h.factory
            .emit(PeerEvent::DataChannelMessage(
                r#"{"type":"response.text.delta","delta":{"content":"It is"}}"#.into(),
            ))
            .await;

        let first = h.events.recv().await.unwrap();
        let second = h.events.recv().await.unwrap();
        assert_eq!(first, VoiceEvent::Transcript("what is".into()));
        assert_eq!(second, VoiceEvent::Response("It is".into()));
    }

    #[tokio::test]
    async fn test_undrained_event_channel_never_blocks_the_session() {
        // The host holds the receiver but never reads it.
        let mut h = harness_with_capacity(FixedKeys::ok(), false, 1);
        let limit = Duration::from_secs(2);

        tokio::time::timeout(limit, h.session.connect())
            .await
            .expect("connect stalled on a full event channel")
            .unwrap();
        assert_eq!(h.session.status(), VoiceStatus::Connected);

        h.factory.emit(PeerEvent::RemoteAudio).await;
        h.factory
            .emit(PeerEvent::ConnectionFailed("ice failed".into()))
            .await;

        tokio::time::timeout(limit, h.session.disconnect())
            .await
            .expect("disconnect stalled on a full event channel");
        assert_eq!(h.session.status(), VoiceStatus::Idle);
        assert!(h.peer.microphone_stopped());

        // Only the first status fit; the rest were dropped.
        assert_eq!(
            drain(&mut h.events),
            vec![VoiceEvent::Status(VoiceStatus::Connecting)]
        );
    }

    #[tokio::test]
    async fn test_status_watch_follows_the_session() {
        let mut h = harness(FixedKeys::failing(), false);
        let mut status = h.session.subscribe_status();
        assert_eq!(*status.borrow_and_update(), VoiceStatus::Idle);

        assert!(h.session.connect().await.is_err());
        assert!(status.has_changed().unwrap());
        assert_eq!(*status.borrow_and_update(), VoiceStatus::Error);

        h.session.disconnect().await;
        assert_eq!(*status.borrow_and_update(), VoiceStatus::Idle);
    }
}
