//! In-memory peer used by the signaling and session tests.

use crate::peer::{IceCandidate, PeerConnection, PeerEvent, PeerFactory};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::sync::mpsc;

#[derive(Default)]
struct Recorded {
    answer: Option<String>,
    waited_for_candidates: bool,
    remote_candidates: Vec<IceCandidate>,
    sent: Vec<String>,
}

pub struct FakePeer {
    offer: String,
    recorded: Mutex<Recorded>,
    channel_open: AtomicBool,
    microphone_stopped: AtomicBool,
    closed: AtomicBool,
}

impl Default for FakePeer {
    fn default() -> Self {
        Self::with_offer(Self::OFFER)
    }
}

impl FakePeer {
    pub const OFFER: &'static str =
        "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n";

    pub fn with_offer(offer: &str) -> Self {
        Self {
            offer: offer.to_string(),
            recorded: Mutex::new(Recorded::default()),
            channel_open: AtomicBool::new(false),
            microphone_stopped: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn set_channel_open(&self, open: bool) {
        self.channel_open.store(open, Ordering::SeqCst);
    }

    pub fn answer(&self) -> Option<String> {
        self.recorded.lock().unwrap().answer.clone()
    }

    pub fn waited_for_candidates(&self) -> bool {
        self.recorded.lock().unwrap().waited_for_candidates
    }

    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.recorded.lock().unwrap().remote_candidates.clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.recorded.lock().unwrap().sent.clone()
    }

    pub fn microphone_stopped(&self) -> bool {
        self.microphone_stopped.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn create_offer(&self, wait_for_candidates: bool) -> Result<String> {
        self.recorded.lock().unwrap().waited_for_candidates = wait_for_candidates;
        Ok(self.offer.clone())
    }

    async fn apply_answer(&self, sdp: &str) -> Result<()> {
        self.recorded.lock().unwrap().answer = Some(sdp.to_string());
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.recorded.lock().unwrap().remote_candidates.push(candidate);
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.recorded.lock().unwrap().sent.push(text.to_string());
        Ok(())
    }

    fn is_channel_open(&self) -> bool {
        self.channel_open.load(Ordering::SeqCst)
    }

    async fn stop_microphone(&self) -> Result<()> {
        self.microphone_stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one shared `FakePeer` and keeps the event sender so tests can
/// play the connection's side.
pub struct FakePeerFactory {
    peer: Arc<FakePeer>,
    events: Mutex<Option<mpsc::Sender<PeerEvent>>>,
    created: AtomicUsize,
}

impl FakePeerFactory {
    pub fn new(peer: Arc<FakePeer>) -> Self {
        Self {
            peer,
            events: Mutex::new(None),
            created: AtomicUsize::new(0),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub async fn emit(&self, event: PeerEvent) {
        let sender = self.events.lock().unwrap().clone();
        if let Some(sender) = sender {
            sender.send(event).await.unwrap();
        }
    }
}

#[async_trait]
impl PeerFactory for FakePeerFactory {
    async fn create(&self, events: mpsc::Sender<PeerEvent>) -> Result<Arc<dyn PeerConnection>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        *self.events.lock().unwrap() = Some(events);
        Ok(self.peer.clone())
    }
}
