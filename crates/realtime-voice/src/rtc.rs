//! webrtc-rs backed peer connections.

use crate::peer::{DATA_CHANNEL_LABEL, IceCandidate, PeerConnection, PeerEvent, PeerFactory};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use talkbook_core::provider::ICE_SERVERS;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::{
    api::{
        APIBuilder,
        interceptor_registry::register_default_interceptors,
        media_engine::{MIME_TYPE_OPUS, MediaEngine},
    },
    data_channel::{
        RTCDataChannel, data_channel_message::DataChannelMessage,
        data_channel_state::RTCDataChannelState,
    },
    ice_transport::{
        ice_candidate::{RTCIceCandidate, RTCIceCandidateInit},
        ice_server::RTCIceServer,
    },
    interceptor::registry::Registry,
    media::Sample,
    peer_connection::{
        RTCPeerConnection, configuration::RTCConfiguration,
        peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription,
    },
    rtp_transceiver::{rtp_codec::RTCRtpCodecCapability, rtp_sender::RTCRtpSender},
    track::track_local::{TrackLocal, track_local_static_sample::TrackLocalStaticSample},
};

/// Receives the model's audio as Opus RTP payloads.
pub trait RemoteAudioSink: Send + Sync {
    fn write_opus(&self, payload: &[u8]);
}

/// The local audio track. The host captures and Opus-encodes microphone audio
/// and writes it here; once stopped, writes are rejected.
pub struct MicrophoneTrack {
    track: Arc<TrackLocalStaticSample>,
    sender: Arc<RTCRtpSender>,
    stopped: AtomicBool,
}

impl MicrophoneTrack {
    pub async fn write(&self, opus_frame: Bytes, duration: Duration) -> Result<()> {
        if self.is_stopped() {
            bail!("Microphone track has been stopped");
        }
        self.track
            .write_sample(&Sample {
                data: opus_frame,
                duration,
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn stop(&self, pc: &RTCPeerConnection) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        pc.remove_track(&self.sender).await?;
        Ok(())
    }
}

/// Builds webrtc-rs peer connections with one Opus send track and the
/// provider's event data channel.
#[derive(Default)]
pub struct WebRtcPeerFactory {
    audio_sink: Option<Arc<dyn RemoteAudioSink>>,
    microphone: Mutex<Option<Arc<MicrophoneTrack>>>,
}

impl WebRtcPeerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_audio_sink(mut self, sink: Arc<dyn RemoteAudioSink>) -> Self {
        self.audio_sink = Some(sink);
        self
    }

    /// The microphone track of the most recently created connection.
    pub fn microphone(&self) -> Option<Arc<MicrophoneTrack>> {
        self.microphone.lock().ok().and_then(|m| m.clone())
    }
}

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    async fn create(&self, events: mpsc::Sender<PeerEvent>) -> Result<Arc<dyn PeerConnection>> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: ICE_SERVERS.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(config).await?);

        // Remote audio from the model.
        let sink = self.audio_sink.clone();
        let track_events = events.clone();
        pc.on_track(Box::new(move |track, _, _| {
            let sink = sink.clone();
            let events = track_events.clone();
            Box::pin(async move {
                info!("Remote audio track attached");
                let _ = events.send(PeerEvent::RemoteAudio).await;
                if let Some(sink) = sink {
                    tokio::spawn(async move {
                        while let Ok((packet, _)) = track.read_rtp().await {
                            sink.write_opus(&packet.payload);
                        }
                    });
                }
            })
        }));

        let candidate_events = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = candidate_events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = events
                            .send(PeerEvent::LocalCandidate(IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_m_line_index: init.sdp_mline_index,
                            }))
                            .await;
                    }
                    Err(e) => warn!(error = %e, "Could not serialise local candidate"),
                }
            })
        }));

        let state_events = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let events = state_events.clone();
            Box::pin(async move {
                debug!(%state, "Peer connection state changed");
                if state == RTCPeerConnectionState::Failed {
                    let _ = events
                        .send(PeerEvent::ConnectionFailed(
                            "Peer connection failed".to_string(),
                        ))
                        .await;
                }
            })
        }));

        // Local microphone track.
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            "audio".to_owned(),
            "talkbook-microphone".to_owned(),
        ));
        let sender = pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;
        let rtcp_sender = Arc::clone(&sender);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while rtcp_sender.read(&mut buf).await.is_ok() {}
        });
        let microphone = Arc::new(MicrophoneTrack {
            track,
            sender,
            stopped: AtomicBool::new(false),
        });
        if let Ok(mut current) = self.microphone.lock() {
            *current = Some(Arc::clone(&microphone));
        }

        // Provider event channel.
        let dc = pc.create_data_channel(DATA_CHANNEL_LABEL, None).await?;
        let open_events = events.clone();
        dc.on_open(Box::new(move || {
            Box::pin(async move {
                let _ = open_events.send(PeerEvent::DataChannelOpen).await;
            })
        }));
        let message_events = events;
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let events = message_events.clone();
            Box::pin(async move {
                match String::from_utf8(msg.data.to_vec()) {
                    Ok(text) => {
                        let _ = events.send(PeerEvent::DataChannelMessage(text)).await;
                    }
                    Err(_) => warn!("Ignoring non-UTF-8 data channel message"),
                }
            })
        }));

        Ok(Arc::new(WebRtcPeer {
            pc,
            dc,
            microphone,
        }))
    }
}

pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    dc: Arc<RTCDataChannel>,
    microphone: Arc<MicrophoneTrack>,
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    async fn create_offer(&self, wait_for_candidates: bool) -> Result<String> {
        let offer = self.pc.create_offer(None).await?;
        let mut gathering = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(offer).await?;
        if wait_for_candidates {
            let _ = gathering.recv().await;
        }
        let local = self
            .pc
            .local_description()
            .await
            .context("Peer connection has no local description")?;
        Ok(local.sdp)
    }

    async fn apply_answer(&self, sdp: &str) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp.to_owned())?;
        self.pc.set_remote_description(answer).await?;
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_m_line_index,
                username_fragment: None,
            })
            .await?;
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.dc.send_text(text.to_owned()).await?;
        Ok(())
    }

    fn is_channel_open(&self) -> bool {
        self.dc.ready_state() == RTCDataChannelState::Open
    }

    async fn stop_microphone(&self) -> Result<()> {
        self.microphone.stop(&self.pc).await
    }

    async fn close(&self) -> Result<()> {
        self.dc.close().await?;
        self.pc.close().await?;
        Ok(())
    }
}
