//! Shared test utilities
//!
//! Fakes for every collaborator the engine touches: a scripted microphone
//! that tracks how many streams are live, a keyword spotter that fires on
//! loud frames, and recording doubles for the command service, chat API
//! and speech output.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use voice_command_engine::chat::{
    ChatServices, GroupInfo, Recipient, SearchResults, StickerRef,
};
use voice_command_engine::service::{
    CommandRequest, CommandResponse, CommandResult, CommandTransport, RetryPolicy,
};
use voice_command_engine::voice::{
    KeywordSpotter, MicStream, Microphone, SAMPLE_RATE, SpeechFeedback, StreamControl,
};
use voice_command_engine::{
    ActivationMode, Assistant, AssistantHandle, Collaborators, Error, Result, Settings, Status,
};

/// Samples delivered per 50 ms chunk
pub const CHUNK_SAMPLES: usize = 800;
pub const CHUNK_MS: u64 = 50;

/// Amplitude of the wake burst; the spotter fires above this in PCM16
pub const WAKE_LEVEL: i16 = 20_000;

/// Generate sine wave audio samples
#[must_use]
pub fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples).map(|i| tone(i, frequency, amplitude)).collect()
}

/// Generate silence
#[must_use]
pub fn generate_silence(duration_secs: f32) -> Vec<f32> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

#[allow(clippy::cast_precision_loss)]
fn tone(index: usize, frequency: f32, amplitude: f32) -> f32 {
    amplitude * (2.0 * PI * frequency * index as f32 / SAMPLE_RATE as f32).sin()
}

/// What one microphone stream hears, starting when it is opened
#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Nothing, forever
    Silence,
    /// A loud burst the keyword spotter recognises
    Wake { after_ms: u64 },
    /// A spoken command: silence, a voiced tone, then silence
    Utterance { lead_ms: u64, speech_ms: u64 },
    /// Two wake bursts `gap_ms` apart
    DoubleWake { after_ms: u64, gap_ms: u64 },
    /// Silence until `after_ms`, then no more chunks while the stream stays open
    Stall { after_ms: u64 },
}

impl Script {
    fn sample(self, index: usize) -> f32 {
        #[allow(clippy::cast_possible_truncation)]
        let at_ms = (index as u64 * 1000) / u64::from(SAMPLE_RATE);
        match self {
            Self::Silence | Self::Stall { .. } => 0.0,
            Self::Wake { after_ms } if (after_ms..after_ms + 150).contains(&at_ms) => {
                tone(index, 440.0, 0.9)
            }
            Self::DoubleWake { after_ms, gap_ms }
                if (after_ms..after_ms + 150).contains(&at_ms)
                    || (after_ms + gap_ms..after_ms + gap_ms + 150).contains(&at_ms) =>
            {
                tone(index, 440.0, 0.9)
            }
            Self::Utterance { lead_ms, speech_ms }
                if (lead_ms..lead_ms + speech_ms).contains(&at_ms) =>
            {
                tone(index, 200.0, 0.5)
            }
            Self::Wake { .. } | Self::Utterance { .. } | Self::DoubleWake { .. } => 0.0,
        }
    }

    fn stalled(self, index: usize) -> bool {
        #[allow(clippy::cast_possible_truncation)]
        let at_ms = (index as u64 * 1000) / u64::from(SAMPLE_RATE);
        matches!(self, Self::Stall { after_ms } if at_ms >= after_ms)
    }
}

#[derive(Default)]
struct StreamFlags {
    paused: AtomicBool,
    closed: AtomicBool,
}

#[derive(Default)]
struct MicShared {
    scripts: VecDeque<Script>,
    streams: Vec<Arc<StreamFlags>>,
    opens: usize,
    active: usize,
    max_active: usize,
    deny: bool,
}

impl MicShared {
    fn refresh(&mut self) {
        self.streams.retain(|s| !s.closed.load(Ordering::SeqCst));
        self.active = self
            .streams
            .iter()
            .filter(|s| !s.paused.load(Ordering::SeqCst))
            .count();
        self.max_active = self.max_active.max(self.active);
    }
}

/// Scripted microphone: each opened stream plays the next [`Script`]
#[derive(Clone, Default)]
pub struct FakeMicrophone {
    shared: Arc<Mutex<MicShared>>,
}

impl FakeMicrophone {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        let mic = Self::default();
        mic.shared.lock().unwrap().scripts.extend(scripts);
        mic
    }

    /// A microphone the user never granted access to
    pub fn denied() -> Self {
        let mic = Self::default();
        mic.shared.lock().unwrap().deny = true;
        mic
    }

    /// Queue what the next opened stream hears
    pub fn push(&self, script: Script) {
        self.shared.lock().unwrap().scripts.push_back(script);
    }

    /// Streams opened so far
    pub fn opens(&self) -> usize {
        self.shared.lock().unwrap().opens
    }

    /// Streams currently delivering audio
    pub fn active(&self) -> usize {
        let mut shared = self.shared.lock().unwrap();
        shared.refresh();
        shared.active
    }

    /// Most streams ever delivering audio at once
    pub fn max_active(&self) -> usize {
        self.shared.lock().unwrap().max_active
    }
}

struct FakeControl {
    flags: Arc<StreamFlags>,
    shared: Arc<Mutex<MicShared>>,
}

impl StreamControl for FakeControl {
    fn pause(&self) -> Result<()> {
        self.flags.paused.store(true, Ordering::SeqCst);
        self.shared.lock().unwrap().refresh();
        Ok(())
    }

    fn play(&self) -> Result<()> {
        self.flags.paused.store(false, Ordering::SeqCst);
        self.shared.lock().unwrap().refresh();
        Ok(())
    }
}

impl Drop for FakeControl {
    fn drop(&mut self) {
        self.flags.closed.store(true, Ordering::SeqCst);
        if let Ok(mut shared) = self.shared.lock() {
            shared.refresh();
        }
    }
}

impl Microphone for FakeMicrophone {
    fn open(&self) -> Result<MicStream> {
        let flags = Arc::new(StreamFlags::default());
        let script = {
            let mut shared = self.shared.lock().unwrap();
            if shared.deny {
                return Err(Error::Permission("microphone access denied".to_string()));
            }
            shared.opens += 1;
            shared.streams.push(Arc::clone(&flags));
            shared.refresh();
            shared.scripts.pop_front().unwrap_or(Script::Silence)
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let feeder_flags = Arc::clone(&flags);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(CHUNK_MS));
            ticker.tick().await;
            let mut index = 0;
            loop {
                ticker.tick().await;
                if feeder_flags.closed.load(Ordering::SeqCst) {
                    break;
                }
                if feeder_flags.paused.load(Ordering::SeqCst) || script.stalled(index) {
                    continue;
                }
                let chunk: Vec<f32> = (index..index + CHUNK_SAMPLES).map(|i| script.sample(i)).collect();
                index += CHUNK_SAMPLES;
                if tx.send(chunk).is_err() {
                    break;
                }
            }
        });

        let control = FakeControl {
            flags,
            shared: Arc::clone(&self.shared),
        };
        Ok(MicStream::new(rx, Box::new(control), SAMPLE_RATE))
    }
}

/// Fires on any frame louder than [`WAKE_LEVEL`]
pub struct ScriptedSpotter;

#[async_trait(?Send)]
impl KeywordSpotter for ScriptedSpotter {
    fn frame_length(&self) -> usize {
        512
    }

    async fn process(&mut self, frame: &[i16]) -> Result<Option<usize>> {
        Ok(frame
            .iter()
            .any(|s| s.saturating_abs() > WAKE_LEVEL)
            .then_some(0))
    }

    fn reset(&mut self) {}
}

/// Parse a service response body the way the HTTP transport does
pub fn response(value: serde_json::Value) -> CommandResult {
    let parsed: CommandResponse = serde_json::from_value(value).expect("valid response");
    CommandResult::try_from(parsed).expect("valid client action")
}

/// Command service double with queued replies
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<(Duration, Result<CommandResult>)>>,
    requests: Mutex<Vec<CommandRequest>>,
    clears: AtomicUsize,
    hang_clears: AtomicBool,
}

impl MockTransport {
    pub fn respond(&self, value: serde_json::Value) {
        self.respond_after(Duration::ZERO, value);
    }

    pub fn respond_after(&self, delay: Duration, value: serde_json::Value) {
        self.replies
            .lock()
            .unwrap()
            .push_back((delay, Ok(response(value))));
    }

    pub fn fail(&self, error: Error) {
        self.replies
            .lock()
            .unwrap()
            .push_back((Duration::ZERO, Err(error)));
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// Make every later clear request wait a minute before answering
    pub fn hang_clears(&self) {
        self.hang_clears.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommandTransport for MockTransport {
    async fn post_command(&self, request: &CommandRequest) -> Result<CommandResult> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some((delay, reply)) => {
                tokio::time::sleep(delay).await;
                reply
            }
            None => Ok(response(serde_json::json!({}))),
        }
    }

    async fn clear_pending(&self) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        if self.hang_clears.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok(())
    }
}

/// Chat double recording each call as a short string
#[derive(Default)]
pub struct RecordingChat {
    calls: Mutex<Vec<String>>,
}

impl RecordingChat {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

fn recipient(to: &Recipient) -> &str {
    match to {
        Recipient::Conversation(id) | Recipient::Group(id) | Recipient::User(id) => id,
    }
}

#[async_trait]
impl ChatServices for RecordingChat {
    async fn send_message(&self, to: &Recipient, content: &str) -> Result<()> {
        self.record(format!("message {} {content}", recipient(to)))
    }

    async fn send_sticker(&self, to: &Recipient, sticker: &StickerRef) -> Result<()> {
        self.record(format!("sticker {} {sticker:?}", recipient(to)))
    }

    async fn send_emoji(&self, to: &Recipient, emoji: &str) -> Result<()> {
        self.record(format!("emoji {} {emoji}", recipient(to)))
    }

    async fn create_group(&self, name: &str, member_ids: &[String]) -> Result<GroupInfo> {
        self.record(format!("create {name} {}", member_ids.join(",")))?;
        Ok(GroupInfo {
            id: "g-new".to_string(),
            name: name.to_string(),
        })
    }

    async fn request_join_group(&self, group_id: &str) -> Result<()> {
        self.record(format!("join {group_id}"))
    }

    async fn add_group_members(&self, group_id: &str, member_ids: &[String]) -> Result<()> {
        self.record(format!("invite {group_id} {}", member_ids.join(",")))
    }

    async fn start_call(&self, to: &Recipient, video: bool) -> Result<()> {
        self.record(format!("call {} video={video}", recipient(to)))
    }

    async fn answer_call(&self, call_id: &str, accept: bool) -> Result<()> {
        self.record(format!("answer {call_id} accept={accept}"))
    }

    async fn search(&self, query: &str) -> Result<SearchResults> {
        self.record(format!("search {query}"))?;
        Ok(SearchResults::default())
    }

    async fn send_attachment(&self, to: &Recipient, attachment_id: &str) -> Result<()> {
        self.record(format!("attach {} {attachment_id}", recipient(to)))
    }
}

/// Speech double that records what was said and takes time to say it
pub struct RecordingSpeech {
    spoken: Mutex<Vec<String>>,
    duration: Duration,
}

impl Default for RecordingSpeech {
    fn default() -> Self {
        Self {
            spoken: Mutex::new(Vec::new()),
            duration: Duration::from_millis(200),
        }
    }
}

impl RecordingSpeech {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechFeedback for RecordingSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}

/// All fakes wired together
pub struct Harness {
    pub mic: FakeMicrophone,
    pub transport: Arc<MockTransport>,
    pub chat: Arc<RecordingChat>,
    pub speech: Arc<RecordingSpeech>,
}

impl Harness {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self::with_microphone(FakeMicrophone::new(scripts))
    }

    pub fn with_microphone(mic: FakeMicrophone) -> Self {
        Self {
            mic,
            transport: Arc::new(MockTransport::default()),
            chat: Arc::new(RecordingChat::default()),
            speech: Arc::new(RecordingSpeech::default()),
        }
    }

    pub fn assistant(
        &self,
        settings: Settings,
    ) -> (Assistant, AssistantHandle, watch::Receiver<Status>) {
        let collaborators = Collaborators {
            microphone: Rc::new(self.mic.clone()),
            spotter: Box::new(ScriptedSpotter),
            transport: self.transport.clone(),
            chat: self.chat.clone(),
            speech: self.speech.clone(),
        };
        Assistant::new(settings, collaborators, RetryPolicy::default())
    }
}

pub fn wake_word_settings() -> Settings {
    Settings::default()
}

pub fn push_to_talk_settings() -> Settings {
    Settings {
        activation_mode: ActivationMode::PushToTalk,
        ..Settings::default()
    }
}

/// Poll until `condition` holds, advancing (paused) time in small steps
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 100s");
}
