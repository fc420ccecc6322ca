/*!
Ties everything together: chat in, a spoken and animated reply out.

Every chat message runs one cycle: language model, speech synthesis, lip sync,
avatar update and finally the compositor. Cycles never overlap and a new one is
only started once `response_interval` has passed since the last completed one.
*/

use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::StreamerConfig,
    db::{History, ResponseRecord},
    http,
    lip_sync::LipSync,
    llm::{LanguageModel, OllamaClient},
    model::{ChatMessage, Expression},
    puppet::Avatar,
    stream::{StreamHandler, StreamInfo},
    tts::{SpeechSynthesizer, VoicevoxClient},
    Error, Result,
};

/// What happened to a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Too soon after the previous reply. Nothing was called.
    Skipped,
    /// The model or the synthesizer had nothing to say.
    Empty,
    Completed { visemes: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamerStatus {
    pub is_running: bool,
    pub last_response_time: Option<String>,
    pub stream_info: StreamInfo,
    pub available_expressions: Vec<String>,
}

pub struct Streamer {
    llm: Box<dyn LanguageModel>,
    tts: Box<dyn SpeechSynthesizer>,
    lip_sync: LipSync,
    avatar: Avatar,
    stream: StreamHandler,
    history: Option<History>,

    response_interval: chrono::Duration,
    llm_timeout_secs: f64,
    tts_timeout_secs: f64,

    is_running: bool,
    last_response_time: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Streamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Streamer")
            .field("avatar", &self.avatar)
            .field("stream", &self.stream)
            .field("is_running", &self.is_running)
            .field("last_response_time", &self.last_response_time)
            .finish_non_exhaustive()
    }
}

impl Streamer {
    /// Build every collaborator from `config`. The avatar falls back to a placeholder when
    /// its model cannot be loaded, the history is disabled when it cannot be opened.
    pub fn from_config(config: &StreamerConfig) -> Result<Self> {
        let llm = OllamaClient::new(config.llm.clone())?;
        let tts = VoicevoxClient::new(&config.tts, config.voice_config.clone())?;
        let lip_sync = LipSync::new(&config.lip_sync)?;
        let avatar = Avatar::load_or_default(&config.vrm_path, config.expression_config);
        let stream = StreamHandler::new(
            config.platform.clone(),
            config.video_id.clone(),
            config.compositor.build(),
        );

        let history = config
            .history_path
            .as_ref()
            .and_then(|path| match History::open(path) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Response history disabled: {e}");
                    None
                }
            });

        let mut streamer = Self::new(Box::new(llm), Box::new(tts), lip_sync, avatar, stream)
            .with_response_interval(config.response_interval_secs)
            .with_timeouts(config.llm.timeout_secs, config.tts.timeout_secs);
        streamer.history = history;

        Ok(streamer)
    }

    pub fn new(
        llm: Box<dyn LanguageModel>,
        tts: Box<dyn SpeechSynthesizer>,
        lip_sync: LipSync,
        avatar: Avatar,
        stream: StreamHandler,
    ) -> Self {
        Self {
            llm,
            tts,
            lip_sync,
            avatar,
            stream,
            history: None,

            response_interval: chrono::Duration::seconds(5),
            llm_timeout_secs: 30.0,
            tts_timeout_secs: 30.0,

            is_running: false,
            last_response_time: None,
        }
    }

    pub fn with_response_interval(mut self, seconds: f64) -> Self {
        let millis = (seconds.max(0.0) * 1000.0) as i64;
        self.response_interval = chrono::Duration::milliseconds(millis);
        self
    }

    pub fn with_timeouts(mut self, llm_secs: f64, tts_secs: f64) -> Self {
        self.llm_timeout_secs = llm_secs;
        self.tts_timeout_secs = tts_secs;
        self
    }

    pub fn with_history(mut self, history: History) -> Self {
        self.history = Some(history);
        self
    }

    pub fn avatar(&self) -> &Avatar {
        &self.avatar
    }

    pub fn avatar_mut(&mut self) -> &mut Avatar {
        &mut self.avatar
    }

    pub fn history_mut(&mut self) -> Option<&mut History> {
        self.history.as_mut()
    }

    pub fn last_response_time(&self) -> Option<DateTime<Utc>> {
        self.last_response_time
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Whether a reply is allowed at `now`.
    fn ready(&self, now: DateTime<Utc>) -> bool {
        match self.last_response_time {
            Some(last) => now - last >= self.response_interval,
            None => true,
        }
    }

    /// Run one response cycle for `message`.
    ///
    /// Service failures are returned and leave the response gate untouched, so the
    /// next message gets a fresh attempt.
    pub async fn process_message(&mut self, message: &ChatMessage) -> Result<CycleOutcome> {
        if !self.ready(Utc::now()) {
            debug!("Skipping message from {}, replied too recently", message.author);
            return Ok(CycleOutcome::Skipped);
        }

        info!("{}: {}", message.author, message.message);

        let generate = self.llm.generate(&message.message);
        let response = timed("LLM", self.llm_timeout_secs, generate).await?;
        let response = response.trim();
        if response.is_empty() {
            debug!("Model returned an empty reply");
            return Ok(CycleOutcome::Empty);
        }

        let audio = timed("TTS", self.tts_timeout_secs, self.tts.synthesize(response)).await?;
        if audio.is_empty() {
            debug!("Synthesizer returned no audio");
            return Ok(CycleOutcome::Empty);
        }

        let visemes = self.lip_sync.analyze_wav(&audio)?;
        let viseme_count = visemes.len();

        self.avatar.set_lip_sync(visemes);
        self.avatar.set_expression(Expression::reply());
        self.stream.send(response).await;

        let now = Utc::now();
        self.last_response_time = Some(now);

        if let Some(history) = self.history.as_mut() {
            let record = ResponseRecord {
                created_at: now,
                platform: message.platform.clone(),
                author: message.author.clone(),
                message: message.message.clone(),
                response: response.to_string(),
                visemes: viseme_count,
            };
            if let Err(e) = history.record(&record) {
                error!("Unable to record response: {e}");
            }
        }

        info!("Replied with {viseme_count} visemes: {response}");

        Ok(CycleOutcome::Completed {
            visemes: viseme_count,
        })
    }

    /// Handle messages until the channel closes or `shutdown` fires.
    pub async fn run(
        &mut self,
        mut messages: mpsc::Receiver<ChatMessage>,
        shutdown: CancellationToken,
    ) {
        self.is_running = true;
        self.stream.connect().await;
        info!("Streamer started");

        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                v = messages.recv() => match v {
                    Some(v) => v,
                    None => break,
                },
            };

            match self.process_message(&message).await {
                Ok(outcome) => debug!("Cycle finished: {outcome:?}"),
                Err(e) => error!("Unable to respond to {}: {e}", message.author),
            }
        }

        self.stop().await;
    }

    pub async fn stop(&mut self) {
        if !self.is_running {
            return;
        }

        self.stream.disconnect().await;
        self.is_running = false;
        info!("Streamer stopped");
    }

    pub fn status(&self) -> StreamerStatus {
        StreamerStatus {
            is_running: self.is_running,
            last_response_time: self
                .last_response_time
                .map(|v| v.to_rfc3339_opts(SecondsFormat::Millis, true)),
            stream_info: self.stream.stream_info(),
            available_expressions: Avatar::available_expressions()
                .iter()
                .map(|v| v.to_string())
                .collect(),
        }
    }
}

async fn timed<T>(
    service: &'static str,
    seconds: f64,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(http::timeout(seconds.max(0.0))?, fut)
        .await
        .map_err(|_| Error::Timeout { service, seconds })?
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        lip_sync::{wav, LipSyncConfig},
        stream::tests::RecordingCompositor,
    };

    #[derive(Default, Clone)]
    struct Calls {
        llm: Arc<AtomicUsize>,
        tts: Arc<AtomicUsize>,
    }

    struct MockLlm {
        calls: Calls,
        reply: &'static str,
        delay: Option<Duration>,
        fail: bool,
    }

    #[async_trait]
    impl LanguageModel for MockLlm {
        async fn generate(&mut self, _input: &str) -> Result<String> {
            self.calls.llm.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(Error::Service {
                    service: "LLM",
                    reason: "connection refused".to_string(),
                });
            }

            Ok(self.reply.to_string())
        }
    }

    struct MockTts {
        calls: Calls,
    }

    #[async_trait]
    impl SpeechSynthesizer for MockTts {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
            self.calls.tts.fetch_add(1, Ordering::SeqCst);

            Ok(wav::tests::encode_i16(&[0; 4096], 1, 24000))
        }
    }

    struct Harness {
        streamer: Streamer,
        calls: Calls,
        sent: Arc<Mutex<Vec<String>>>,
    }

    fn harness(reply: &'static str, interval: f64) -> Harness {
        harness_with(
            MockLlm {
                calls: Calls::default(),
                reply,
                delay: None,
                fail: false,
            },
            interval,
        )
    }

    fn harness_with(mut llm: MockLlm, interval: f64) -> Harness {
        let calls = Calls::default();
        llm.calls = calls.clone();

        let compositor = RecordingCompositor::default();
        let sent = compositor.sent.clone();

        let streamer = Streamer::new(
            Box::new(llm),
            Box::new(MockTts {
                calls: calls.clone(),
            }),
            LipSync::new(&LipSyncConfig::default()).unwrap(),
            Avatar::load_or_default("missing.vrm", Expression::default()),
            StreamHandler::new("test", None, Box::new(compositor)),
        )
        .with_response_interval(interval);

        Harness {
            streamer,
            calls,
            sent,
        }
    }

    fn chat(text: &str) -> ChatMessage {
        ChatMessage::new("viewer", text, "test")
    }

    #[tokio::test]
    async fn completed_cycle() {
        let mut h = harness("Hello there!", 5.0);
        h.streamer.stream.connect().await;

        let outcome = h.streamer.process_message(&chat("Hi")).await.unwrap();

        assert_eq!(outcome, CycleOutcome::Completed { visemes: 5 });
        assert_eq!(h.streamer.avatar().expression(), Expression::reply());
        assert_eq!(h.streamer.avatar().lip_sync().len(), 5);
        assert_eq!(*h.sent.lock().unwrap(), vec!["Hello there!".to_string()]);
        assert!(h.streamer.last_response_time().is_some());
    }

    #[tokio::test]
    async fn second_cycle_inside_interval_is_skipped() {
        let mut h = harness("Hello", 5.0);

        assert!(matches!(
            h.streamer.process_message(&chat("first")).await.unwrap(),
            CycleOutcome::Completed { .. }
        ));
        let last = h.streamer.last_response_time();
        let expression = h.streamer.avatar().expression();

        assert_eq!(
            h.streamer.process_message(&chat("second")).await.unwrap(),
            CycleOutcome::Skipped
        );
        assert_eq!(h.calls.llm.load(Ordering::SeqCst), 1);
        assert_eq!(h.calls.tts.load(Ordering::SeqCst), 1);
        assert_eq!(h.streamer.last_response_time(), last);
        assert_eq!(h.streamer.avatar().expression(), expression);
    }

    #[tokio::test]
    async fn zero_interval_never_skips() {
        let mut h = harness("Hello", 0.0);

        for _ in 0..3 {
            assert!(matches!(
                h.streamer.process_message(&chat("again")).await.unwrap(),
                CycleOutcome::Completed { .. }
            ));
        }
        assert_eq!(h.calls.llm.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_reply_is_a_no_op() {
        let mut h = harness("   ", 5.0);

        assert_eq!(
            h.streamer.process_message(&chat("Hi")).await.unwrap(),
            CycleOutcome::Empty
        );
        assert_eq!(h.calls.tts.load(Ordering::SeqCst), 0);
        assert!(h.streamer.last_response_time().is_none());
        assert_eq!(h.streamer.avatar().expression(), Expression::default());
    }

    #[tokio::test]
    async fn service_failure_is_surfaced() {
        let mut h = harness_with(
            MockLlm {
                calls: Calls::default(),
                reply: "",
                delay: None,
                fail: true,
            },
            5.0,
        );

        assert!(matches!(
            h.streamer.process_message(&chat("Hi")).await,
            Err(Error::Service { .. })
        ));
        assert!(h.streamer.last_response_time().is_none());
        assert_eq!(h.calls.tts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let h = harness_with(
            MockLlm {
                calls: Calls::default(),
                reply: "late",
                delay: Some(Duration::from_secs(5)),
                fail: false,
            },
            5.0,
        );
        let mut streamer = h.streamer.with_timeouts(0.05, 30.0);

        assert!(matches!(
            streamer.process_message(&chat("Hi")).await,
            Err(Error::Timeout { service: "LLM", .. })
        ));
    }

    #[tokio::test]
    async fn run_until_channel_closes() {
        let mut h = harness("Hello", 0.0);
        let (tx, rx) = mpsc::channel(4);
        tx.send(chat("one")).await.unwrap();
        tx.send(chat("two")).await.unwrap();
        drop(tx);

        h.streamer.run(rx, CancellationToken::new()).await;

        assert!(!h.streamer.is_running());
        assert_eq!(h.sent.lock().unwrap().len(), 2);
        assert!(!h.streamer.status().stream_info.obs_connected);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let mut h = harness("Hello", 0.0);
        let (_tx, rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        h.streamer.run(rx, shutdown).await;

        assert!(!h.streamer.is_running());
        assert_eq!(h.calls.llm.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn records_history() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness("Hello", 0.0);
        let mut streamer = h
            .streamer
            .with_history(History::open(dir.path().join("db")).unwrap());

        streamer.process_message(&chat("Hi")).await.unwrap();

        let recent = streamer.history_mut().unwrap().recent(5).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "Hi");
        assert_eq!(recent[0].response, "Hello");
        assert_eq!(recent[0].visemes, 5);
    }

    #[tokio::test]
    async fn status() {
        let mut h = harness("Hello", 5.0);

        let status = h.streamer.status();
        assert!(!status.is_running);
        assert!(status.last_response_time.is_none());
        assert_eq!(
            status.available_expressions,
            vec!["happy", "angry", "sad", "relaxed", "surprised"]
        );

        h.streamer.process_message(&chat("Hi")).await.unwrap();
        let status = serde_json::to_value(h.streamer.status()).unwrap();
        assert!(status["last_response_time"].as_str().unwrap().ends_with('Z'));
        assert_eq!(status["stream_info"]["platform"], "test");
    }

    #[tokio::test]
    async fn unrepresentable_timeout_is_an_error() {
        let h = harness("Hello", 0.0);
        let mut streamer = h.streamer.with_timeouts(1e20, 30.0);

        assert!(matches!(
            streamer.process_message(&chat("Hi")).await,
            Err(Error::Config { .. })
        ));
        assert_eq!(h.calls.llm.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn from_config_rejects_huge_timeouts() {
        let config = StreamerConfig {
            llm: crate::llm::LlmConfig {
                timeout_secs: 1e20,
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(matches!(
            Streamer::from_config(&config),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn from_config_with_missing_assets() {
        let dir = tempfile::tempdir().unwrap();
        let config = StreamerConfig {
            vrm_path: dir.path().join("nope.vrm"),
            history_path: Some(dir.path().join("history")),
            ..Default::default()
        };

        let streamer = Streamer::from_config(&config).unwrap();
        assert!(streamer.avatar().is_placeholder());
        assert!(streamer.history.is_some());
    }
}
