//! Voice assistant engine
//!
//! One task owns the microphone, the pending action, and every transition
//! between listening, recording, and speaking. Each command runs as a
//! single future raced against the control channel, so a reset drops the
//! recorder, its timers, and any in-flight request together.

pub mod confirmation;
pub mod dialogue;
pub mod executor;
pub mod pending;
pub mod phrases;
pub mod state;
pub mod watchdog;

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::chat::ChatServices;
use crate::config::{ActivationMode, Settings};
use crate::service::{CommandResult, CommandRoundTrip, CommandTransport, RetryPolicy};
use crate::status::Status;
use crate::voice::{self, KeywordSpotter, Microphone, RecordingMode, SpeechFeedback, WakeWordListener};
use crate::{Error, Result};

pub use confirmation::{Confirmation, is_confirmation, parse_selection_index};
pub use dialogue::{Decision, decide};
pub use executor::{ActionExecutor, Outcome};
pub use pending::{ActionPayload, ClientAction, PendingAction, PendingUpdate, Target};
pub use state::{EngineState, MicHolder, Phase};
pub use watchdog::{Health, HealthWatchdog};

/// Reply sessions without speech before falling back to the wake word
pub const MAX_REPLY_MISSES: u32 = 3;

/// Bound on the background remote clear after a reset
pub const REMOTE_CLEAR_TIMEOUT: Duration = Duration::from_secs(3);

/// Requests from the surrounding UI
#[derive(Debug, Clone)]
pub enum ControlCommand {
    /// Start a command without the wake phrase
    PushToTalk,
    /// Abort everything and return to listening
    Reset,
    /// Ask the user whether to answer a call
    IncomingCall {
        call_id: String,
        caller_name: String,
        is_video: bool,
    },
    /// Tear down and continue with new settings
    Reload(Settings),
    /// Stop the engine
    Shutdown,
}

/// Cloneable control surface for a running [`Assistant`]
#[derive(Debug, Clone)]
pub struct AssistantHandle {
    tx: mpsc::UnboundedSender<ControlCommand>,
}

impl AssistantHandle {
    pub fn push_to_talk(&self) {
        self.send(ControlCommand::PushToTalk);
    }

    pub fn reset(&self) {
        self.send(ControlCommand::Reset);
    }

    pub fn incoming_call(&self, call_id: &str, caller_name: &str, is_video: bool) {
        self.send(ControlCommand::IncomingCall {
            call_id: call_id.to_string(),
            caller_name: caller_name.to_string(),
            is_video,
        });
    }

    pub fn reload(&self, settings: Settings) {
        self.send(ControlCommand::Reload(settings));
    }

    pub fn shutdown(&self) {
        self.send(ControlCommand::Shutdown);
    }

    fn send(&self, command: ControlCommand) {
        if self.tx.send(command).is_err() {
            tracing::debug!("assistant is no longer running");
        }
    }
}

/// External collaborators the engine drives
pub struct Collaborators {
    pub microphone: Rc<dyn Microphone>,
    pub spotter: Box<dyn KeywordSpotter>,
    pub transport: Arc<dyn CommandTransport>,
    pub chat: Arc<dyn ChatServices>,
    pub speech: Arc<dyn SpeechFeedback>,
}

/// What started a command
#[derive(Debug)]
enum Trigger {
    WakeWord,
    PushToTalk,
    IncomingCall(PendingAction),
}

/// Why the command future stopped being polled
enum Interrupt {
    Finished(Result<()>),
    Reset,
    Reload(Settings),
    Shutdown,
}

/// The assistant: engine plus its control channel
pub struct Assistant {
    engine: Engine,
    control: mpsc::UnboundedReceiver<ControlCommand>,
    /// Incoming calls that arrived while a command was in flight
    deferred: VecDeque<PendingAction>,
}

impl Assistant {
    /// Build an assistant; it does nothing until [`Assistant::run`] is polled
    #[must_use]
    pub fn new(
        settings: Settings,
        collaborators: Collaborators,
        retry: RetryPolicy,
    ) -> (Self, AssistantHandle, watch::Receiver<Status>) {
        let (tx, control) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(Status::Idle);

        let Collaborators {
            microphone,
            spotter,
            transport,
            chat,
            speech,
        } = collaborators;

        let mut listener = WakeWordListener::new(Rc::clone(&microphone), spotter);
        listener.set_wake_phrase(&settings.wake_phrase);

        let engine = Engine {
            settings,
            microphone,
            listener,
            round_trip: CommandRoundTrip::new(transport, retry),
            executor: ActionExecutor::new(chat),
            speech,
            state: EngineState::new(),
            watchdog: HealthWatchdog::default(),
            status: status_tx,
        };

        let assistant = Self {
            engine,
            control,
            deferred: VecDeque::new(),
        };
        (assistant, AssistantHandle { tx }, status_rx)
    }

    /// Replace the default liveness check
    #[must_use]
    pub fn with_watchdog(mut self, watchdog: HealthWatchdog) -> Self {
        self.engine.watchdog = watchdog;
        self
    }

    /// Run until shutdown
    ///
    /// Must be polled on the thread that owns the microphone.
    ///
    /// # Errors
    ///
    /// Returns the terminal error (microphone denied, keyword engine or
    /// listener failure) that disabled the assistant
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self) -> Result<()> {
        self.engine.start().await?;
        let mut ticker = self.engine.watchdog.ticker();

        loop {
            let trigger = if let Some(call) = self.deferred.pop_front() {
                Trigger::IncomingCall(call)
            } else {
                let engine = &mut self.engine;
                let listening = engine.state.accepts_wake_word() && engine.listener.is_active();

                tokio::select! {
                    command = self.control.recv() => match command {
                        Some(ControlCommand::PushToTalk) if engine.settings.stt_enabled => {
                            Trigger::PushToTalk
                        }
                        Some(ControlCommand::PushToTalk) => {
                            tracing::debug!("push to talk ignored, voice commands disabled");
                            continue;
                        }
                        Some(ControlCommand::IncomingCall { call_id, caller_name, is_video }) => {
                            Trigger::IncomingCall(PendingAction::incoming_call(&call_id, &caller_name, is_video))
                        }
                        Some(ControlCommand::Reset) => {
                            engine.reset()?;
                            continue;
                        }
                        Some(ControlCommand::Reload(settings)) => {
                            engine.reload(settings).await?;
                            continue;
                        }
                        Some(ControlCommand::Shutdown) | None => break,
                    },

                    detection = engine.listener.next_trigger(), if listening => match detection {
                        Ok(detection) => {
                            tracing::info!(keyword = detection.keyword_index, "wake word detected");
                            Trigger::WakeWord
                        }
                        Err(e) if e.is_terminal() => return Err(engine.disable(e)),
                        Err(e) => {
                            tracing::warn!(error = %e, "wake word listener failed, restarting");
                            engine.restart_listener()?;
                            engine.settle();
                            continue;
                        }
                    },

                    _ = ticker.tick() => {
                        engine.check_health()?;
                        continue;
                    }
                }
            };

            if matches!(self.drive(trigger).await?, Flow::Shutdown) {
                break;
            }
        }

        self.engine.stop();
        Ok(())
    }

    /// Run one command to completion or interruption
    #[allow(clippy::future_not_send)]
    async fn drive(&mut self, trigger: Trigger) -> Result<Flow> {
        let interrupt = {
            let command = self.engine.run_command(trigger);
            tokio::pin!(command);

            loop {
                tokio::select! {
                    result = &mut command => break Interrupt::Finished(result),
                    control = self.control.recv() => match control {
                        Some(ControlCommand::PushToTalk) => {
                            tracing::debug!("push to talk ignored, command in flight");
                        }
                        Some(ControlCommand::IncomingCall { call_id, caller_name, is_video }) => {
                            tracing::info!(call_id = %call_id, "incoming call deferred until command ends");
                            self.deferred.push_back(PendingAction::incoming_call(&call_id, &caller_name, is_video));
                        }
                        Some(ControlCommand::Reset) => break Interrupt::Reset,
                        Some(ControlCommand::Reload(settings)) => break Interrupt::Reload(settings),
                        Some(ControlCommand::Shutdown) | None => break Interrupt::Shutdown,
                    }
                }
            }
        };

        match interrupt {
            Interrupt::Finished(result) => result.map(|()| Flow::Continue),
            Interrupt::Reset => {
                self.engine.reset()?;
                Ok(Flow::Continue)
            }
            Interrupt::Reload(settings) => {
                self.engine.reload(settings).await?;
                Ok(Flow::Continue)
            }
            Interrupt::Shutdown => Ok(Flow::Shutdown),
        }
    }
}

enum Flow {
    Continue,
    Shutdown,
}

/// Everything a command touches
struct Engine {
    settings: Settings,
    microphone: Rc<dyn Microphone>,
    listener: WakeWordListener,
    round_trip: CommandRoundTrip,
    executor: ActionExecutor,
    speech: Arc<dyn SpeechFeedback>,
    state: EngineState,
    watchdog: HealthWatchdog,
    status: watch::Sender<Status>,
}

impl Engine {
    fn wake_mode(&self) -> bool {
        self.settings.stt_enabled && self.settings.activation_mode == ActivationMode::WakeWord
    }

    async fn start(&mut self) -> Result<()> {
        self.speech.set_rate(self.settings.speech_rate).await;

        if !self.settings.stt_enabled {
            self.listener.stop();
            self.settle();
            self.publish(Status::Disabled("voice commands are turned off".to_string()));
            return Ok(());
        }

        self.restart_listener()?;
        self.settle();
        self.publish_rest();
        tracing::info!(
            mode = ?self.settings.activation_mode,
            wake_phrase = %self.settings.wake_phrase,
            "assistant started"
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.listener.stop();
        self.settle();
        self.publish(Status::Stopped);
        tracing::info!("assistant stopped");
    }

    /// One command: record, interpret, act, speak; repeat while a reply is
    /// expected
    #[allow(clippy::future_not_send)]
    async fn run_command(&mut self, trigger: Trigger) -> Result<()> {
        if !self.state.begin_command() {
            tracing::debug!(?trigger, "trigger ignored, command in flight");
            return Ok(());
        }
        tracing::debug!(?trigger, "command started");

        if let Err(e) = self.listener.suspend() {
            tracing::warn!(error = %e, "failed to suspend wake word listener");
        }

        let outcome = self.converse(trigger).await;
        if let Err(e) = &outcome
            && !e.is_terminal()
        {
            tracing::error!(error = %e, "command failed");
            self.say(phrases::SERVICE_ERROR).await;
        }

        let restarted = self.restart_listener();
        if let Err(e) = self.state.finish_command(self.listener.is_attached()) {
            tracing::warn!(error = %e, "command ended out of order");
            self.settle();
        }
        restarted?;

        match outcome {
            Err(e) if e.is_terminal() => Err(self.disable(e)),
            _ => {
                self.publish_rest();
                Ok(())
            }
        }
    }

    #[allow(clippy::future_not_send)]
    async fn converse(&mut self, trigger: Trigger) -> Result<()> {
        if let Trigger::IncomingCall(call) = trigger {
            let prompt = call
                .prompt
                .clone()
                .unwrap_or_else(|| phrases::DEFAULT_CONFIRM.to_string());
            self.state.set_pending(call);
            self.say(&prompt).await;
        }

        let mut misses = 0;
        loop {
            let mode = if self.state.pending().is_some() {
                RecordingMode::ConfirmationReply
            } else {
                RecordingMode::FreshCommand
            };

            self.state.start_recording(mode)?;
            self.publish(Status::Recording);
            let clip = voice::record(self.microphone.as_ref(), mode).await;
            self.state.end_recording(self.listener.is_attached())?;
            let clip = clip?;

            if !clip.had_speech {
                if mode == RecordingMode::FreshCommand {
                    self.say(phrases::NOT_HEARD).await;
                    return Ok(());
                }
                misses += 1;
                tracing::info!(misses, "no reply heard");
                if misses >= MAX_REPLY_MISSES {
                    self.say(phrases::STOP_WAITING).await;
                    return Ok(());
                }
                let reprompt = match self.state.pending().and_then(|p| p.prompt.as_deref()) {
                    Some(prompt) => format!("{} {prompt}", phrases::REPLY_NOT_HEARD),
                    None => phrases::REPLY_NOT_HEARD.to_string(),
                };
                self.say(&reprompt).await;
                continue;
            }
            misses = 0;

            self.publish(Status::Processing);
            let result = match self.round_trip.send(&clip, self.state.pending()).await {
                Ok(result) => result,
                Err(Error::Unreachable(reason)) => {
                    tracing::warn!(%reason, "command service unreachable");
                    self.say(phrases::UNREACHABLE).await;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "command service error");
                    self.say(phrases::SERVICE_ERROR).await;
                    return Ok(());
                }
            };
            tracing::info!(transcript = %result.transcript, "command understood");

            let speech = self
                .dispatch(&result, mode == RecordingMode::ConfirmationReply)
                .await?;
            self.say(&speech).await;

            if self.state.pending().is_none() {
                return Ok(());
            }
        }
    }

    /// Apply a response and perform whatever it calls for
    async fn dispatch(&mut self, result: &CommandResult, was_reply: bool) -> Result<String> {
        let outcome = match dialogue::decide(&mut self.state, result, was_reply) {
            Decision::ExecutePending { action, selection } => {
                self.state.begin_dispatch()?;
                self.executor.execute(&action, selection).await
            }
            Decision::ExecuteClient(action) => {
                self.state.begin_dispatch()?;
                self.executor.execute_client(&action).await
            }
            Decision::Reject(action) => {
                self.state.begin_dispatch()?;
                self.executor.reject(&action).await
            }
            Decision::Cancelled { cancelled_type } => {
                tracing::info!(?cancelled_type, "pending action cancelled by service");
                return Ok(phrases::cancelled(cancelled_type.as_deref()));
            }
            Decision::InvalidSelection => return Ok(phrases::INVALID_SELECTION.to_string()),
            Decision::Speak(text) => return Ok(text),
        };

        tracing::info!(success = outcome.success, "action finished");
        if let Some(follow_up) = outcome.follow_up {
            self.state.set_pending(follow_up);
        }
        Ok(outcome.speech)
    }

    /// Speak and wait for playback to end; failures are logged only
    async fn say(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if let Err(e) = self.state.begin_speaking() {
            tracing::warn!(error = %e, "feedback skipped");
            return;
        }
        self.publish(Status::Speaking(text.to_string()));
        if let Err(e) = self.speech.speak(text).await {
            tracing::warn!(error = %e, "speech feedback failed");
        }
    }

    /// Cancel everything and return to clean listening
    ///
    /// The command future has already been dropped, which stops the
    /// recorder and its timers. The remote clear runs on its own task so the
    /// listener is back before the service answers.
    fn reset(&mut self) -> Result<()> {
        if let Some(discarded) = self.state.take_pending() {
            tracing::info!(kind = discarded.kind(), "discarding pending action");
        }

        let transport = self.round_trip.transport();
        tokio::spawn(async move {
            match tokio::time::timeout(REMOTE_CLEAR_TIMEOUT, transport.clear_pending()).await {
                Ok(Ok(())) => tracing::debug!("remote pending state cleared"),
                Ok(Err(e)) => tracing::warn!(error = %e, "failed to clear remote pending state"),
                Err(_) => tracing::warn!("timed out clearing remote pending state"),
            }
        });

        if self.settings.stt_enabled {
            self.restart_listener()?;
        }
        self.state.reset(self.listener.is_attached());
        if self.settings.stt_enabled {
            self.publish_rest();
        }
        tracing::info!("assistant reset");
        Ok(())
    }

    /// Tear down and start again with new settings
    async fn reload(&mut self, settings: Settings) -> Result<()> {
        tracing::info!(?settings, "reloading settings");
        self.listener.set_wake_phrase(&settings.wake_phrase);
        self.settings = settings;
        self.reset()?;
        self.start().await
    }

    /// Restart the listener if it should be running and has gone quiet
    fn check_health(&mut self) -> Result<()> {
        let should_listen = self.wake_mode() && !self.state.is_in_flight();
        let health = self
            .watchdog
            .check(should_listen, self.listener.last_activity(), Instant::now());

        let restart = match health {
            Health::NotListening => false,
            Health::Stalled { silent_for } => {
                tracing::warn!(silent_ms = silent_for.as_millis(), "wake word listener stalled");
                true
            }
            Health::Healthy => !self.listener.is_active(),
        };

        if restart {
            tracing::info!("restarting wake word listener");
            self.restart_listener()?;
            self.settle();
        }
        Ok(())
    }

    /// Put the listener in the state the settings call for
    ///
    /// A listener that cannot be started disables the assistant.
    fn restart_listener(&mut self) -> Result<()> {
        if !self.wake_mode() {
            self.listener.stop();
            return Ok(());
        }
        self.listener.restart().map_err(|e| self.disable(e))
    }

    /// Settle the state after an out-of-band change to the listener
    fn settle(&mut self) {
        if !self.state.is_in_flight() {
            self.state.settle(self.listener.is_attached());
        }
    }

    fn disable(&mut self, error: Error) -> Error {
        tracing::error!(error = %error, "assistant disabled");
        self.listener.stop();
        self.state.settle(false);
        self.publish(Status::Disabled(error.to_string()));
        error
    }

    fn publish_rest(&self) {
        let status = match self.state.pending() {
            Some(pending) => Status::AwaitingReply(pending.prompt.clone().unwrap_or_default()),
            None if self.listener.is_active() => Status::Listening,
            None => Status::Idle,
        };
        self.publish(status);
    }

    fn publish(&self, status: Status) {
        tracing::debug!(%status, "status");
        self.status.send_replace(status);
    }
}
