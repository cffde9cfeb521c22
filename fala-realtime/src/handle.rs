//! Caller-facing side of a running lesson session.

use crate::capture::MicGate;
use crate::error::{Result, VoiceError};
use crate::state::ConnectionState;
use crate::transcript::ChatMessage;
use async_trait::async_trait;
use fala_core::LessonBrief;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Point-in-time view of a session, published after every handled event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub state: ConnectionState,
    pub messages: Vec<ChatMessage>,
    /// A wake stimulus or user speech is waiting for the first model reply.
    pub thinking: bool,
    pub turns: u32,
    pub muted: bool,
    /// Audio output is suspended until [`SessionHandle::resume_audio`] succeeds.
    pub needs_interaction: bool,
    pub may_complete: bool,
    pub wake_stimuli_sent: u32,
    /// Playback segments still sounding.
    pub active_segments: usize,
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    /// The learner completed the lesson.
    Completed,
    /// The learner left, or the endpoint closed the connection.
    Disconnected,
    Failed(VoiceError),
}

impl SessionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Hooks invoked from the session task. Keep them short; they run inline.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// Called when the connection state changes.
    async fn on_state_change(&self, _state: ConnectionState) {}

    /// Called when a transcript message is finalized.
    async fn on_message(&self, _message: &ChatMessage) {}

    /// Called once when the learner completes the lesson.
    async fn on_complete(&self) {}

    /// Called when the learner leaves without completing.
    async fn on_disconnect(&self) {}
}

/// Default no-op observer.
#[derive(Debug, Clone, Default)]
pub struct NoOpObserver;

#[async_trait]
impl SessionObserver for NoOpObserver {}

pub(crate) enum Command {
    ResumeAudio(oneshot::Sender<Result<()>>),
    Complete(oneshot::Sender<Result<()>>),
    Disconnect,
    /// Republish the snapshot (mute changed).
    Refresh,
}

/// Handle to a running lesson session.
///
/// Dropping every handle tears the session down.
pub struct SessionHandle {
    pub(crate) commands: mpsc::Sender<Command>,
    pub(crate) snapshot: watch::Receiver<SessionSnapshot>,
    pub(crate) gate: MicGate,
    pub(crate) brief: LessonBrief,
    pub(crate) task: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot.borrow().state
    }

    pub fn may_complete(&self) -> bool {
        self.snapshot.borrow().may_complete
    }

    /// Receiver notified on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until a snapshot satisfies `predicate`.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot> {
        self.snapshot
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map(|snapshot| snapshot.clone())
            .map_err(|_| VoiceError::SessionClosed)
    }

    /// Instruction and persona the session was opened with.
    pub fn brief(&self) -> &LessonBrief {
        &self.brief
    }

    pub fn is_muted(&self) -> bool {
        !self.gate.is_open()
    }

    /// Flip the mute switch and return whether the microphone is now muted.
    pub fn toggle_mute(&self) -> bool {
        let open = self.gate.toggle();
        let _ = self.commands.try_send(Command::Refresh);
        !open
    }

    pub fn set_muted(&self, muted: bool) {
        self.gate.set_open(!muted);
        let _ = self.commands.try_send(Command::Refresh);
    }

    /// Retry resuming audio output after a user gesture.
    pub async fn resume_audio(&self) -> Result<()> {
        self.request(Command::ResumeAudio).await
    }

    /// Complete the lesson. Refused with `CompletionLocked` until enough turns
    /// were exchanged; the session keeps running in that case.
    pub async fn complete(&self) -> Result<()> {
        self.request(Command::Complete).await
    }

    /// Leave the lesson without completing it.
    pub async fn disconnect(&self) -> Result<()> {
        self.commands.send(Command::Disconnect).await.map_err(|_| VoiceError::SessionClosed)
    }

    /// Wait for the session task to finish.
    pub async fn join(self) -> SessionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Session task aborted");
                SessionOutcome::Failed(VoiceError::SessionClosed)
            }
        }
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<()>>) -> Command,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(command(tx)).await.map_err(|_| VoiceError::SessionClosed)?;
        rx.await.map_err(|_| VoiceError::SessionClosed)?
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("snapshot", &*self.snapshot.borrow()).finish()
    }
}
