//! Connection lifecycle and stall recovery as a pure state machine.
//!
//! [`SessionStateMachine::handle`] consumes one [`SessionInput`] and returns the
//! [`SessionAction`]s the orchestrator must perform. It never does I/O and never
//! reads a clock, so every transition can be driven directly from tests.

use serde::{Deserialize, Serialize};

/// Connection state of one session instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionState {
    /// `Disconnected` and `Error` end the session instance.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Why the session entered [`ConnectionState::Error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Transport(String),
    Microphone(String),
    Stalled { retries: u32 },
}

/// Everything the machine reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    TransportOpened,
    TransportFailed(String),
    /// The remote side closed the connection.
    TransportClosed,
    ResumeRejected,
    ResumeSucceeded,
    MicrophoneAcquired,
    MicrophoneDenied(String),
    SettleElapsed,
    /// Audio or text from the model.
    ModelActivity,
    /// A user transcription fragment; a reply is now expected.
    UserSpeech,
    TurnComplete,
    Interrupted,
    WatchdogExpired,
    /// Local teardown (user exit or completion).
    Teardown,
}

/// Side effects requested by the machine, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    ResumeAudio,
    AcquireMicrophone,
    StartSettleTimer,
    SendWakeStimulus,
    ArmWatchdog,
    CancelWatchdog,
    FlushPlayback,
    ReleaseResources,
}

/// Pure transition function for a session.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    state: ConnectionState,
    awaiting_response: bool,
    thinking: bool,
    needs_interaction: bool,
    wake_retries: u32,
    max_wake_retries: u32,
    failure: Option<FailureReason>,
}

impl SessionStateMachine {
    pub fn new(max_wake_retries: u32) -> Self {
        Self {
            state: ConnectionState::Connecting,
            awaiting_response: false,
            thinking: false,
            needs_interaction: false,
            wake_retries: 0,
            max_wake_retries,
            failure: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while a model reply is expected and has not started yet.
    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    /// True from a wake stimulus or user speech until the model starts
    /// answering. Unlike the watchdog's awaiting flag it stays clear while the
    /// learner holds the floor after a finished model turn.
    pub fn is_thinking(&self) -> bool {
        self.thinking
    }

    /// Audio output is suspended until a user gesture resumes it.
    pub fn needs_interaction(&self) -> bool {
        self.needs_interaction
    }

    /// Wake stimuli re-sent since the model last responded.
    pub fn wake_retries(&self) -> u32 {
        self.wake_retries
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    pub fn handle(&mut self, input: SessionInput) -> Vec<SessionAction> {
        use SessionAction::*;

        if self.state.is_terminal() {
            // Terminal states already released everything.
            return Vec::new();
        }

        match input {
            SessionInput::TransportOpened if self.state == ConnectionState::Connecting => {
                self.state = ConnectionState::Connected;
                vec![ResumeAudio, AcquireMicrophone, StartSettleTimer]
            }
            SessionInput::TransportOpened => Vec::new(),
            SessionInput::TransportFailed(message) => {
                self.fail(FailureReason::Transport(message))
            }
            SessionInput::TransportClosed | SessionInput::Teardown => {
                self.state = ConnectionState::Disconnected;
                self.awaiting_response = false;
                self.thinking = false;
                vec![ReleaseResources]
            }
            SessionInput::MicrophoneDenied(message) => {
                self.fail(FailureReason::Microphone(message))
            }
            SessionInput::ResumeRejected => {
                self.needs_interaction = true;
                Vec::new()
            }
            SessionInput::ResumeSucceeded => {
                self.needs_interaction = false;
                Vec::new()
            }
            SessionInput::MicrophoneAcquired => Vec::new(),
            _ if self.state != ConnectionState::Connected => Vec::new(),
            SessionInput::SettleElapsed => {
                self.awaiting_response = true;
                self.thinking = true;
                vec![SendWakeStimulus, ArmWatchdog]
            }
            SessionInput::ModelActivity => {
                self.awaiting_response = false;
                self.thinking = false;
                self.wake_retries = 0;
                vec![CancelWatchdog]
            }
            SessionInput::UserSpeech => {
                self.awaiting_response = true;
                self.thinking = true;
                vec![ArmWatchdog]
            }
            SessionInput::TurnComplete => {
                self.awaiting_response = true;
                self.thinking = false;
                self.wake_retries = 0;
                vec![ArmWatchdog]
            }
            SessionInput::Interrupted => {
                self.awaiting_response = false;
                self.thinking = false;
                vec![FlushPlayback, CancelWatchdog]
            }
            SessionInput::WatchdogExpired if !self.awaiting_response => Vec::new(),
            SessionInput::WatchdogExpired => {
                self.wake_retries += 1;
                if self.wake_retries > self.max_wake_retries {
                    self.fail(FailureReason::Stalled { retries: self.wake_retries - 1 })
                } else {
                    self.thinking = true;
                    vec![SendWakeStimulus, ArmWatchdog]
                }
            }
        }
    }

    fn fail(&mut self, reason: FailureReason) -> Vec<SessionAction> {
        self.state = ConnectionState::Error;
        self.awaiting_response = false;
        self.thinking = false;
        self.failure = Some(reason);
        vec![SessionAction::CancelWatchdog, SessionAction::ReleaseResources]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionAction::*;

    fn connected(max_retries: u32) -> SessionStateMachine {
        let mut machine = SessionStateMachine::new(max_retries);
        machine.handle(SessionInput::TransportOpened);
        machine
    }

    #[test]
    fn test_open_starts_media() {
        let mut machine = SessionStateMachine::new(5);
        assert_eq!(machine.state(), ConnectionState::Connecting);
        let actions = machine.handle(SessionInput::TransportOpened);
        assert_eq!(actions, vec![ResumeAudio, AcquireMicrophone, StartSettleTimer]);
        assert_eq!(machine.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_settle_sends_wake_and_arms_watchdog() {
        let mut machine = connected(5);
        assert_eq!(machine.handle(SessionInput::SettleElapsed), vec![SendWakeStimulus, ArmWatchdog]);
        assert!(machine.is_awaiting_response());
        assert_eq!(machine.handle(SessionInput::ModelActivity), vec![CancelWatchdog]);
        assert!(!machine.is_awaiting_response());
    }

    #[test]
    fn test_watchdog_ignored_when_not_awaiting() {
        let mut machine = connected(5);
        assert!(machine.handle(SessionInput::WatchdogExpired).is_empty());
    }

    #[test]
    fn test_resume_rejection_only_flags() {
        let mut machine = connected(5);
        assert!(machine.handle(SessionInput::ResumeRejected).is_empty());
        assert!(machine.needs_interaction());
        assert_eq!(machine.state(), ConnectionState::Connected);
        machine.handle(SessionInput::ResumeSucceeded);
        assert!(!machine.needs_interaction());
    }

    #[test]
    fn test_microphone_denied_fails_session() {
        let mut machine = connected(5);
        let actions = machine.handle(SessionInput::MicrophoneDenied("denied".into()));
        assert_eq!(actions, vec![CancelWatchdog, ReleaseResources]);
        assert_eq!(machine.state(), ConnectionState::Error);
        assert_eq!(machine.failure(), Some(&FailureReason::Microphone("denied".into())));
    }

    #[test]
    fn test_remote_close_disconnects() {
        let mut machine = connected(5);
        assert_eq!(machine.handle(SessionInput::TransportClosed), vec![ReleaseResources]);
        assert_eq!(machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut machine = connected(5);
        machine.handle(SessionInput::TransportFailed("reset".into()));
        for input in [
            SessionInput::TransportOpened,
            SessionInput::SettleElapsed,
            SessionInput::Teardown,
            SessionInput::WatchdogExpired,
        ] {
            assert!(machine.handle(input).is_empty());
        }
        assert_eq!(machine.state(), ConnectionState::Error);
    }

    #[test]
    fn test_interrupt_flushes_and_clears_awaiting() {
        let mut machine = connected(5);
        machine.handle(SessionInput::UserSpeech);
        assert_eq!(machine.handle(SessionInput::Interrupted), vec![FlushPlayback, CancelWatchdog]);
        assert!(!machine.is_awaiting_response());
    }

    #[test]
    fn test_wake_retries_are_bounded() {
        let mut machine = connected(2);
        machine.handle(SessionInput::SettleElapsed);
        assert_eq!(machine.handle(SessionInput::WatchdogExpired), vec![SendWakeStimulus, ArmWatchdog]);
        assert_eq!(machine.handle(SessionInput::WatchdogExpired), vec![SendWakeStimulus, ArmWatchdog]);
        assert_eq!(machine.handle(SessionInput::WatchdogExpired), vec![CancelWatchdog, ReleaseResources]);
        assert_eq!(machine.state(), ConnectionState::Error);
        assert_eq!(machine.failure(), Some(&FailureReason::Stalled { retries: 2 }));
    }

    #[test]
    fn test_turn_complete_resets_retries() {
        let mut machine = connected(1);
        machine.handle(SessionInput::SettleElapsed);
        machine.handle(SessionInput::WatchdogExpired);
        assert_eq!(machine.wake_retries(), 1);
        assert_eq!(machine.handle(SessionInput::TurnComplete), vec![ArmWatchdog]);
        assert_eq!(machine.wake_retries(), 0);
        assert!(machine.is_awaiting_response());
        assert_eq!(machine.handle(SessionInput::WatchdogExpired), vec![SendWakeStimulus, ArmWatchdog]);
    }

    #[test]
    fn test_thinking_tracks_pending_reply_only() {
        let mut machine = connected(5);
        assert!(!machine.is_thinking());

        machine.handle(SessionInput::SettleElapsed);
        assert!(machine.is_thinking());
        machine.handle(SessionInput::ModelActivity);
        assert!(!machine.is_thinking());

        // Learner's turn: the watchdog waits, but nobody is being answered.
        machine.handle(SessionInput::TurnComplete);
        assert!(machine.is_awaiting_response());
        assert!(!machine.is_thinking());

        machine.handle(SessionInput::WatchdogExpired);
        assert!(machine.is_thinking());
        machine.handle(SessionInput::ModelActivity);

        machine.handle(SessionInput::UserSpeech);
        assert!(machine.is_thinking());
        machine.handle(SessionInput::Interrupted);
        assert!(!machine.is_thinking());
    }

    #[test]
    fn test_events_before_open_are_ignored() {
        let mut machine = SessionStateMachine::new(5);
        assert!(machine.handle(SessionInput::SettleElapsed).is_empty());
        assert!(machine.handle(SessionInput::ModelActivity).is_empty());
        assert_eq!(machine.state(), ConnectionState::Connecting);
    }
}
