//! Terminal front end for a running lesson.

use async_trait::async_trait;
use fala_realtime::{ChatMessage, ConnectionState, Role, SessionHandle, SessionObserver, VoiceError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Prints finalized transcript lines and lifecycle changes.
#[derive(Debug, Clone)]
pub struct ConsoleObserver {
    coach: String,
    learner: String,
}

impl ConsoleObserver {
    pub fn new(coach: impl Into<String>, learner: impl Into<String>) -> Self {
        Self { coach: coach.into(), learner: learner.into() }
    }

    pub fn format_message(&self, message: &ChatMessage) -> String {
        let speaker = match message.role {
            Role::User => &self.learner,
            Role::Model => &self.coach,
        };
        format!("{}: {}", speaker, message.text.trim())
    }
}

#[async_trait]
impl SessionObserver for ConsoleObserver {
    async fn on_state_change(&self, state: ConnectionState) {
        println!("[{}]", state);
    }

    async fn on_message(&self, message: &ChatMessage) {
        println!("{}", self.format_message(message));
    }

    async fn on_complete(&self) {
        println!("Lesson complete. Parabéns!");
    }

    async fn on_disconnect(&self) {
        println!("Left the lesson.");
    }
}

/// Console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    ToggleMute,
    ResumeAudio,
    Complete,
    Quit,
    Help,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "m" | "mute" => Some(Self::ToggleMute),
            "r" | "resume" => Some(Self::ResumeAudio),
            "c" | "complete" => Some(Self::Complete),
            "q" | "quit" | "exit" => Some(Self::Quit),
            "h" | "help" | "?" => Some(Self::Help),
            _ => None,
        }
    }
}

pub const HELP: &str = "Commands: [m]ute, [r]esume audio, [c]omplete lesson, [q]uit";

/// Read commands from `input` until the lesson ends or input closes.
///
/// Returns when a complete or quit command was accepted, or on end of input
/// (which leaves the lesson).
pub async fn drive<R>(handle: &SessionHandle, input: R) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut updates = handle.subscribe();
    println!("{}", HELP);

    loop {
        tokio::select! {
            // Ends with the session, or when the session task is gone.
            _ = updates.wait_for(|s| s.state.is_terminal()) => return Ok(()),
            line = lines.next_line() => {
                let Some(line) = line? else {
                    handle.disconnect().await.ok();
                    return Ok(());
                };
                match ConsoleCommand::parse(&line) {
                    Some(ConsoleCommand::ToggleMute) => {
                        let muted = handle.toggle_mute();
                        println!("{}", if muted { "Microphone muted" } else { "Microphone live" });
                    }
                    Some(ConsoleCommand::ResumeAudio) => match handle.resume_audio().await {
                        Ok(()) => println!("Audio resumed"),
                        Err(e) => println!("Audio still suspended: {}", e),
                    },
                    Some(ConsoleCommand::Complete) => match handle.complete().await {
                        Ok(()) => return Ok(()),
                        Err(VoiceError::CompletionLocked { turns, required }) => {
                            println!("Keep talking: {} of {} turns done", turns, required);
                        }
                        Err(e) => return Err(e.into()),
                    },
                    Some(ConsoleCommand::Quit) => {
                        handle.disconnect().await.ok();
                        return Ok(());
                    }
                    Some(ConsoleCommand::Help) | None => println!("{}", HELP),
                }
            }
        }
    }
}
