//! # fala-cli
//!
//! Command-line runner for fala voice lessons.
//!
//! ## Overview
//!
//! - `fala personas` - coach persona and voice per step kind
//! - `fala instruction` - render the system instruction for a lesson
//! - `fala lesson` - run a lesson against the Gemini Live endpoint, from a WAV
//!   recording or (with the `desktop-audio` feature) the system microphone
//!
//! ## Quick Start
//!
//! ```text
//! export GEMINI_API_KEY=...
//! fala lesson --name Ana --kind speaking --input hello.wav --output coach.wav
//! ```

pub mod cli;
pub mod config;
pub mod console;
pub mod mixer;
pub mod resample;
pub mod wav;

#[cfg(feature = "desktop-audio")]
pub mod desktop;

use anyhow::{Context, Result};
use cli::{Cli, Commands, LessonArgs};
use config::{CliConfig, lesson_from_args, template_from_args};
use fala_core::{LessonBrief, StepKind, persona_for};
use fala_realtime::gemini::GeminiConnector;
use fala_realtime::{AudioOutput, LessonSession, MicGate, Microphone, SessionOutcome};
use std::path::PathBuf;

/// One line per step kind: kind, coach, voice.
pub fn persona_table() -> Vec<String> {
    StepKind::ALL
        .iter()
        .map(|kind| {
            let persona = persona_for(*kind);
            format!("{:<14} {:<18} {}", kind.as_str(), persona.name, persona.voice)
        })
        .collect()
}

/// Render the brief for the selected lesson.
pub fn brief_for(args: &LessonArgs) -> Result<LessonBrief> {
    let lesson = lesson_from_args(args)?;
    let brief = match template_from_args(args)? {
        Some(template) => LessonBrief::with_template(&lesson, &template)?,
        None => LessonBrief::for_lesson(&lesson)?,
    };
    Ok(brief)
}

/// Execute a parsed command line.
pub async fn run(cli: Cli, config: CliConfig) -> Result<()> {
    match cli.command {
        Commands::Personas => {
            for line in persona_table() {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::Instruction { lesson } => {
            let brief = brief_for(&lesson)?;
            println!("# {} ({})\n", brief.persona.name, brief.voice());
            println!("{}", brief.instruction);
            Ok(())
        }
        Commands::Lesson { lesson, input, output, desktop, model, muted } => {
            run_lesson(config, LessonRun { lesson, input, output, desktop, model, muted }).await
        }
    }
}

struct LessonRun {
    lesson: LessonArgs,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    desktop: bool,
    model: Option<String>,
    muted: bool,
}

type Devices = (Box<dyn Microphone>, Box<dyn AudioOutput>);

fn devices(run: &LessonRun, output_rate: u32) -> Result<Devices> {
    if run.desktop {
        #[cfg(feature = "desktop-audio")]
        {
            let speaker = desktop::CpalSpeaker::open()?;
            return Ok((Box::new(desktop::CpalMicrophone), Box::new(speaker)));
        }
        #[cfg(not(feature = "desktop-audio"))]
        anyhow::bail!("--desktop requires building with the desktop-audio feature");
    }

    let input = run.input.as_ref().context("--input is required without --desktop")?;
    let output = run.output.as_ref().context("--output is required without --desktop")?;
    let microphone = wav::WavMicrophone::open(input)?;
    let recorder = wav::WavRecorder::create(output, output_rate);
    Ok((Box::new(microphone), Box::new(recorder)))
}

async fn run_lesson(config: CliConfig, run: LessonRun) -> Result<()> {
    let lesson = lesson_from_args(&run.lesson)?;
    let title = lesson.step().title.clone();
    let mut session_config = config.session.clone();
    if let Some(model) = &run.model {
        session_config = session_config.with_model(model.clone());
    }

    let mut connector = GeminiConnector::new(config.api_key()?);
    if let Some(endpoint) = &config.endpoint {
        connector = connector.with_endpoint(endpoint.clone());
    }

    let (microphone, output) = devices(&run, session_config.output_sample_rate)?;
    let observer = console::ConsoleObserver::new(
        persona_for(lesson.step().kind).name,
        lesson.profile().name.clone(),
    );

    let mut builder = LessonSession::builder(lesson)
        .connector(connector)
        .microphone(microphone)
        .output(output)
        .config(session_config)
        .observer(observer)
        .mic_gate(MicGate::new(!run.muted));
    if let Some(template) = template_from_args(&run.lesson)? {
        builder = builder.template(template);
    }
    let session = builder.build()?;
    println!(
        "Starting '{}' with {} ({})",
        title,
        session.brief().persona.name,
        session.brief().voice()
    );

    let handle = session.start()?;
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    console::drive(&handle, stdin).await?;

    match handle.join().await {
        SessionOutcome::Completed | SessionOutcome::Disconnected => Ok(()),
        SessionOutcome::Failed(e) => Err(e).context("Voice session failed"),
    }
}
