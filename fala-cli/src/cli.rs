use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fala")]
#[command(about = "Portuguese voice lessons with a live AI coach", long_about = None)]
pub struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output: pretty or json
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the coach persona for every step kind
    Personas,

    /// Print the system instruction a lesson would be opened with
    Instruction {
        #[command(flatten)]
        lesson: LessonArgs,
    },

    /// Run a voice lesson
    Lesson {
        #[command(flatten)]
        lesson: LessonArgs,

        /// Stream this WAV file as the learner's microphone
        #[arg(long, required_unless_present = "desktop")]
        input: Option<PathBuf>,

        /// Record the coach's audio to this WAV file
        #[arg(long, required_unless_present = "desktop")]
        output: Option<PathBuf>,

        /// Use the system microphone and speakers
        #[arg(long)]
        desktop: bool,

        /// Override the live model
        #[arg(long)]
        model: Option<String>,

        /// Start with the microphone muted
        #[arg(long)]
        muted: bool,
    },
}

/// Lesson selection, from a TOML file or individual flags.
#[derive(Args, Debug, Clone)]
pub struct LessonArgs {
    /// Lesson file with [profile], [level], [subject] and [step] tables
    #[arg(long, short = 'l')]
    pub lesson_file: Option<PathBuf>,

    /// Instruction template overriding the built-in one
    #[arg(long)]
    pub template: Option<PathBuf>,

    #[arg(long, default_value = "Learner")]
    pub name: String,

    #[arg(long, default_value = "English")]
    pub native_language: String,

    #[arg(long)]
    pub goal: Option<String>,

    /// CEFR band (A1..C2)
    #[arg(long, default_value = "A1")]
    pub cefr: String,

    #[arg(long, default_value = "At the café")]
    pub subject: String,

    /// Step kind: vocabulary, grammar, speaking, listening, pronunciation or culture
    #[arg(long, default_value = "speaking")]
    pub kind: String,

    #[arg(long, default_value = "Ordering coffee")]
    pub step: String,

    #[arg(long, default_value = "Order a drink and a snack politely")]
    pub objective: String,

    /// Words or structures to practise (repeatable)
    #[arg(long = "focus")]
    pub focus: Vec<String>,
}
