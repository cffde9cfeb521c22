//! CLI configuration and lesson loading.
//!
//! Settings come from `~/.config/fala/config.toml` (or `--config`). The API key
//! can be overridden by `GEMINI_API_KEY` / `GOOGLE_API_KEY` and the model by
//! `FALA_MODEL`; command-line flags win over both.

use crate::cli::LessonArgs;
use anyhow::{Context, Result};
use fala_core::{Cefr, LessonContext, Level, Step, StepKind, Subject, UserProfile};
use fala_realtime::SessionConfig;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub api_key: Option<String>,
    /// Alternative live endpoint URL.
    pub endpoint: Option<String>,
    pub log_format: Option<String>,
    pub session: SessionConfig,
}

impl CliConfig {
    /// Default config location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fala").join("config.toml"))
    }

    /// Load from `path`, or from the default path when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    let mut config = Self::default();
                    config.apply_env();
                    return Ok(config);
                }
            },
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config =
            Self::parse(&raw).with_context(|| format!("Invalid config {}", path.display()))?;
        config.apply_env();
        Ok(config)
    }

    /// Overlay `FALA_MODEL` on the configured model.
    pub fn apply_env(&mut self) {
        if let Ok(model) = std::env::var("FALA_MODEL") {
            if !model.trim().is_empty() {
                self.session.model = model;
            }
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.session.validate()?;
        Ok(config)
    }

    /// API key from the environment, falling back to the config file.
    pub fn api_key(&self) -> Result<SecretString> {
        std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .ok()
            .or_else(|| self.api_key.clone())
            .map(SecretString::from)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "GEMINI_API_KEY or GOOGLE_API_KEY not set and no api_key in the config file"
                )
            })
    }
}

#[derive(Debug, Deserialize)]
struct LessonFile {
    profile: UserProfile,
    level: Level,
    subject: Subject,
    step: Step,
}

/// Parse a lesson TOML document.
pub fn parse_lesson(raw: &str) -> Result<LessonContext> {
    let file: LessonFile = toml::from_str(raw)?;
    Ok(LessonContext::new(file.profile, file.level, file.subject, file.step)?)
}

/// Build the lesson selected on the command line.
pub fn lesson_from_args(args: &LessonArgs) -> Result<LessonContext> {
    if let Some(path) = &args.lesson_file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lesson {}", path.display()))?;
        return parse_lesson(&raw);
    }

    let mut profile = UserProfile::new(&args.name, &args.native_language);
    if let Some(goal) = &args.goal {
        profile = profile.with_goal(goal);
    }
    let cefr = args.cefr.parse::<Cefr>()?;
    let level = Level::new(args.cefr.to_ascii_lowercase(), args.cefr.to_ascii_uppercase(), cefr);
    let subject = Subject::new(slug(&args.subject), &args.subject);
    let kind = args.kind.parse::<StepKind>()?;
    let mut step = Step::new(slug(&args.step), &args.step, kind, &args.objective);
    for item in &args.focus {
        step = step.with_focus(item);
    }
    Ok(LessonContext::new(profile, level, subject, step)?)
}

/// Read the custom template, if one was given.
pub fn template_from_args(args: &LessonArgs) -> Result<Option<String>> {
    args.template
        .as_ref()
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read template {}", path.display()))
        })
        .transpose()
}

fn slug(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        assert_eq!(slug("At the café"), "at-the-café");
        assert_eq!(slug("  Ordering   coffee! "), "ordering-coffee");
    }
}
