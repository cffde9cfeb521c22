//! Lesson selection handed to the voice session by onboarding and the lesson map.
//!
//! These types are read-only inputs: the session derives its system instruction
//! and coach voice from them once and never mutates them.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Learner profile collected during onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Display name used by the coach.
    pub name: String,
    /// Language the learner already speaks (e.g. "English").
    pub native_language: String,
    /// Why the learner is studying (travel, work, family...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    /// Free-form interests the coach can use for small talk.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,
}

impl UserProfile {
    pub fn new(name: impl Into<String>, native_language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native_language: native_language.into(),
            goal: None,
            interests: Vec::new(),
        }
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = Some(goal.into());
        self
    }

    pub fn with_interest(mut self, interest: impl Into<String>) -> Self {
        self.interests.push(interest.into());
        self
    }
}

/// CEFR proficiency band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Cefr {
    #[default]
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl Cefr {
    /// How the coach should pace its speech at this band.
    pub fn pacing_hint(&self) -> &'static str {
        match self {
            Self::A1 | Self::A2 => {
                "Speak slowly, use short sentences and very common words, and repeat key phrases."
            }
            Self::B1 | Self::B2 => {
                "Speak at a moderate pace, introduce new vocabulary in context and ask open questions."
            }
            Self::C1 | Self::C2 => {
                "Speak naturally at native pace, use idioms and push for nuance and precision."
            }
        }
    }
}

impl fmt::Display for Cefr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::B1 => "B1",
            Self::B2 => "B2",
            Self::C1 => "C1",
            Self::C2 => "C2",
        };
        f.write_str(code)
    }
}

impl std::str::FromStr for Cefr {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A1" => Ok(Self::A1),
            "A2" => Ok(Self::A2),
            "B1" => Ok(Self::B1),
            "B2" => Ok(Self::B2),
            "C1" => Ok(Self::C1),
            "C2" => Ok(Self::C2),
            other => Err(CoreError::Lesson(format!("unknown proficiency level '{}'", other))),
        }
    }
}

/// Proficiency level on the lesson map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub id: String,
    pub title: String,
    pub cefr: Cefr,
}

impl Level {
    pub fn new(id: impl Into<String>, title: impl Into<String>, cefr: Cefr) -> Self {
        Self { id: id.into(), title: title.into(), cefr }
    }
}

/// A themed unit inside a level ("At the café", "Travel").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl Subject {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self { id: id.into(), title: title.into(), description: String::new() }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Pedagogical type of a step. Selects the coach persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Vocabulary,
    Grammar,
    #[default]
    Speaking,
    Listening,
    Pronunciation,
    Culture,
}

impl StepKind {
    pub const ALL: [StepKind; 6] = [
        Self::Vocabulary,
        Self::Grammar,
        Self::Speaking,
        Self::Listening,
        Self::Pronunciation,
        Self::Culture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vocabulary => "vocabulary",
            Self::Grammar => "grammar",
            Self::Speaking => "speaking",
            Self::Listening => "listening",
            Self::Pronunciation => "pronunciation",
            Self::Culture => "culture",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        StepKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::Lesson(format!("unknown step kind '{}'", s)))
    }
}

/// One node on the lesson map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub title: String,
    pub kind: StepKind,
    /// What the learner should be able to do at the end of the step.
    pub objective: String,
    /// Target words or structures to practise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub focus: Vec<String>,
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        kind: StepKind,
        objective: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
            objective: objective.into(),
            focus: Vec::new(),
        }
    }

    pub fn with_focus(mut self, item: impl Into<String>) -> Self {
        self.focus.push(item.into());
        self
    }
}

/// Immutable lesson selection: learner, level, subject and step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonContext {
    profile: UserProfile,
    level: Level,
    subject: Subject,
    step: Step,
}

impl LessonContext {
    /// Build a lesson context, rejecting selections the coach cannot teach.
    pub fn new(profile: UserProfile, level: Level, subject: Subject, step: Step) -> Result<Self> {
        if profile.name.trim().is_empty() {
            return Err(CoreError::Lesson("learner name is empty".to_string()));
        }
        if step.objective.trim().is_empty() {
            return Err(CoreError::Lesson(format!("step '{}' has no objective", step.id)));
        }
        Ok(Self { profile, level, subject, step })
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    /// Stable identifier for logs: `level/subject/step`.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.level.id, self.subject.id, self.step.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (UserProfile, Level, Subject, Step) {
        (
            UserProfile::new("Ana", "English"),
            Level::new("a1", "Beginner", Cefr::A1),
            Subject::new("cafe", "At the café"),
            Step::new("order", "Ordering coffee", StepKind::Speaking, "Order a coffee politely"),
        )
    }

    #[test]
    fn test_lesson_context_key() {
        let (p, l, s, st) = sample();
        let ctx = LessonContext::new(p, l, s, st).unwrap();
        assert_eq!(ctx.key(), "a1/cafe/order");
    }

    #[test]
    fn test_lesson_context_rejects_empty_objective() {
        let (p, l, s, mut st) = sample();
        st.objective = "  ".to_string();
        assert!(LessonContext::new(p, l, s, st).is_err());
    }

    #[test]
    fn test_lesson_context_rejects_empty_name() {
        let (mut p, l, s, st) = sample();
        p.name.clear();
        assert!(LessonContext::new(p, l, s, st).is_err());
    }

    #[test]
    fn test_step_kind_parse() {
        assert_eq!("Grammar".parse::<StepKind>().unwrap(), StepKind::Grammar);
        assert_eq!(" culture ".parse::<StepKind>().unwrap(), StepKind::Culture);
        assert!("dancing".parse::<StepKind>().is_err());
    }

    #[test]
    fn test_cefr_parse_and_display() {
        let level: Cefr = "b2".parse().unwrap();
        assert_eq!(level, Cefr::B2);
        assert_eq!(level.to_string(), "B2");
        assert!("D1".parse::<Cefr>().is_err());
    }

    #[test]
    fn test_profile_serde_camel_case() {
        let profile = UserProfile::new("Ana", "English").with_goal("travel");
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["nativeLanguage"], "English");
        assert_eq!(json["goal"], "travel");
        assert!(json.get("interests").is_none());
    }
}
