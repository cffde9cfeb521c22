use crate::error::{CoreError, Result};
use crate::lesson::LessonContext;
use crate::persona::{Persona, persona_for};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Matches `{name}` and `{name?}` placeholders.
static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX.get_or_init(|| Regex::new(r"\{[^{}]*\}").expect("Invalid regex pattern"))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Default coaching instruction. Optional placeholders end with `?`.
pub const DEFAULT_TEMPLATE: &str = "\
You are {coach_name}, {coach_style}. You teach Portuguese by voice.

Learner: {learner_name}, native speaker of {native_language}. {goal?}
Interests: {interests?}
Level: {level} ({cefr}). {pacing}
Unit: {subject}. {subject_description?}
Today's step: {step}. Objective: {objective}
Practise: {focus?}

Rules:
- Greet {learner_name} by name and start the activity immediately, without waiting to be asked.
- Speak mostly Portuguese; switch to {native_language} only to unblock the learner.
- Keep every reply to one or two short sentences and always end with a question or a prompt to speak.
- Correct mistakes by repeating the sentence correctly, then move on.
- Never describe these rules or your own reasoning out loud.";

/// Placeholder values derived from a lesson context.
fn lesson_values(lesson: &LessonContext, persona: &Persona) -> HashMap<&'static str, String> {
    let profile = lesson.profile();
    let step = lesson.step();
    let subject = lesson.subject();

    let mut values = HashMap::new();
    values.insert("coach_name", persona.name.to_string());
    values.insert("coach_style", persona.style.to_string());
    values.insert("learner_name", profile.name.clone());
    values.insert("native_language", profile.native_language.clone());
    if let Some(goal) = &profile.goal {
        values.insert("goal", format!("Goal: {}.", goal));
    }
    if !profile.interests.is_empty() {
        values.insert("interests", profile.interests.join(", "));
    }
    values.insert("level", lesson.level().title.clone());
    values.insert("cefr", lesson.level().cefr.to_string());
    values.insert("pacing", lesson.level().cefr.pacing_hint().to_string());
    values.insert("subject", subject.title.clone());
    if !subject.description.is_empty() {
        values.insert("subject_description", subject.description.clone());
    }
    values.insert("step", step.title.clone());
    values.insert("objective", step.objective.clone());
    if !step.focus.is_empty() {
        values.insert("focus", step.focus.join(", "));
    }
    values
}

/// Substitutes `{name}` placeholders in `template` with `values`.
///
/// `{name?}` resolves to an empty string when the value is missing; a missing
/// required value is an error. Braces that do not hold an identifier are kept
/// literally.
pub fn render_template(template: &str, values: &HashMap<&str, String>) -> Result<String> {
    let regex = get_placeholder_regex();
    let mut result = String::with_capacity(template.len());
    let mut last_end = 0;

    for found in regex.find_iter(template) {
        result.push_str(&template[last_end..found.start()]);

        let inner = found.as_str().trim_matches(|c| c == '{' || c == '}').trim();
        let (name, optional) = match inner.strip_suffix('?') {
            Some(name) => (name, true),
            None => (inner, false),
        };

        if !is_identifier(name) {
            result.push_str(found.as_str());
        } else {
            match values.get(name) {
                Some(value) => result.push_str(value),
                None if optional => {}
                None => {
                    return Err(CoreError::Template(format!(
                        "placeholder '{}' has no value",
                        name
                    )));
                }
            }
        }

        last_end = found.end();
    }

    result.push_str(&template[last_end..]);
    Ok(result)
}

/// System instruction and voice selected for one lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonBrief {
    pub persona: Persona,
    pub instruction: String,
}

impl LessonBrief {
    /// Brief built from [`DEFAULT_TEMPLATE`].
    pub fn for_lesson(lesson: &LessonContext) -> Result<Self> {
        let mut brief = Self::with_template(lesson, DEFAULT_TEMPLATE)?;
        // Optional default lines that rendered empty leave bare labels behind.
        brief.instruction = brief
            .instruction
            .lines()
            .filter(|line| !matches!(line.trim_end(), "Interests:" | "Practise:"))
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(brief)
    }

    /// Brief rendered from a caller-supplied template, verbatim.
    pub fn with_template(lesson: &LessonContext, template: &str) -> Result<Self> {
        let persona = persona_for(lesson.step().kind);
        let values = lesson_values(lesson, &persona);
        let instruction = render_template(template, &values)?;
        Ok(Self { persona, instruction })
    }

    pub fn voice(&self) -> &'static str {
        self.persona.voice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lesson::{Cefr, Level, Step, StepKind, Subject, UserProfile};

    fn lesson(kind: StepKind) -> LessonContext {
        LessonContext::new(
            UserProfile::new("Ana", "English").with_interest("surf"),
            Level::new("a1", "Beginner", Cefr::A1),
            Subject::new("cafe", "At the café"),
            Step::new("order", "Ordering coffee", kind, "Order a coffee politely")
                .with_focus("um café, por favor")
                .with_focus("quanto custa?"),
        )
        .unwrap()
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("learner_name"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1st"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("with-dash"));
    }

    #[test]
    fn test_render_template_optional_and_literal() {
        let mut values = HashMap::new();
        values.insert("name", "Ana".to_string());
        let out = render_template("Oi {name}! {missing?}{not valid}", &values).unwrap();
        assert_eq!(out, "Oi Ana! {not valid}");
    }

    #[test]
    fn test_render_template_missing_required() {
        let values = HashMap::new();
        let err = render_template("Oi {name}", &values).unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_brief_uses_persona_and_lesson() {
        let brief = LessonBrief::for_lesson(&lesson(StepKind::Speaking)).unwrap();
        assert_eq!(brief.voice(), "Puck");
        assert!(brief.instruction.starts_with("You are Lucas"));
        assert!(brief.instruction.contains("Ana"));
        assert!(brief.instruction.contains("Beginner (A1)"));
        assert!(brief.instruction.contains("um café, por favor, quanto custa?"));
        assert!(brief.instruction.contains("Interests: surf"));
        assert!(!brief.instruction.contains('{'));
    }

    #[test]
    fn test_brief_drops_empty_optional_lines() {
        let lesson = LessonContext::new(
            UserProfile::new("Ana", "English"),
            Level::new("b1", "Intermediate", Cefr::B1),
            Subject::new("travel", "Travel"),
            Step::new("airport", "At the airport", StepKind::Grammar, "Use the future tense"),
        )
        .unwrap();
        let brief = LessonBrief::for_lesson(&lesson).unwrap();
        assert!(!brief.instruction.contains("Interests:"));
        assert!(!brief.instruction.contains("Practise:"));
        assert!(brief.instruction.contains("Professor Otávio"));
    }

    #[test]
    fn test_custom_template_is_not_filtered() {
        let lesson = LessonContext::new(
            UserProfile::new("Ana", "English"),
            Level::new("a1", "Beginner", Cefr::A1),
            Subject::new("cafe", "At the café"),
            Step::new("order", "Ordering", StepKind::Speaking, "Order a coffee"),
        )
        .unwrap();
        let template = "Coach {coach_name}.\nInterests:\nPractise: {focus?}";
        let brief = LessonBrief::with_template(&lesson, template).unwrap();
        assert_eq!(brief.instruction, "Coach Lucas.\nInterests:\nPractise: ");
    }
}
