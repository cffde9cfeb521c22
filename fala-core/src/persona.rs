//! Coach personas.
//!
//! Every step kind maps to one fixed coach character and a prebuilt voice of
//! the live model. The mapping is total: there is no "default" persona.

use crate::lesson::StepKind;
use serde::Serialize;

/// A coach character with its synthetic voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Persona {
    /// Character name the coach introduces itself with.
    pub name: &'static str,
    /// Prebuilt voice identity on the live endpoint.
    pub voice: &'static str,
    /// One-line teaching style injected into the system instruction.
    pub style: &'static str,
}

const SOFIA: Persona = Persona {
    name: "Sofia",
    voice: "Kore",
    style: "a warm, encouraging vocabulary coach who loves vivid examples and quick recall games",
};

const OTAVIO: Persona = Persona {
    name: "Professor Otávio",
    voice: "Charon",
    style: "a patient grammar teacher who explains one rule at a time and corrects gently",
};

const LUCAS: Persona = Persona {
    name: "Lucas",
    voice: "Puck",
    style: "an upbeat conversation partner who keeps the learner talking with open questions",
};

const MARINA: Persona = Persona {
    name: "Marina",
    voice: "Aoede",
    style: "a calm storyteller who reads short passages aloud and checks understanding",
};

const BEATRIZ: Persona = Persona {
    name: "Beatriz",
    voice: "Kore",
    style: "a precise pronunciation coach who models sounds and asks the learner to repeat",
};

const RAFAEL: Persona = Persona {
    name: "Rafael",
    voice: "Fenrir",
    style: "a curious local guide who shares customs, food and music from Brazil and Portugal",
};

/// Persona assigned to a step kind.
pub fn persona_for(kind: StepKind) -> Persona {
    match kind {
        StepKind::Vocabulary => SOFIA,
        StepKind::Grammar => OTAVIO,
        StepKind::Speaking => LUCAS,
        StepKind::Listening => MARINA,
        StepKind::Pronunciation => BEATRIZ,
        StepKind::Culture => RAFAEL,
    }
}
