//! # fala-core
//!
//! Lesson domain types shared by the fala voice-lesson crates.
//!
//! ## Overview
//!
//! - [`LessonContext`] - immutable learner/level/subject/step selection
//! - [`Persona`] / [`persona_for`] - fixed coach character and voice per [`StepKind`]
//! - [`LessonBrief`] - system instruction rendered from a lesson
//! - [`CoreError`] / [`Result`] - error handling
//!
//! ## Quick Start
//!
//! ```rust
//! use fala_core::{Cefr, LessonBrief, LessonContext, Level, Step, StepKind, Subject, UserProfile};
//!
//! let lesson = LessonContext::new(
//!     UserProfile::new("Ana", "English"),
//!     Level::new("a1", "Beginner", Cefr::A1),
//!     Subject::new("cafe", "At the café"),
//!     Step::new("order", "Ordering coffee", StepKind::Speaking, "Order a coffee politely"),
//! )?;
//!
//! let brief = LessonBrief::for_lesson(&lesson)?;
//! assert_eq!(brief.voice(), "Puck");
//! # Ok::<(), fala_core::CoreError>(())
//! ```

pub mod error;
pub mod instruction;
pub mod lesson;
pub mod persona;

pub use error::{CoreError, Result};
pub use instruction::{DEFAULT_TEMPLATE, LessonBrief, render_template};
pub use lesson::{Cefr, LessonContext, Level, Step, StepKind, Subject, UserProfile};
pub use persona::{Persona, persona_for};
