//! Plan lifecycle state machine
//!
//! The session actor owns the canonical state of one plan (the plan
//! record, pending approval, message log, pending clarification, and
//! streaming buffer) and mutates it only in response to bus events and
//! user commands. Everything else reads a [`SessionSnapshot`] projection.

mod core;
mod effects;
mod state;

pub use core::{PlanSession, SessionHandle};
pub use effects::{LogEffects, ToastKind, UiEffects};
pub use state::{SessionFlags, SessionPhase, SessionSnapshot};
