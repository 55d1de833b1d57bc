//! Restart orchestrator
//!
//! The state machine (`state`) decides, the runtime (`runtime`) acts.

pub mod runtime;
pub mod state;

pub use runtime::RestartOrchestrator;
pub use state::{transition, Action, Effect, Phase, RestartState, RunResult, RunVerdict, Trigger};
