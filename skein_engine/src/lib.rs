#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

// Core modules
pub mod accessor;
pub mod action;
pub mod behavior;
pub mod behaviors_core;
pub mod commitments;
pub mod engine;
pub mod gossip;
pub mod handlers;
pub mod infra;
pub mod morale;
pub mod packs;
pub mod parser;
pub mod paths;
pub mod reactions;
pub mod rng;
pub mod search;
pub mod vocab;

// Re-exports for convenience
pub use accessor::{StateAccessor, UpdateResult};
pub use action::{HandlerResult, ParsedAction, TurnReport, Verbosity, WordRef};
pub use behavior::{BehaviorManager, EventContext, EventResult, Verdict};
pub use engine::GameEngine;
pub use parser::{Parser, ParserContext};
pub use rng::TurnRng;

/// The Skein engine version for the current build.
pub const SKEIN_VERSION: &str = env!("CARGO_PKG_VERSION");
