//! Parsed actions and handler results.
//!
//! A parser (any component honoring the boundary contract) turns raw input
//! into a [`ParsedAction`]; command handlers consume actions and produce
//! [`HandlerResult`]s, which the turn processor wraps into a [`TurnReport`]
//! for the narrator.

use serde::{Deserialize, Serialize};
use skein_data::{ActorId, Value};

/// A noun as the parser saw it: the primary word plus any synonyms the
/// vocabulary knows for it. Unknown nouns pass through with no synonyms —
/// the handler owns the "you don't see any X" failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordRef {
    pub word: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl WordRef {
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            synonyms: Vec::new(),
        }
    }

    pub fn with_synonyms(word: impl Into<String>, synonyms: &[&str]) -> Self {
        Self {
            word: word.into(),
            synonyms: synonyms.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Every word form, primary first.
    pub fn forms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.word.as_str()).chain(self.synonyms.iter().map(String::as_str))
    }
}

/// One parsed player (or NPC) command.
///
/// Every handler reads the acting actor from `actor_id` rather than
/// assuming the player; that single convention is what lets the same
/// handlers drive NPC turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedAction {
    pub verb: String,
    #[serde(default)]
    pub object: Option<WordRef>,
    #[serde(default)]
    pub adjective: Option<String>,
    #[serde(default)]
    pub indirect_object: Option<WordRef>,
    #[serde(default)]
    pub indirect_adjective: Option<String>,
    #[serde(default)]
    pub preposition: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub raw_input: String,
    /// Who is acting. Defaults to the player when built by the parser.
    #[serde(default = "ActorId::player")]
    pub actor_id: ActorId,
}

impl ParsedAction {
    /// Shorthand for building actions in handlers' tests and NPC drivers.
    pub fn of_verb(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            actor_id: ActorId::player(),
            ..Self::default()
        }
    }

    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(WordRef::new(object));
        self
    }

    pub fn with_indirect(mut self, indirect: impl Into<String>) -> Self {
        self.indirect_object = Some(WordRef::new(indirect));
        self
    }

    pub fn with_actor(mut self, actor_id: ActorId) -> Self {
        self.actor_id = actor_id;
        self
    }
}

/// Narration context attached to a handler result: entity identity, trait
/// metadata for the narrator, and any structured payload (inventory
/// listings, visible items).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrationData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub llm_context: Option<Value>,
    #[serde(default)]
    pub posture: Option<String>,
    #[serde(default)]
    pub items: Vec<Value>,
}

impl NarrationData {
    /// Capture id + llm_context for a single entity.
    pub fn for_entity(id: impl Into<String>, llm_context: Option<&Value>) -> Self {
        Self {
            id: Some(id.into()),
            llm_context: llm_context.cloned(),
            ..Self::default()
        }
    }
}

/// What a command handler hands back: a success flag, the main narration
/// beat, optional secondary beats, and optional narration data.
///
/// A failed result is normal gameplay ("the door is locked"), never an
/// engine error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerResult {
    pub success: bool,
    pub primary: String,
    #[serde(default)]
    pub secondary_beats: Vec<String>,
    #[serde(default)]
    pub data: Option<NarrationData>,
}

impl HandlerResult {
    pub fn success(primary: impl Into<String>) -> Self {
        Self {
            success: true,
            primary: primary.into(),
            ..Self::default()
        }
    }

    pub fn failure(primary: impl Into<String>) -> Self {
        Self {
            success: false,
            primary: primary.into(),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: NarrationData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_beat(mut self, beat: impl Into<String>) -> Self {
        self.secondary_beats.push(beat.into());
        self
    }

    /// Append a behavior-contributed message after the handler's own.
    pub fn append(mut self, extra: &str) -> Self {
        if extra.is_empty() {
            return self;
        }
        if self.primary.is_empty() {
            self.primary = extra.to_string();
        } else {
            self.primary = format!("{} {extra}", self.primary);
        }
        self
    }
}

/// Narration verbosity hint, attached per verb in vocabulary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    #[default]
    Full,
    Brief,
}

/// The per-turn envelope handed to the narrator: the handler's narration
/// plus any beats produced by the turn phases (commitments, gossip,
/// regional effects, flee attempts).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnReport {
    pub action: String,
    pub success: bool,
    pub verbosity: Verbosity,
    pub narration: HandlerResult,
    #[serde(default)]
    pub phase_beats: Vec<String>,
    pub turn: u64,
}
