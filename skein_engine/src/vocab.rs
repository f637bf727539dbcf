//! Vocabulary tables and merge rules.
//!
//! Every behavior module may contribute vocabulary: verbs (with synonyms,
//! object requirements, and the event they fire), nouns, adjectives,
//! prepositions, directions, and event declarations. The manager merges
//! all contributions into one table — the sole truth fed to parsers. A
//! verb no module defines is unknown to the parser and never reaches the
//! core.

use crate::action::Verbosity;
use serde::{Deserialize, Serialize};
use skein_data::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// A verb contributed by a behavior module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerbDef {
    pub word: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub object_required: bool,
    /// Event fired on the target entity when this verb mutates it.
    #[serde(default)]
    pub event: Option<String>,
    /// Event used when the primary event has no takers (put → drop).
    #[serde(default)]
    pub fallback_event: Option<String>,
    #[serde(default)]
    pub narration_mode: Verbosity,
    /// Trait metadata for downstream narration.
    #[serde(default)]
    pub llm_context: Value,
}

impl VerbDef {
    pub fn new(word: &str) -> Self {
        Self {
            word: word.to_string(),
            ..Self::default()
        }
    }

    pub fn with_synonyms(mut self, synonyms: &[&str]) -> Self {
        self.synonyms = synonyms.iter().map(|s| (*s).to_string()).collect();
        self
    }

    pub fn requires_object(mut self) -> Self {
        self.object_required = true;
        self
    }

    pub fn fires(mut self, event: &str) -> Self {
        self.event = Some(event.to_string());
        self
    }

    pub fn falls_back_to(mut self, event: &str) -> Self {
        self.fallback_event = Some(event.to_string());
        self
    }

    pub fn brief(mut self) -> Self {
        self.narration_mode = Verbosity::Brief;
        self
    }

    /// Everything except synonyms; two modules may re-declare a verb only
    /// when this matches, and their synonyms union.
    fn metadata_matches(&self, other: &VerbDef) -> bool {
        self.object_required == other.object_required
            && self.event == other.event
            && self.fallback_event == other.fallback_event
            && self.narration_mode == other.narration_mode
    }
}

/// A noun (or adjective) with synonyms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NounDef {
    pub word: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl NounDef {
    pub fn new(word: &str) -> Self {
        Self {
            word: word.to_string(),
            synonyms: Vec::new(),
        }
    }

    pub fn with_synonyms(mut self, synonyms: &[&str]) -> Self {
        self.synonyms = synonyms.iter().map(|s| (*s).to_string()).collect();
        self
    }
}

/// A declared event name, for dispatchers that fire without a verb.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDef {
    pub event: String,
    #[serde(default)]
    pub description: String,
}

/// One module's vocabulary contribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    #[serde(default)]
    pub verbs: Vec<VerbDef>,
    #[serde(default)]
    pub nouns: Vec<NounDef>,
    #[serde(default)]
    pub adjectives: Vec<NounDef>,
    #[serde(default)]
    pub prepositions: Vec<String>,
    #[serde(default)]
    pub directions: Vec<String>,
    #[serde(default)]
    pub events: Vec<EventDef>,
}

/// A vocabulary contribution that cannot merge.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VocabError {
    #[error("verb '{word}' declared twice with conflicting metadata (by '{first}' and '{second}')")]
    ConflictingVerb {
        word: String,
        first: String,
        second: String,
    },
    #[error("word '{word}' from '{module}' is already a different verb's synonym or primary")]
    ConflictingSynonym { word: String, module: String },
    #[error("verb '{word}' from '{module}' has no registered handler")]
    MissingHandler { word: String, module: String },
    #[error("verb '{word}' already has a handler; '{module}' cannot register another")]
    DuplicateHandler { word: String, module: String },
}

/// Every module's vocabulary merged into one table, with the two routing
/// maps the dispatcher needs: any verb form → primary word → handler/event.
#[derive(Debug, Clone, Default)]
pub struct MergedVocabulary {
    verbs: BTreeMap<String, VerbDef>,
    /// any form (primary or synonym) → primary word
    verb_lookup: BTreeMap<String, String>,
    /// which module first declared each primary, for conflict messages
    declared_by: BTreeMap<String, String>,
    nouns: BTreeMap<String, NounDef>,
    adjectives: BTreeSet<String>,
    prepositions: BTreeSet<String>,
    directions: BTreeSet<String>,
    events: BTreeMap<String, EventDef>,
}

impl MergedVocabulary {
    /// Merge one module's contribution.
    pub fn absorb(&mut self, module: &str, vocab: &Vocabulary) -> Result<(), VocabError> {
        for verb in &vocab.verbs {
            self.absorb_verb(module, verb)?;
        }
        for noun in &vocab.nouns {
            let entry = self.nouns.entry(noun.word.clone()).or_insert_with(|| NounDef {
                word: noun.word.clone(),
                synonyms: Vec::new(),
            });
            for syn in &noun.synonyms {
                if !entry.synonyms.contains(syn) {
                    entry.synonyms.push(syn.clone());
                }
            }
        }
        for adjective in &vocab.adjectives {
            self.adjectives.insert(adjective.word.clone());
        }
        self.prepositions.extend(vocab.prepositions.iter().cloned());
        self.directions.extend(vocab.directions.iter().cloned());
        for event in &vocab.events {
            self.events.entry(event.event.clone()).or_insert_with(|| event.clone());
        }
        Ok(())
    }

    fn absorb_verb(&mut self, module: &str, verb: &VerbDef) -> Result<(), VocabError> {
        match self.verbs.get_mut(&verb.word) {
            Some(existing) => {
                if !existing.metadata_matches(verb) {
                    return Err(VocabError::ConflictingVerb {
                        word: verb.word.clone(),
                        first: self
                            .declared_by
                            .get(&verb.word)
                            .cloned()
                            .unwrap_or_default(),
                        second: module.to_string(),
                    });
                }
                // identical redeclaration: union the synonyms
                for syn in &verb.synonyms {
                    if !existing.synonyms.contains(syn) {
                        existing.synonyms.push(syn.clone());
                    }
                }
            },
            None => {
                // a new primary must not collide with any existing form
                if self.verb_lookup.contains_key(&verb.word) {
                    return Err(VocabError::ConflictingSynonym {
                        word: verb.word.clone(),
                        module: module.to_string(),
                    });
                }
                self.verbs.insert(verb.word.clone(), verb.clone());
                self.declared_by.insert(verb.word.clone(), module.to_string());
                self.verb_lookup.insert(verb.word.clone(), verb.word.clone());
            },
        }

        for syn in &verb.synonyms {
            match self.verb_lookup.get(syn) {
                Some(primary) if primary == &verb.word => {},
                Some(_) => {
                    return Err(VocabError::ConflictingSynonym {
                        word: syn.clone(),
                        module: module.to_string(),
                    });
                },
                None => {
                    self.verb_lookup.insert(syn.clone(), verb.word.clone());
                },
            }
        }
        Ok(())
    }

    /// Resolve any verb form to its definition.
    pub fn resolve_verb(&self, word: &str) -> Option<&VerbDef> {
        let primary = self.verb_lookup.get(word)?;
        self.verbs.get(primary)
    }

    /// The event a verb fires, synonym-aware.
    pub fn event_for_verb(&self, word: &str) -> Option<&str> {
        self.resolve_verb(word).and_then(|v| v.event.as_deref())
    }

    pub fn fallback_event_for_verb(&self, word: &str) -> Option<&str> {
        self.resolve_verb(word).and_then(|v| v.fallback_event.as_deref())
    }

    pub fn narration_mode(&self, word: &str) -> Verbosity {
        self.resolve_verb(word).map(|v| v.narration_mode).unwrap_or_default()
    }

    pub fn is_direction(&self, word: &str) -> bool {
        self.directions.contains(word)
    }

    pub fn is_preposition(&self, word: &str) -> bool {
        self.prepositions.contains(word)
    }

    pub fn is_adjective(&self, word: &str) -> bool {
        self.adjectives.contains(word)
    }

    /// Known-noun synonym expansion for the parser; matches primaries and
    /// synonyms. Unknown words get no entry and pass through.
    pub fn noun(&self, word: &str) -> Option<&NounDef> {
        self.nouns
            .get(word)
            .or_else(|| self.nouns.values().find(|noun| noun.synonyms.iter().any(|s| s == word)))
    }

    pub fn verbs(&self) -> impl Iterator<Item = &VerbDef> {
        self.verbs.values()
    }

    pub fn declared_event(&self, event: &str) -> bool {
        self.events.contains_key(event)
    }
}
