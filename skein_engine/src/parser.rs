//! The reference table-driven parser.
//!
//! Any component that turns a string plus a [`ParserContext`] into a
//! [`ParsedAction`] can stand in for this one; the engine only depends on
//! the boundary. This implementation tokenizes against the merged
//! vocabulary: the verb must be known (unknown verbs are parser errors),
//! nouns pass through unknown (handlers own "you don't see any X"),
//! adjectives are whatever qualifies the noun, and a bare direction word
//! reads as movement.

use crate::action::{ParsedAction, WordRef};
use crate::vocab::MergedVocabulary;

use skein_data::ActorId;

const ARTICLES: &[&str] = &["a", "an", "the", "some"];

/// What the acting actor can currently see; handed to the parser so
/// alternative implementations can resolve context-dependent phrasing.
/// This table-driven parser only consults `exits` (for named-exit
/// directions); the entity ids ride along for richer parsers.
#[derive(Debug, Clone, Default)]
pub struct ParserContext {
    pub location_objects: Vec<String>,
    pub inventory: Vec<String>,
    pub exits: Vec<String>,
}

/// Tokenizing parser over the merged vocabulary table.
pub struct Parser<'a> {
    vocabulary: &'a MergedVocabulary,
}

impl<'a> Parser<'a> {
    pub fn new(vocabulary: &'a MergedVocabulary) -> Self {
        Self { vocabulary }
    }

    /// Parse one command. `None` means unparseable (empty input or a verb
    /// no module defines).
    pub fn parse(&self, input: &str, context: &ParserContext) -> Option<ParsedAction> {
        let lowered = input.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split_whitespace()
            .filter(|token| !ARTICLES.contains(token))
            .collect();
        let (first, rest) = tokens.split_first()?;

        // a bare direction is movement — unless the word is also a verb
        // ("down" unwinds a climb before it means descent)
        let Some(verb) = self.vocabulary.resolve_verb(first) else {
            if self.is_direction(first, context) && rest.is_empty() {
                return Some(ParsedAction {
                    verb: "go".to_string(),
                    direction: Some((*first).to_string()),
                    raw_input: input.to_string(),
                    actor_id: ActorId::player(),
                    ..ParsedAction::default()
                });
            }
            return None;
        };
        let mut action = ParsedAction {
            verb: verb.word.clone(),
            raw_input: input.to_string(),
            actor_id: ActorId::player(),
            ..ParsedAction::default()
        };

        // movement verbs take a direction straight away
        if action.verb == "go" {
            if let Some(direction) = rest.first().filter(|t| self.is_direction(t, context)) {
                action.direction = Some((*direction).to_string());
                return Some(action);
            }
        }

        // split the remainder at the first preposition
        let preposition_at = rest.iter().position(|token| self.vocabulary.is_preposition(token));
        let (direct, indirect) = match preposition_at {
            Some(at) => {
                action.preposition = Some(rest[at].to_string());
                (&rest[..at], &rest[at + 1..])
            },
            None => (rest, &[][..]),
        };

        if let Some((word, adjective)) = self.noun_phrase(direct) {
            action.object = Some(word);
            action.adjective = adjective;
        }
        if let Some((word, adjective)) = self.noun_phrase(indirect) {
            action.indirect_object = Some(word);
            action.indirect_adjective = adjective;
        }
        Some(action)
    }

    fn is_direction(&self, token: &str, context: &ParserContext) -> bool {
        self.vocabulary.is_direction(token) || context.exits.iter().any(|exit| exit == token)
    }

    /// Last token is the noun; anything before it qualifies as an
    /// adjective (declared adjectives and unknown words alike).
    fn noun_phrase(&self, tokens: &[&str]) -> Option<(WordRef, Option<String>)> {
        let (noun, qualifiers) = tokens.split_last()?;
        let word = match self.vocabulary.noun(noun) {
            Some(known) => WordRef {
                word: known.word.clone(),
                synonyms: known.synonyms.clone(),
            },
            None => WordRef::new(*noun),
        };
        let adjective = qualifiers.first().map(|adj| (*adj).to_string());
        Some((word, adjective))
    }
}
