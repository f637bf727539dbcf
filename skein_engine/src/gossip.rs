//! Gossip delivery.
//!
//! Queued gossip waits in `GameState::gossip_queue` until its turn comes
//! up, then lands on each target NPC through the dialog-reaction
//! dispatcher — hearing gossip is the same event as hearing the words
//! directly, so the same reaction configs answer both.

use crate::accessor::StateAccessor;
use crate::behavior::EventContext;

use log::info;
use skein_data::{EntityRef, Gossip};

/// Deliver every due gossip entry and drop it from the queue. Returns
/// narration beats from targets that reacted audibly.
pub fn deliver_gossip(accessor: &mut StateAccessor) -> Vec<String> {
    let now = accessor.current_turn();
    let due: Vec<Gossip> = accessor
        .state
        .gossip_queue
        .iter()
        .filter(|gossip| gossip.deliver_turn <= now)
        .cloned()
        .collect();
    if due.is_empty() {
        return Vec::new();
    }
    accessor.state.gossip_queue.retain(|gossip| gossip.deliver_turn > now);

    let mut beats = Vec::new();
    for gossip in due {
        info!(
            "delivering gossip '{}' to {} target(s) on turn {now}",
            gossip.id,
            gossip.targets.len()
        );
        for target in &gossip.targets {
            if accessor.get_actor(target).is_none() {
                continue;
            }
            let context = EventContext::default()
                .with_extra("keyword", gossip.content.as_str())
                .with_extra("source", gossip.source.as_str())
                .with_extra("gossip_id", gossip.id.as_str());
            let result = accessor.invoke_behavior(&EntityRef::Actor(target.clone()), "on_dialog_received", &context);
            if let Some(feedback) = result.feedback {
                beats.push(feedback);
            }
        }
    }
    beats
}
