// Reaction toggle state machine.
//
// Pure transitions over a document's reaction list, kept free of I/O
// so the three states (no bucket, bucket without user, bucket with
// user) can be tested directly. The handler in fanout.rs wraps this in
// the load/persist/broadcast cycle.

use huddle_common::types::Reaction;
use uuid::Uuid;

/// What a toggle did to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The user's reaction was added (new bucket or joined an existing one).
    Added,
    /// The user's reaction was removed; the bucket is dropped when it
    /// empties.
    Removed,
}

/// Toggle `user_id`'s reaction for `emoji`.
///
/// - no bucket for the emoji → create `{emoji, reactedToBy: [user]}`
/// - bucket exists, user absent → append the user
/// - bucket exists, user present → remove the user, dropping the
///   bucket entirely once `reactedToBy` is empty
pub fn toggle_reaction(reactions: &mut Vec<Reaction>, emoji: &str, user_id: Uuid) -> ToggleOutcome {
    let Some(index) = reactions.iter().position(|r| r.emoji == emoji) else {
        reactions.push(Reaction { emoji: emoji.to_string(), reacted_to_by: vec![user_id] });
        return ToggleOutcome::Added;
    };

    let bucket = &mut reactions[index];
    if let Some(position) = bucket.reacted_to_by.iter().position(|u| *u == user_id) {
        bucket.reacted_to_by.remove(position);
        if bucket.reacted_to_by.is_empty() {
            reactions.remove(index);
        }
        ToggleOutcome::Removed
    } else {
        bucket.reacted_to_by.push(user_id);
        ToggleOutcome::Added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_for<'a>(reactions: &'a [Reaction], emoji: &str) -> Option<&'a [Uuid]> {
        reactions.iter().find(|r| r.emoji == emoji).map(|r| r.reacted_to_by.as_slice())
    }

    #[test]
    fn first_toggle_creates_the_bucket() {
        let mut reactions = Vec::new();
        let alice = Uuid::new_v4();

        assert_eq!(toggle_reaction(&mut reactions, "👍", alice), ToggleOutcome::Added);
        assert_eq!(users_for(&reactions, "👍"), Some(&[alice][..]));
    }

    #[test]
    fn second_user_joins_the_existing_bucket() {
        let mut reactions = Vec::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        toggle_reaction(&mut reactions, "👍", alice);
        assert_eq!(toggle_reaction(&mut reactions, "👍", bob), ToggleOutcome::Added);
        assert_eq!(users_for(&reactions, "👍"), Some(&[alice, bob][..]));
        assert_eq!(reactions.len(), 1);
    }

    #[test]
    fn toggle_off_removes_user_and_prunes_empty_bucket() {
        let mut reactions = Vec::new();
        let alice = Uuid::new_v4();

        toggle_reaction(&mut reactions, "👍", alice);
        assert_eq!(toggle_reaction(&mut reactions, "👍", alice), ToggleOutcome::Removed);
        assert!(reactions.is_empty());
    }

    #[test]
    fn toggle_off_keeps_bucket_with_remaining_reactors() {
        let mut reactions = Vec::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        toggle_reaction(&mut reactions, "👍", alice);
        toggle_reaction(&mut reactions, "👍", bob);
        toggle_reaction(&mut reactions, "👍", alice);
        assert_eq!(users_for(&reactions, "👍"), Some(&[bob][..]));
    }

    #[test]
    fn distinct_emojis_get_distinct_buckets() {
        let mut reactions = Vec::new();
        let alice = Uuid::new_v4();

        toggle_reaction(&mut reactions, "👍", alice);
        toggle_reaction(&mut reactions, "🎉", alice);
        assert_eq!(reactions.len(), 2);
        assert_eq!(users_for(&reactions, "🎉"), Some(&[alice][..]));
    }

    #[test]
    fn final_state_reflects_each_users_last_action() {
        let mut reactions = Vec::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let carol = Uuid::new_v4();

        // alice: on, off. bob: on. carol: on, off, on.
        toggle_reaction(&mut reactions, "👍", alice);
        toggle_reaction(&mut reactions, "👍", bob);
        toggle_reaction(&mut reactions, "👍", carol);
        toggle_reaction(&mut reactions, "👍", alice);
        toggle_reaction(&mut reactions, "👍", carol);
        toggle_reaction(&mut reactions, "👍", carol);

        assert_eq!(users_for(&reactions, "👍"), Some(&[bob, carol][..]));
    }

    #[test]
    fn no_empty_bucket_survives_any_toggle_sequence() {
        let mut reactions = Vec::new();
        let users: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let emojis = ["👍", "🎉", "👀"];

        // Deterministic pseudo-random walk over (emoji, user) pairs.
        for step in 0..200u64 {
            let emoji = emojis[(step % 3) as usize];
            let user = users[((step * 7 + 3) % 4) as usize];
            toggle_reaction(&mut reactions, emoji, user);
            assert!(
                reactions.iter().all(|r| !r.reacted_to_by.is_empty()),
                "empty bucket left behind at step {step}"
            );
        }
    }
}
