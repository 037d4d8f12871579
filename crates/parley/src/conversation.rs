//! Append-only conversation log.

use chrono::{DateTime, Utc};

use crate::turn::{NewTurn, Turn};

/// Ordered turns; insertion order is display order.
///
/// Entries are never reordered or removed individually. `clear()` empties the
/// whole log at once. Timestamps are assigned on admission and never go
/// backwards, even across a clear or a wall-clock step.
#[derive(Debug, Default, Clone)]
pub struct ConversationLog {
    turns: Vec<Turn>,
    high_water: Option<DateTime<Utc>>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a turn, returning a copy of the stored entry.
    pub fn append(&mut self, turn: NewTurn) -> Turn {
        self.append_at(turn, Utc::now())
    }

    pub(crate) fn append_at(&mut self, turn: NewTurn, now: DateTime<Utc>) -> Turn {
        let timestamp = match self.high_water {
            Some(last) if last > now => last,
            _ => now,
        };
        self.high_water = Some(timestamp);

        let turn = turn.admit(timestamp);
        self.turns.push(turn.clone());
        turn
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Empty the log. Returns how many turns were dropped.
    pub fn clear(&mut self) -> usize {
        let removed = self.turns.len();
        self.turns.clear();
        removed
    }
}

impl<'a> IntoIterator for &'a ConversationLog {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::turn::Author;

    #[test]
    fn append_preserves_insertion_order() {
        let mut log = ConversationLog::new();
        log.append(NewTurn::user("one"));
        log.append(NewTurn::assistant("two"));
        log.append(NewTurn::user("three"));

        let texts: Vec<_> = log.iter().map(Turn::text).collect();
        assert_eq!(texts, ["one", "two", "three"]);
        assert_eq!(log.last().map(Turn::author), Some(Author::User));
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let mut log = ConversationLog::new();
        let now = Utc::now();

        let first = log.append_at(NewTurn::user("a"), now);
        let second = log.append_at(NewTurn::assistant("b"), now - Duration::seconds(5));
        let third = log.append_at(NewTurn::user("c"), now + Duration::seconds(1));

        assert_eq!(first.timestamp(), now);
        assert_eq!(second.timestamp(), now);
        assert_eq!(third.timestamp(), now + Duration::seconds(1));
    }

    #[test]
    fn timestamps_stay_monotonic_across_clear() {
        let mut log = ConversationLog::new();
        let now = Utc::now();
        log.append_at(NewTurn::user("a"), now);
        log.clear();

        let after = log.append_at(NewTurn::user("b"), now - Duration::seconds(1));
        assert_eq!(after.timestamp(), now);
    }

    #[test]
    fn clear_empties_the_log() {
        let mut log = ConversationLog::new();
        log.append(NewTurn::user("a"));
        log.append(NewTurn::assistant("b"));

        assert_eq!(log.clear(), 2);
        assert!(log.is_empty());
        assert_eq!(log.clear(), 0);
    }

    #[test]
    fn turn_ids_are_unique() {
        let mut log = ConversationLog::new();
        let a = log.append(NewTurn::user("same"));
        let b = log.append(NewTurn::user("same"));
        assert_ne!(a.id(), b.id());
    }
}
