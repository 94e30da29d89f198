//! Sequence sets: the protocol's way of naming groups of messages.
//!
//! A set is interpreted against either sequence numbers or UIDs; the set
//! itself does not know which. `*` always means the highest value present
//! in the mailbox at resolution time.

use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A set of message references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSet {
    /// A single reference.
    Single(i64),
    /// An inclusive range (`a:b`). Ends may be given in either order.
    Range(i64, i64),
    /// Everything from a reference to the end of the mailbox (`n:*`).
    RangeFrom(i64),
    /// The highest reference in the mailbox (`*`).
    Last,
    /// A union of sets (`1,3:5,9:*`).
    Set(Vec<MessageSet>),
}

impl MessageSet {
    /// Expands the set against a mailbox whose highest reference is
    /// `last`, yielding concrete values in ascending order without
    /// duplicates.
    ///
    /// Range ends are clamped to `last` and `*` resolves to `last`.
    /// Explicit single references beyond `last` are kept; whether they
    /// mean anything is decided when they are resolved against the
    /// mailbox. With `last == 0` only such singles survive.
    #[must_use]
    pub fn expand(&self, last: i64) -> Vec<i64> {
        let mut out = BTreeSet::new();
        self.collect_into(last, &mut out);
        out.into_iter().collect()
    }

    fn collect_into(&self, last: i64, out: &mut BTreeSet<i64>) {
        match *self {
            Self::Single(n) => {
                if n >= 1 {
                    out.insert(n);
                }
            }
            Self::Range(a, b) => {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                for n in lo.max(1)..=hi.min(last) {
                    out.insert(n);
                }
            }
            Self::RangeFrom(start) => {
                for n in start.max(1)..=last {
                    out.insert(n);
                }
            }
            Self::Last => {
                if last >= 1 {
                    out.insert(last);
                }
            }
            Self::Set(ref items) => {
                for item in items {
                    item.collect_into(last, out);
                }
            }
        }
    }

    /// Whether `value` falls in the set, interpreted against a mailbox
    /// whose highest reference is `last`.
    ///
    /// Agrees with [`expand`](Self::expand) on every input without
    /// materializing ranges.
    #[must_use]
    pub fn contains(&self, value: i64, last: i64) -> bool {
        match *self {
            Self::Single(n) => n >= 1 && value == n,
            Self::Range(a, b) => {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                value >= lo.max(1) && value <= hi.min(last)
            }
            Self::RangeFrom(start) => value >= start.max(1) && value <= last,
            Self::Last => last >= 1 && value == last,
            Self::Set(ref items) => items.iter().any(|item| item.contains(value, last)),
        }
    }
}

impl FromStr for MessageSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = Vec::new();
        for piece in s.split(',') {
            parts.push(parse_part(piece.trim())?);
        }
        if parts.len() == 1 {
            Ok(parts.remove(0))
        } else {
            Ok(Self::Set(parts))
        }
    }
}

fn parse_part(part: &str) -> Result<MessageSet> {
    match part.split_once(':') {
        None => {
            if part == "*" {
                Ok(MessageSet::Last)
            } else {
                Ok(MessageSet::Single(parse_reference(part)?))
            }
        }
        Some(("*", "*")) => Ok(MessageSet::Last),
        Some(("*", n) | (n, "*")) => Ok(MessageSet::RangeFrom(parse_reference(n)?)),
        Some((a, b)) => Ok(MessageSet::Range(
            parse_reference(a)?,
            parse_reference(b)?,
        )),
    }
}

fn parse_reference(token: &str) -> Result<i64> {
    token
        .parse::<i64>()
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| Error::InvalidSet(format!("bad reference '{token}'")))
}

impl std::fmt::Display for MessageSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(a, b) => write!(f, "{a}:{b}"),
            Self::RangeFrom(start) => write!(f, "{start}:*"),
            Self::Last => write!(f, "*"),
            Self::Set(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_shape() {
        assert_eq!("7".parse::<MessageSet>().unwrap(), MessageSet::Single(7));
        assert_eq!(
            "2:5".parse::<MessageSet>().unwrap(),
            MessageSet::Range(2, 5)
        );
        assert_eq!(
            "3:*".parse::<MessageSet>().unwrap(),
            MessageSet::RangeFrom(3)
        );
        assert_eq!(
            "*:3".parse::<MessageSet>().unwrap(),
            MessageSet::RangeFrom(3)
        );
        assert_eq!("*".parse::<MessageSet>().unwrap(), MessageSet::Last);
        assert_eq!(
            "1,3:5,*".parse::<MessageSet>().unwrap(),
            MessageSet::Set(vec![
                MessageSet::Single(1),
                MessageSet::Range(3, 5),
                MessageSet::Last,
            ])
        );
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "0", "-3", "a", "1:", ":4", "1,,2", "1:2:3"] {
            assert!(bad.parse::<MessageSet>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn display_round_trips() {
        for text in ["7", "2:5", "3:*", "*", "1,3:5,9:*"] {
            let set: MessageSet = text.parse().unwrap();
            assert_eq!(set.to_string(), text);
        }
    }

    #[test]
    fn star_resolves_to_last() {
        assert_eq!(MessageSet::Last.expand(4), vec![4]);
        assert_eq!(MessageSet::RangeFrom(2).expand(4), vec![2, 3, 4]);
    }

    #[test]
    fn range_upper_end_is_clamped() {
        assert_eq!(MessageSet::Range(2, 100).expand(4), vec![2, 3, 4]);
        assert_eq!(MessageSet::Range(2, 100).expand(0), Vec::<i64>::new());
    }

    #[test]
    fn reversed_ranges_are_normalized() {
        assert_eq!(MessageSet::Range(5, 2).expand(10), vec![2, 3, 4, 5]);
    }

    #[test]
    fn explicit_singles_beyond_last_survive_expansion() {
        assert_eq!(MessageSet::Single(9).expand(4), vec![9]);
    }

    #[test]
    fn empty_mailbox_yields_nothing_for_star_shapes() {
        assert_eq!(MessageSet::Last.expand(0), Vec::<i64>::new());
        assert_eq!(MessageSet::RangeFrom(1).expand(0), Vec::<i64>::new());
    }

    #[test]
    fn unions_are_deduplicated_and_sorted() {
        let set = MessageSet::Set(vec![
            MessageSet::Range(4, 6),
            MessageSet::Single(2),
            MessageSet::Range(5, 8),
        ]);
        assert_eq!(set.expand(7), vec![2, 4, 5, 6, 7]);
    }

    #[test]
    fn containment_agrees_with_expansion() {
        let set = MessageSet::Set(vec![
            MessageSet::Single(9),
            MessageSet::Range(2, 4),
            MessageSet::RangeFrom(6),
        ]);
        for last in [0, 3, 7] {
            let expanded = set.expand(last);
            for value in 1..=12 {
                assert_eq!(
                    set.contains(value, last),
                    expanded.contains(&value),
                    "value {value} last {last}"
                );
            }
        }
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        fn element() -> impl Strategy<Value = MessageSet> {
            prop_oneof![
                (1_i64..80).prop_map(MessageSet::Single),
                (1_i64..80, 1_i64..80).prop_map(|(a, b)| MessageSet::Range(a, b)),
                (1_i64..80).prop_map(MessageSet::RangeFrom),
                Just(MessageSet::Last),
            ]
        }

        proptest! {
            #[test]
            fn expansion_is_sorted_unique_and_bounded(
                ranges in prop::collection::vec((1_i64..200, 1_i64..200), 1..8),
                last in 0_i64..200,
            ) {
                let set = MessageSet::Set(
                    ranges.iter().map(|&(a, b)| MessageSet::Range(a, b)).collect(),
                );
                let out = set.expand(last);
                prop_assert!(out.windows(2).all(|w| w[0] < w[1]));
                prop_assert!(out.iter().all(|&n| n >= 1 && n <= last));
            }

            #[test]
            fn containment_matches_expansion(
                items in prop::collection::vec(element(), 1..6),
                last in 0_i64..80,
                value in 1_i64..100,
            ) {
                let set = MessageSet::Set(items);
                prop_assert_eq!(set.contains(value, last), set.expand(last).contains(&value));
            }

            #[test]
            fn parse_display_round_trip(parts in prop::collection::vec(1_i64..500, 1..6)) {
                let text = parts
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                let set: MessageSet = text.parse().unwrap();
                prop_assert_eq!(set.to_string(), text);
            }
        }
    }
}
