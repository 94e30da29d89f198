//! Protocol flags and store modes.
//!
//! In this engine a flag is just a tag name. The reserved system flags
//! (`\Seen` and friends) are ordinary tags whose names happen to start with
//! a backslash; they come into existence the first time a client stores
//! them. The one exception is `\Deleted`, which is not a tag at all but a
//! per-association attribute scoped to a single mailbox view.

/// Advertised in the flag namespace to signal that clients may create
/// arbitrary keywords.
pub const KEYWORD_WILDCARD: &str = "\\*";

/// A message flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read (`\Seen`).
    Seen,
    /// Message has been answered (`\Answered`).
    Answered,
    /// Message is flagged for attention (`\Flagged`).
    Flagged,
    /// Message is marked for removal from this mailbox (`\Deleted`).
    Deleted,
    /// Message is an unfinished draft (`\Draft`).
    Draft,
    /// Message arrived since the mailbox was last opened (`\Recent`).
    Recent,
    /// Any other keyword. Stored verbatim as a tag name.
    Keyword(String),
}

impl Flag {
    /// The reserved flags advertised to every mailbox, whether or not a
    /// matching tag exists yet. `\Recent` is session state and is not
    /// offered for storing.
    pub const RESERVED: [Self; 5] = [
        Self::Seen,
        Self::Answered,
        Self::Flagged,
        Self::Deleted,
        Self::Draft,
    ];

    /// Parses a flag token. System flag names match case-insensitively;
    /// anything else becomes a [`Flag::Keyword`] with its case preserved.
    #[must_use]
    pub fn parse(token: &str) -> Self {
        for flag in [
            Self::Seen,
            Self::Answered,
            Self::Flagged,
            Self::Deleted,
            Self::Draft,
            Self::Recent,
        ] {
            if token.eq_ignore_ascii_case(flag.as_str()) {
                return flag;
            }
        }
        Self::Keyword(token.to_string())
    }

    /// The wire form of the flag, which is also its tag name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(name) => name,
        }
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a flag store combines the supplied flags with a message's existing
/// ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Add the flags, leaving others in place.
    Add,
    /// Remove the flags, leaving others in place.
    Remove,
    /// Make the message's flags exactly the supplied set.
    Replace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_flags_parse_case_insensitively() {
        assert_eq!(Flag::parse("\\Seen"), Flag::Seen);
        assert_eq!(Flag::parse("\\seen"), Flag::Seen);
        assert_eq!(Flag::parse("\\DELETED"), Flag::Deleted);
        assert_eq!(Flag::parse("\\Recent"), Flag::Recent);
    }

    #[test]
    fn unknown_tokens_become_keywords_verbatim() {
        assert_eq!(Flag::parse("work"), Flag::Keyword("work".to_string()));
        assert_eq!(Flag::parse("Work"), Flag::Keyword("Work".to_string()));
        assert_eq!(
            Flag::parse("\\NotASystemFlag"),
            Flag::Keyword("\\NotASystemFlag".to_string())
        );
    }

    #[test]
    fn wire_form_round_trips() {
        for flag in Flag::RESERVED {
            assert_eq!(Flag::parse(flag.as_str()), flag);
        }
        assert_eq!(Flag::Keyword("todo".to_string()).to_string(), "todo");
    }

    #[test]
    fn reserved_set_excludes_recent() {
        assert!(!Flag::RESERVED.contains(&Flag::Recent));
        assert_eq!(Flag::RESERVED.len(), 5);
    }
}
