//! The folder query language and its evaluator.
//!
//! A query is either atomic (one tag, by name or id) or a compound: an
//! odd-length sequence alternating operands and operators. Operators are
//! positional, so `"&"` in an operand slot is a tag named `&` while the
//! same string in an operator slot means intersection. Evaluation is
//! strictly left to right with no precedence.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tagbox_store::{MessageId, MessageStore, TagId};

use crate::error::{Error, Result};

/// A folder query expression.
///
/// The serialized form is plain JSON: a number (tag id), a string (tag
/// name), or an array of sub-expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Query {
    /// A tag referenced by id.
    Id(i64),
    /// A tag referenced by name. In an operator position of a compound the
    /// name is read as the operator token instead.
    Name(String),
    /// An alternating operand/operator sequence, evaluated left to right.
    Compound(Vec<Query>),
}

impl Query {
    /// Whether this query is a single tag reference. Only atomic queries
    /// produce writable mailboxes.
    #[must_use]
    pub const fn is_atomic(&self) -> bool {
        matches!(self, Self::Id(_) | Self::Name(_))
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{id}"),
            Self::Name(name) => write!(f, "{name}"),
            Self::Compound(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SetOp {
    Intersect,
    Union,
    Difference,
}

impl SetOp {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "&" => Some(Self::Intersect),
            "|" => Some(Self::Union),
            "-" => Some(Self::Difference),
            _ => None,
        }
    }

    fn apply(self, lhs: &mut BTreeSet<MessageId>, rhs: &BTreeSet<MessageId>) {
        match self {
            Self::Intersect => lhs.retain(|id| rhs.contains(id)),
            Self::Union => lhs.extend(rhs),
            Self::Difference => lhs.retain(|id| !rhs.contains(id)),
        }
    }
}

/// Evaluates `query` against the store, returning the matching message
/// ids.
///
/// The result reflects live association state at the moment of the call;
/// mailboxes snapshot it once at open.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if an operand names a tag that does not
/// exist, [`Error::InvalidQuery`] for an even-length compound or an
/// unknown operator token, and [`Error::Store`] if the store fails.
pub async fn evaluate(store: &MessageStore, query: &Query) -> Result<BTreeSet<MessageId>> {
    evaluate_inner(store, query).await
}

type EvalFuture<'a> = Pin<Box<dyn Future<Output = Result<BTreeSet<MessageId>>> + Send + 'a>>;

fn evaluate_inner<'a>(store: &'a MessageStore, query: &'a Query) -> EvalFuture<'a> {
    Box::pin(async move {
        match query {
            Query::Name(name) => {
                let tag = store
                    .tag_by_name(name)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("tag '{name}'")))?;
                Ok(store.message_ids_with_tag(tag.id).await?.into_iter().collect())
            }
            Query::Id(id) => {
                let tag = store
                    .tag_by_id(TagId::new(*id))
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("tag id {id}")))?;
                Ok(store.message_ids_with_tag(tag.id).await?.into_iter().collect())
            }
            Query::Compound(items) => {
                if items.len() % 2 == 0 {
                    return Err(Error::InvalidQuery(format!(
                        "compound of {} terms; operands must alternate with operators",
                        items.len()
                    )));
                }
                let mut result = evaluate_inner(store, &items[0]).await?;
                for pair in items[1..].chunks(2) {
                    let op = operator(&pair[0])?;
                    let rhs = evaluate_inner(store, &pair[1]).await?;
                    op.apply(&mut result, &rhs);
                }
                Ok(result)
            }
        }
    })
}

fn operator(term: &Query) -> Result<SetOp> {
    let Query::Name(token) = term else {
        return Err(Error::InvalidQuery(format!("expected an operator, got {term}")));
    };
    SetOp::parse(token).ok_or_else(|| Error::InvalidQuery(format!("unknown operator '{token}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Query {
        Query::Name(s.to_string())
    }

    #[test]
    fn json_forms_decode_to_the_three_shapes() {
        assert_eq!(serde_json::from_str::<Query>("42").unwrap(), Query::Id(42));
        assert_eq!(serde_json::from_str::<Query>("\"work\"").unwrap(), name("work"));
        assert_eq!(
            serde_json::from_str::<Query>(r#"["work", "&", ["a", "|", 7]]"#).unwrap(),
            Query::Compound(vec![
                name("work"),
                name("&"),
                Query::Compound(vec![name("a"), name("|"), Query::Id(7)]),
            ])
        );
    }

    #[test]
    fn serialization_round_trips() {
        let query = Query::Compound(vec![name("a"), name("-"), Query::Id(3)]);
        let json = serde_json::to_string(&query).unwrap();
        assert_eq!(json, r#"["a","-",3]"#);
        assert_eq!(serde_json::from_str::<Query>(&json).unwrap(), query);
    }

    #[test]
    fn display_marks_ids_and_parenthesizes_compounds() {
        let query = Query::Compound(vec![name("a"), name("&"), Query::Id(3)]);
        assert_eq!(query.to_string(), "(a & #3)");
    }

    #[test]
    fn only_single_tag_references_are_atomic() {
        assert!(name("a").is_atomic());
        assert!(Query::Id(1).is_atomic());
        assert!(!Query::Compound(vec![name("a")]).is_atomic());
    }

    mod evaluation {
        use tagbox_store::NewMessage;

        use super::*;

        // Three messages with alpha = {0, 1, 2}, beta = {1, 2},
        // gamma = {2}.
        async fn seeded() -> (MessageStore, [MessageId; 3]) {
            let store = MessageStore::in_memory().await.unwrap();
            let mut ids = Vec::new();
            for n in 0..3 {
                let id = store
                    .append_message(&NewMessage {
                        body: format!("message {n}"),
                        length: 16,
                        headers: Vec::new(),
                    })
                    .await
                    .unwrap();
                ids.push(id);
            }
            let mut tx = store.begin().await.unwrap();
            for (tag_name, members) in [
                ("alpha", &[0_usize, 1, 2][..]),
                ("beta", &[1, 2][..]),
                ("gamma", &[2][..]),
            ] {
                let tag = tx.get_or_create_tag(tag_name).await.unwrap();
                for &i in members {
                    tx.insert_association(ids[i], tag.id).await.unwrap();
                }
            }
            tx.commit().await.unwrap();
            (store, [ids[0], ids[1], ids[2]])
        }

        fn set(ids: &[MessageId]) -> BTreeSet<MessageId> {
            ids.iter().copied().collect()
        }

        #[tokio::test]
        async fn atomic_queries_select_the_tagged_messages() {
            let (store, ids) = seeded().await;
            let by_name = evaluate(&store, &name("beta")).await.unwrap();
            assert_eq!(by_name, set(&[ids[1], ids[2]]));

            let beta = store.tag_by_name("beta").await.unwrap().unwrap();
            let by_id = evaluate(&store, &Query::Id(beta.id.0)).await.unwrap();
            assert_eq!(by_id, by_name);
        }

        #[tokio::test]
        async fn operators_follow_set_semantics() {
            let (store, ids) = seeded().await;
            let and = Query::Compound(vec![name("alpha"), name("&"), name("beta")]);
            assert_eq!(evaluate(&store, &and).await.unwrap(), set(&[ids[1], ids[2]]));

            let or = Query::Compound(vec![name("beta"), name("|"), name("gamma")]);
            assert_eq!(evaluate(&store, &or).await.unwrap(), set(&[ids[1], ids[2]]));

            let minus = Query::Compound(vec![name("alpha"), name("-"), name("beta")]);
            assert_eq!(evaluate(&store, &minus).await.unwrap(), set(&[ids[0]]));
        }

        #[tokio::test]
        async fn disjoint_tags_intersect_to_nothing() {
            let (store, ids) = seeded().await;
            let mut tx = store.begin().await.unwrap();
            let solo = tx.get_or_create_tag("solo").await.unwrap();
            tx.insert_association(ids[0], solo.id).await.unwrap();
            tx.commit().await.unwrap();

            let and = Query::Compound(vec![name("gamma"), name("&"), name("solo")]);
            assert!(evaluate(&store, &and).await.unwrap().is_empty());

            let or = Query::Compound(vec![name("gamma"), name("|"), name("solo")]);
            assert_eq!(evaluate(&store, &or).await.unwrap(), set(&[ids[0], ids[2]]));

            let minus = Query::Compound(vec![name("gamma"), name("-"), name("solo")]);
            assert_eq!(evaluate(&store, &minus).await.unwrap(), set(&[ids[2]]));
        }

        #[tokio::test]
        async fn evaluation_is_left_to_right_without_precedence() {
            let (store, ids) = seeded().await;
            // (alpha - beta) | gamma = {0, 2}. Any precedence of | over -
            // would give {0} instead.
            let query = Query::Compound(vec![
                name("alpha"),
                name("-"),
                name("beta"),
                name("|"),
                name("gamma"),
            ]);
            assert_eq!(
                evaluate(&store, &query).await.unwrap(),
                set(&[ids[0], ids[2]])
            );
        }

        #[tokio::test]
        async fn nested_compounds_evaluate_before_their_slot() {
            let (store, ids) = seeded().await;
            let query = Query::Compound(vec![
                name("alpha"),
                name("&"),
                Query::Compound(vec![name("beta"), name("|"), name("gamma")]),
            ]);
            assert_eq!(
                evaluate(&store, &query).await.unwrap(),
                set(&[ids[1], ids[2]])
            );
        }

        #[tokio::test]
        async fn single_element_compound_is_valid() {
            let (store, ids) = seeded().await;
            let query = Query::Compound(vec![name("gamma")]);
            assert_eq!(evaluate(&store, &query).await.unwrap(), set(&[ids[2]]));
        }

        #[tokio::test]
        async fn even_length_compounds_are_invalid() {
            let (store, _) = seeded().await;
            for items in [Vec::new(), vec![name("alpha"), name("&")]] {
                let err = evaluate(&store, &Query::Compound(items)).await.unwrap_err();
                assert!(matches!(err, Error::InvalidQuery(_)), "got {err}");
            }
        }

        #[tokio::test]
        async fn unknown_operator_tokens_are_invalid() {
            let (store, _) = seeded().await;
            let query = Query::Compound(vec![name("alpha"), name("^"), name("beta")]);
            let err = evaluate(&store, &query).await.unwrap_err();
            assert!(matches!(err, Error::InvalidQuery(_)), "got {err}");

            let nested_op = Query::Compound(vec![
                name("alpha"),
                Query::Compound(vec![name("&")]),
                name("beta"),
            ]);
            let err = evaluate(&store, &nested_op).await.unwrap_err();
            assert!(matches!(err, Error::InvalidQuery(_)), "got {err}");
        }

        #[tokio::test]
        async fn unknown_tags_are_not_found() {
            let (store, _) = seeded().await;
            let err = evaluate(&store, &name("nope")).await.unwrap_err();
            assert!(matches!(err, Error::NotFound(_)), "got {err}");

            let err = evaluate(&store, &Query::Id(999)).await.unwrap_err();
            assert!(matches!(err, Error::NotFound(_)), "got {err}");
        }

        #[tokio::test]
        async fn operator_slots_do_not_shadow_tags_named_like_operators() {
            let (store, ids) = seeded().await;
            let mut tx = store.begin().await.unwrap();
            let amp = tx.get_or_create_tag("&").await.unwrap();
            tx.insert_association(ids[0], amp.id).await.unwrap();
            tx.commit().await.unwrap();

            // In an operand slot "&" is the tag; in an operator slot it is
            // intersection.
            let query = Query::Compound(vec![name("&"), name("|"), name("gamma")]);
            assert_eq!(
                evaluate(&store, &query).await.unwrap(),
                set(&[ids[0], ids[2]])
            );
        }
    }
}
