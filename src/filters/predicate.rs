//! # Filter predicates.
//!
//! A [`Predicate`] is evaluated against a structured [`Event`]. It never
//! probes attributes at runtime.
//!
//! ## Regex semantics
//! [`Predicate::Regex`] matches from the **start** of the field, and `.` also
//! matches newlines. So `.*1234567890.*` finds the number anywhere in a
//! multi-line event, while `ERROR` only matches text that begins with it.
//!
//! ## Failure semantics
//! Building a regex predicate never fails. An invalid pattern is stored and
//! reported by [`Predicate::matches`] as [`FilterError::InvalidRegex`] on every
//! evaluation. The registry turns that into "no match". Use
//! [`Predicate::try_regex`] to validate eagerly.

use std::borrow::Cow;
use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::error::FilterError;
use crate::events::{Event, EventKind};

/// Which part of the event a predicate looks at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    /// The rendered event (`Display`), header included.
    Text,
    Line,
    Node,
    Message,
    Subtype,
    /// A free-form field. Its absence is a [`FilterError::MissingField`].
    Named(String),
}

impl Field {
    fn value<'e>(&self, event: &'e Event) -> Result<Option<Cow<'e, str>>, FilterError> {
        let v = match self {
            Field::Text => Some(Cow::Owned(event.to_string())),
            Field::Line => event.line.as_deref().map(Cow::Borrowed),
            Field::Node => event.node.as_deref().map(Cow::Borrowed),
            Field::Message => event.message.as_deref().map(Cow::Borrowed),
            Field::Subtype => event.subtype.as_deref().map(Cow::Borrowed),
            Field::Named(name) => match event.fields.get(name) {
                Some(v) => Some(Cow::Borrowed(v.as_str())),
                None => {
                    return Err(FilterError::MissingField {
                        field: name.clone(),
                    });
                }
            },
        };
        Ok(v)
    }
}

/// Compiled (or failed) regular expression, keeping the source pattern.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    compiled: Result<Regex, String>,
}

impl Pattern {
    pub fn new(source: &str) -> Self {
        let compiled = RegexBuilder::new(&format!(r"\A(?:{source})"))
            .dot_matches_new_line(true)
            .multi_line(true)
            .build()
            .map_err(|e| e.to_string());
        Self {
            source: source.to_string(),
            compiled,
        }
    }

    /// Pattern as given by the caller.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    fn regex(&self) -> Result<&Regex, FilterError> {
        self.compiled
            .as_ref()
            .map_err(|reason| FilterError::InvalidRegex {
                pattern: self.source.clone(),
                reason: reason.clone(),
            })
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Condition an event must satisfy for a filter to apply.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Matches every event.
    Any,
    /// Event is of the given kind.
    Kind(EventKind),
    /// Event subtype equals the value.
    Subtype(String),
    /// Field equals the value exactly.
    FieldEquals { field: Field, value: String },
    /// Field contains the substring.
    Contains { field: Field, needle: String },
    /// Field matches the pattern (anchored at start, `.` spans lines).
    Regex { field: Field, pattern: Pattern },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Regex predicate; an invalid pattern is reported at evaluation time.
    pub fn regex(field: Field, pattern: &str) -> Self {
        Predicate::Regex {
            field,
            pattern: Pattern::new(pattern),
        }
    }

    /// Regex predicate, rejecting an invalid pattern now.
    pub fn try_regex(field: Field, pattern: &str) -> Result<Self, FilterError> {
        let pattern = Pattern::new(pattern);
        pattern.regex()?;
        Ok(Predicate::Regex { field, pattern })
    }

    pub fn field_equals(field: Field, value: impl Into<String>) -> Self {
        Predicate::FieldEquals {
            field,
            value: value.into(),
        }
    }

    pub fn contains(field: Field, needle: impl Into<String>) -> Self {
        Predicate::Contains {
            field,
            needle: needle.into(),
        }
    }

    /// Combines `self` and `other`, flattening nested `And`s.
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::Any, p) | (p, Predicate::Any) => p,
            (Predicate::And(mut a), Predicate::And(b)) => {
                a.extend(b);
                Predicate::And(a)
            }
            (Predicate::And(mut a), p) => {
                a.push(p);
                Predicate::And(a)
            }
            (p, q) => Predicate::And(vec![p, q]),
        }
    }

    /// Evaluates the predicate.
    ///
    /// An absent optional field (`line`, `node`, ...) is a plain non-match.
    /// Errors are returned for invalid regexes and missing named fields.
    pub fn matches(&self, event: &Event) -> Result<bool, FilterError> {
        match self {
            Predicate::Any => Ok(true),
            Predicate::Kind(kind) => Ok(event.kind == *kind),
            Predicate::Subtype(st) => Ok(event.subtype.as_deref() == Some(st.as_str())),
            Predicate::FieldEquals { field, value } => {
                Ok(field.value(event)?.is_some_and(|v| v == value.as_str()))
            }
            Predicate::Contains { field, needle } => {
                Ok(field.value(event)?.is_some_and(|v| v.contains(needle.as_str())))
            }
            Predicate::Regex { field, pattern } => {
                let re = pattern.regex()?;
                Ok(field.value(event)?.is_some_and(|v| re.is_match(&v)))
            }
            Predicate::And(all) => {
                for p in all {
                    if !p.matches(event)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(any) => {
                for p in any {
                    if p.matches(event)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::Not(inner) => Ok(!inner.matches(event)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Severity;

    fn db_event(line: &str) -> Event {
        Event::new(EventKind::DatabaseLog)
            .with_subtype("NO_SPACE_ERROR")
            .with_severity(Severity::Error)
            .with_node("A")
            .with_line(line)
    }

    #[test]
    fn regex_is_anchored_and_spans_lines() {
        let ev = db_event("storage_io_error 1234567890 tail");
        assert!(Predicate::regex(Field::Text, ".*1234567890.*").matches(&ev).unwrap());
        assert!(!Predicate::regex(Field::Text, "1234567890").matches(&ev).unwrap());
        assert!(Predicate::regex(Field::Line, "storage_io").matches(&ev).unwrap());
    }

    #[test]
    fn invalid_regex_is_reported_on_evaluation() {
        let p = Predicate::regex(Field::Text, "(unclosed");
        let err = p.matches(&db_event("x")).unwrap_err();
        assert_eq!(err.as_label(), "filter_invalid_regex");
        assert!(Predicate::try_regex(Field::Text, "(unclosed").is_err());
    }

    #[test]
    fn missing_optional_field_is_no_match() {
        let ev = Event::new(EventKind::Info);
        assert!(!Predicate::contains(Field::Line, "x").matches(&ev).unwrap());
        assert!(!Predicate::field_equals(Field::Node, "A").matches(&ev).unwrap());
    }

    #[test]
    fn missing_named_field_is_an_error() {
        let ev = Event::new(EventKind::Info);
        let err = Predicate::field_equals(Field::Named("stress_cmd".into()), "ycsb")
            .matches(&ev)
            .unwrap_err();
        assert_eq!(
            err,
            FilterError::MissingField {
                field: "stress_cmd".into()
            }
        );
    }

    #[test]
    fn combinators() {
        let ev = db_event("No space left on device");
        let kind = Predicate::Kind(EventKind::DatabaseLog);
        let node_b = Predicate::field_equals(Field::Node, "B");

        assert!(
            kind.clone()
                .and(Predicate::contains(Field::Line, "No space"))
                .matches(&ev)
                .unwrap()
        );
        assert!(!kind.clone().and(node_b.clone()).matches(&ev).unwrap());
        assert!(
            Predicate::Or(vec![node_b.clone(), kind.clone()])
                .matches(&ev)
                .unwrap()
        );
        assert!(Predicate::Not(Box::new(node_b)).matches(&ev).unwrap());
    }

    #[test]
    fn and_flattens_and_drops_any() {
        let p = Predicate::Any
            .and(Predicate::Kind(EventKind::CoreDump))
            .and(Predicate::Subtype("x".into()))
            .and(Predicate::Subtype("y".into()));
        match p {
            Predicate::And(v) => assert_eq!(v.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }
}
