//! Validation and parse errors for the Herd data model.

use thiserror::Error;

/// Admission errors: a Workload or Service that fails these checks is rejected
/// before any controller sees it and is never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A selector requirement has the wrong number of values for its operator,
    /// or an empty key.
    #[error("invalid selector requirement on key {key:?}: {reason}")]
    InvalidRequirement { key: String, reason: String },

    /// The template's labels do not satisfy the workload's own selector.
    #[error("template labels {{{labels}}} do not satisfy selector {{{selector}}}")]
    TemplateMismatch { selector: String, labels: String },

    /// The placement variant of a live workload was switched.
    #[error(
        "placement of workload {name} cannot change from {from} to {to}; \
         create a new workload and transfer ownership instead"
    )]
    PlacementChanged {
        name: String,
        from: &'static str,
        to: &'static str,
    },

    /// A resource handed to a workload is not selected by that workload's selector.
    #[error("resource {resource} is not selected by {{{selector}}}")]
    NotSelected { resource: String, selector: String },

    /// Object has no name.
    #[error("{0} is missing metadata.name")]
    MissingName(&'static str),
}

/// Errors produced when parsing a selector string such as `app=web,tier in (a,b)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectorParseError {
    /// Two consecutive commas or a trailing comma.
    #[error("empty term in selector {0:?}")]
    EmptyTerm(String),

    /// Term without a usable key (e.g. `=web`).
    #[error("missing or invalid key in term {0:?}")]
    InvalidKey(String),

    /// `in`/`notin` without a well formed `(a, b)` value list.
    #[error("invalid value set in term {0:?}")]
    InvalidValueSet(String),

    /// Unknown set operator (anything other than `in` / `notin`).
    #[error("unknown operator {op:?} in term {term:?}")]
    UnknownOperator { term: String, op: String },

    /// Parentheses do not balance.
    #[error("unbalanced parentheses in selector {0:?}")]
    UnbalancedParens(String),
}
