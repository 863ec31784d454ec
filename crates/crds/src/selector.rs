//! Label selectors
//!
//! A selector is a conjunction of requirements over a label set. It is used
//! both by workloads (to account for the resources they own) and by services
//! (to decide traffic membership). Both uses go through [`matches`].
//!
//! Operators form a closed set; the string syntax accepted by [`LabelSelector::from_str`]
//! (`app=web,tier!=db,env in (a,b),gpu,!legacy`) is only a boundary format and is
//! converted to the typed form immediately.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{SelectorParseError, ValidationError};

/// Labels attached to a resource, node or template.
pub type LabelSet = BTreeMap<String, String>;

/// Operator of a single selector requirement.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum SelectorOperator {
    /// Label must be present with exactly the given value
    Equals,
    /// Label must be absent or carry a different value
    NotEquals,
    /// Label must be present (value ignored)
    Exists,
    /// Label must be absent (value ignored)
    #[serde(alias = "DoesNotExist")]
    NotExists,
    /// Label must be present with one of the given values
    In,
    /// Label must be absent or carry none of the given values
    NotIn,
}

impl SelectorOperator {
    /// Check a single label value against this operator.
    ///
    /// - `label_value`: the actual label value (`None` if the key is absent)
    /// - `values`: the values carried by the requirement
    pub fn matches(self, label_value: Option<&str>, values: &[String]) -> bool {
        match self {
            Self::Equals => label_value.is_some_and(|v| values.first().is_some_and(|want| want == v)),
            Self::NotEquals => !Self::Equals.matches(label_value, values),
            Self::Exists => label_value.is_some(),
            Self::NotExists => label_value.is_none(),
            Self::In => label_value.is_some_and(|v| values.iter().any(|want| want == v)),
            Self::NotIn => !Self::In.matches(label_value, values),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "Equals",
            Self::NotEquals => "NotEquals",
            Self::Exists => "Exists",
            Self::NotExists => "NotExists",
            Self::In => "In",
            Self::NotIn => "NotIn",
        }
    }
}

/// A single clause of a selector.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    /// The label key that the requirement applies to
    pub key: String,

    /// Relationship between the label and `values`
    pub operator: SelectorOperator,

    /// Values for the operator
    ///
    /// - `Equals` / `NotEquals`: exactly one value
    /// - `In` / `NotIn`: at least one value
    /// - `Exists` / `NotExists`: empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl LabelSelectorRequirement {
    pub fn new(key: impl Into<String>, operator: SelectorOperator, values: Vec<String>) -> Self {
        Self {
            key: key.into(),
            operator,
            values,
        }
    }

    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, SelectorOperator::Equals, vec![value.into()])
    }

    pub fn not_equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, SelectorOperator::NotEquals, vec![value.into()])
    }

    pub fn exists(key: impl Into<String>) -> Self {
        Self::new(key, SelectorOperator::Exists, Vec::new())
    }

    pub fn not_exists(key: impl Into<String>) -> Self {
        Self::new(key, SelectorOperator::NotExists, Vec::new())
    }

    pub fn is_in<I, S>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(key, SelectorOperator::In, values.into_iter().map(Into::into).collect())
    }

    pub fn not_in<I, S>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(key, SelectorOperator::NotIn, values.into_iter().map(Into::into).collect())
    }

    /// Check if a label set satisfies this requirement
    pub fn matches(&self, labels: &LabelSet) -> bool {
        let value = labels.get(&self.key).map(String::as_str);
        self.operator.matches(value, &self.values)
    }

    /// Check arity of `values` against the operator.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidRequirement {
            key: self.key.clone(),
            reason,
        };

        if self.key.is_empty() || self.key.chars().any(char::is_whitespace) {
            return Err(invalid("key must be non-empty and contain no whitespace".to_string()));
        }

        let n = self.values.len();
        let ok = match self.operator {
            SelectorOperator::Equals | SelectorOperator::NotEquals => n == 1,
            SelectorOperator::In | SelectorOperator::NotIn => n >= 1,
            SelectorOperator::Exists | SelectorOperator::NotExists => n == 0,
        };
        if ok {
            Ok(())
        } else {
            Err(invalid(format!(
                "operator {} does not accept {} value(s)",
                self.operator.as_str(),
                n
            )))
        }
    }
}

impl fmt::Display for LabelSelectorRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self.values.first().map(String::as_str).unwrap_or_default();
        match self.operator {
            SelectorOperator::Equals => write!(f, "{}={}", self.key, first),
            SelectorOperator::NotEquals => write!(f, "{}!={}", self.key, first),
            SelectorOperator::Exists => write!(f, "{}", self.key),
            SelectorOperator::NotExists => write!(f, "!{}", self.key),
            SelectorOperator::In => write!(f, "{} in ({})", self.key, self.values.join(",")),
            SelectorOperator::NotIn => write!(f, "{} notin ({})", self.key, self.values.join(",")),
        }
    }
}

/// Selector over a label set.
///
/// `match_labels` is shorthand for a list of `Equals` requirements. An empty
/// selector matches everything.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Exact key/value matches
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: LabelSet,

    /// Set-based requirements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selector that requires every given label to be present with its value.
    pub fn from_labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            match_labels: labels.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            match_expressions: Vec::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    pub fn with_requirement(mut self, requirement: LabelSelectorRequirement) -> Self {
        self.match_expressions.push(requirement);
        self
    }

    /// All clauses of the selector, `match_labels` desugared into `Equals`.
    pub fn requirements(&self) -> impl Iterator<Item = LabelSelectorRequirement> + '_ {
        self.match_labels
            .iter()
            .map(|(k, v)| LabelSelectorRequirement::equals(k.clone(), v.clone()))
            .chain(self.match_expressions.iter().cloned())
    }

    /// Check if a label set satisfies every clause.
    pub fn matches(&self, labels: &LabelSet) -> bool {
        self.match_labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
            && self.match_expressions.iter().all(|req| req.matches(labels))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.requirements().try_for_each(|req| req.validate())
    }
}

/// Evaluate `selector` against `labels`.
pub fn matches(selector: &LabelSelector, labels: &LabelSet) -> bool {
    selector.matches(labels)
}

/// Render a label set as `k=v,k2=v2` for logs and error messages.
pub fn format_labels(labels: &LabelSet) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.requirements().map(|req| req.to_string()).collect();
        f.write_str(&rendered.join(","))
    }
}

impl FromStr for LabelSelector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut selector = LabelSelector::new();
        if s.trim().is_empty() {
            return Ok(selector);
        }
        for term in split_terms(s)? {
            selector.match_expressions.push(parse_term(&term)?);
        }
        Ok(selector)
    }
}

/// Split on commas that are not inside a `( ... )` value list.
fn split_terms(s: &str) -> Result<Vec<String>, SelectorParseError> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();

    for c in s.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| SelectorParseError::UnbalancedParens(s.to_string()))?;
                current.push(c);
            }
            ',' if depth == 0 => {
                let term = current.trim().to_string();
                if term.is_empty() {
                    return Err(SelectorParseError::EmptyTerm(s.to_string()));
                }
                terms.push(term);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if depth != 0 {
        return Err(SelectorParseError::UnbalancedParens(s.to_string()));
    }
    let term = current.trim().to_string();
    if term.is_empty() {
        return Err(SelectorParseError::EmptyTerm(s.to_string()));
    }
    terms.push(term);
    Ok(terms)
}

fn parse_key(raw: &str, term: &str) -> Result<String, SelectorParseError> {
    let key = raw.trim();
    if key.is_empty() || key.chars().any(|c| c.is_whitespace() || "=!(),".contains(c)) {
        return Err(SelectorParseError::InvalidKey(term.to_string()));
    }
    Ok(key.to_string())
}

fn parse_term(term: &str) -> Result<LabelSelectorRequirement, SelectorParseError> {
    if let Some(open) = term.find('(') {
        let head = &term[..open];
        let list = term[open..].trim();
        let inner = list
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| SelectorParseError::InvalidValueSet(term.to_string()))?;

        let mut parts = head.split_whitespace();
        let key = parse_key(parts.next().unwrap_or_default(), term)?;
        let op = parts.next().unwrap_or_default();
        if parts.next().is_some() {
            return Err(SelectorParseError::InvalidKey(term.to_string()));
        }

        let values: Vec<String> = inner.split(',').map(|v| v.trim().to_string()).collect();
        if values.iter().any(String::is_empty) {
            return Err(SelectorParseError::InvalidValueSet(term.to_string()));
        }

        return match op {
            "in" => Ok(LabelSelectorRequirement::is_in(key, values)),
            "notin" => Ok(LabelSelectorRequirement::not_in(key, values)),
            other => Err(SelectorParseError::UnknownOperator {
                term: term.to_string(),
                op: other.to_string(),
            }),
        };
    }

    if let Some((key, value)) = term.split_once("!=") {
        return Ok(LabelSelectorRequirement::not_equals(parse_key(key, term)?, value.trim()));
    }
    if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return Ok(LabelSelectorRequirement::equals(parse_key(key, term)?, value.trim()));
    }
    if let Some(key) = term.strip_prefix('!') {
        return Ok(LabelSelectorRequirement::not_exists(parse_key(key, term)?));
    }
    Ok(LabelSelectorRequirement::exists(parse_key(term, term)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = LabelSelector::new();
        assert!(selector.matches(&LabelSet::new()));
        assert!(selector.matches(&labels(&[("app", "x")])));
    }

    #[test]
    fn test_operator_semantics() {
        let l = labels(&[("app", "x"), ("tier", "web")]);

        assert!(LabelSelectorRequirement::equals("app", "x").matches(&l));
        assert!(!LabelSelectorRequirement::equals("app", "y").matches(&l));
        assert!(!LabelSelectorRequirement::equals("missing", "x").matches(&l));

        assert!(LabelSelectorRequirement::not_equals("app", "y").matches(&l));
        assert!(LabelSelectorRequirement::not_equals("missing", "y").matches(&l));
        assert!(!LabelSelectorRequirement::not_equals("app", "x").matches(&l));

        assert!(LabelSelectorRequirement::exists("tier").matches(&l));
        assert!(!LabelSelectorRequirement::exists("missing").matches(&l));
        assert!(LabelSelectorRequirement::not_exists("missing").matches(&l));
        assert!(!LabelSelectorRequirement::not_exists("tier").matches(&l));

        assert!(LabelSelectorRequirement::is_in("tier", ["db", "web"]).matches(&l));
        assert!(!LabelSelectorRequirement::is_in("tier", ["db"]).matches(&l));
        assert!(!LabelSelectorRequirement::is_in("missing", ["db"]).matches(&l));

        assert!(LabelSelectorRequirement::not_in("tier", ["db"]).matches(&l));
        assert!(LabelSelectorRequirement::not_in("missing", ["db"]).matches(&l));
        assert!(!LabelSelectorRequirement::not_in("tier", ["db", "web"]).matches(&l));
    }

    #[test]
    fn test_conflicting_clauses_are_anded() {
        let selector = LabelSelector::new()
            .with_requirement(LabelSelectorRequirement::equals("app", "a"))
            .with_requirement(LabelSelectorRequirement::not_equals("app", "a"));
        assert!(selector.validate().is_ok());
        assert!(!selector.matches(&labels(&[("app", "a")])));
        assert!(!selector.matches(&labels(&[("app", "b")])));
    }

    #[test]
    fn test_match_labels_and_expressions_combined() {
        let selector = LabelSelector::from_labels([("app", "x")])
            .with_requirement(LabelSelectorRequirement::equals("active", "yes"));
        assert!(selector.matches(&labels(&[("app", "x"), ("active", "yes")])));
        assert!(!selector.matches(&labels(&[("app", "x"), ("active", "no")])));
        assert!(!selector.matches(&labels(&[("app", "x")])));
    }

    #[test]
    fn test_matches_is_deterministic() {
        let selector: LabelSelector = "app=x,tier notin (db),!legacy".parse().unwrap();
        let l = labels(&[("app", "x"), ("tier", "web")]);
        let first = matches(&selector, &l);
        for _ in 0..10 {
            assert_eq!(matches(&selector, &l), first);
        }
        assert!(first);
    }

    #[test]
    fn test_validate_arity() {
        assert!(LabelSelectorRequirement::new("app", SelectorOperator::Equals, vec![]).validate().is_err());
        assert!(
            LabelSelectorRequirement::new("app", SelectorOperator::Equals, vec!["a".into(), "b".into()])
                .validate()
                .is_err()
        );
        assert!(LabelSelectorRequirement::new("app", SelectorOperator::In, vec![]).validate().is_err());
        assert!(
            LabelSelectorRequirement::new("app", SelectorOperator::Exists, vec!["a".into()])
                .validate()
                .is_err()
        );
        assert!(LabelSelectorRequirement::exists("").validate().is_err());
        assert!(LabelSelectorRequirement::is_in("app", ["a", "b"]).validate().is_ok());
    }

    #[test]
    fn test_parse_selector_string() {
        let selector: LabelSelector = "app=x, tier!=db, env in (prod, staging), zone notin (a), gpu, !legacy"
            .parse()
            .unwrap();
        assert_eq!(
            selector.match_expressions,
            vec![
                LabelSelectorRequirement::equals("app", "x"),
                LabelSelectorRequirement::not_equals("tier", "db"),
                LabelSelectorRequirement::is_in("env", ["prod", "staging"]),
                LabelSelectorRequirement::not_in("zone", ["a"]),
                LabelSelectorRequirement::exists("gpu"),
                LabelSelectorRequirement::not_exists("legacy"),
            ]
        );
        assert_eq!(
            selector.to_string(),
            "app=x,tier!=db,env in (prod,staging),zone notin (a),gpu,!legacy"
        );

        let double_equals: LabelSelector = "app==x".parse().unwrap();
        assert_eq!(double_equals.match_expressions, vec![LabelSelectorRequirement::equals("app", "x")]);
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!(matches!(
            "app=x,,tier=y".parse::<LabelSelector>(),
            Err(SelectorParseError::EmptyTerm(_))
        ));
        assert!(matches!(
            "env in (a,b".parse::<LabelSelector>(),
            Err(SelectorParseError::UnbalancedParens(_))
        ));
        assert!(matches!(
            "env in ()".parse::<LabelSelector>(),
            Err(SelectorParseError::InvalidValueSet(_))
        ));
        assert!(matches!(
            "env in (a,,b)".parse::<LabelSelector>(),
            Err(SelectorParseError::InvalidValueSet(_))
        ));
        assert!(matches!(
            "env notin (a, )".parse::<LabelSelector>(),
            Err(SelectorParseError::InvalidValueSet(_))
        ));
        assert!(matches!(
            "env within (a)".parse::<LabelSelector>(),
            Err(SelectorParseError::UnknownOperator { .. })
        ));
        assert!(matches!("=x".parse::<LabelSelector>(), Err(SelectorParseError::InvalidKey(_))));
        assert_eq!("".parse::<LabelSelector>().unwrap(), LabelSelector::new());
    }

    #[test]
    fn test_deserialize_kubernetes_style_operator_alias() {
        let req: LabelSelectorRequirement =
            serde_json::from_str(r#"{"key":"legacy","operator":"DoesNotExist"}"#).unwrap();
        assert_eq!(req, LabelSelectorRequirement::not_exists("legacy"));
    }
}
