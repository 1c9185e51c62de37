//! The advice tree: what [`crate::builder::generate_advice`] produces and what a
//! client walks to discover legal parameter values one field at a time.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// One value an advisor is willing to accept for a field, along with how the
/// resulting tree should be shaped for it.
#[derive(Clone, Debug, PartialEq)]
pub enum AdvisedValue {
    /// Exactly one acceptable value.
    Literal {
        value: Value,
        break_on_advice: bool,
    },
    /// A structured value: each key maps to either a fixed JSON value or further
    /// advice.
    Dict {
        entries: Vec<(String, DictEntry)>,
        allow_extras: bool,
        break_on_advice: bool,
    },
    /// An inclusive date range, `start..=end`, both RFC 3339 strings.
    DateRange {
        start: String,
        end: String,
        break_on_advice: bool,
    },
    /// The field must take exactly one of these values (or satisfy one of these
    /// nested advices).
    OneOf {
        options: Vec<AdvisedValue>,
        break_on_advice: bool,
        split_on_advice: bool,
    },
    /// The field must take a subset of these values (or values each satisfying one
    /// of these nested advices).
    SubsetOf {
        options: Vec<AdvisedValue>,
        break_on_advice: bool,
        split_on_advice: bool,
    },
    /// The supplied value is accepted as-is; used only while validating a
    /// caller-supplied value, never while advising a missing one.
    Okay,
}

/// One entry of a [`AdvisedValue::Dict`].
#[derive(Clone, Debug, PartialEq)]
pub enum DictEntry {
    Fixed(Value),
    Advised(Box<AdvisedValue>),
}

impl AdvisedValue {
    /// Whether a frontier edge built from this branch should be cut off rather than
    /// explored further, to avoid combinatorial blowup in the advice tree.
    #[must_use]
    pub fn break_on_advice(&self) -> bool {
        match self {
            AdvisedValue::Literal { break_on_advice, .. }
            | AdvisedValue::Dict { break_on_advice, .. }
            | AdvisedValue::DateRange { break_on_advice, .. }
            | AdvisedValue::OneOf { break_on_advice, .. }
            | AdvisedValue::SubsetOf { break_on_advice, .. } => *break_on_advice,
            AdvisedValue::Okay => false,
        }
    }

    /// A representative value later advisors can use as context when this field
    /// was never supplied by the caller.
    pub fn assumed_value(&self) -> Result<Value> {
        match self {
            AdvisedValue::Literal { value, .. } => Ok(value.clone()),
            AdvisedValue::Dict { entries, .. } => {
                let mut map = serde_json::Map::new();
                for (k, v) in entries {
                    let value = match v {
                        DictEntry::Fixed(v) => v.clone(),
                        DictEntry::Advised(a) => a.assumed_value()?,
                    };
                    map.insert(k.clone(), value);
                }
                Ok(Value::Object(map))
            }
            AdvisedValue::DateRange { start, .. } => Ok(Value::String(start.clone())),
            AdvisedValue::OneOf { options, .. } | AdvisedValue::SubsetOf { options, .. } => {
                options
                    .first()
                    .map(AdvisedValue::assumed_value)
                    .unwrap_or(Ok(Value::Null))
            }
            AdvisedValue::Okay => Err(Error::Advised(
                "cannot derive an assumed value from Okay".to_string(),
            )),
        }
    }

    /// Check whether `value` satisfies this advice, returning `None` if it does and
    /// `Some(message)` describing the mismatch otherwise.
    #[must_use]
    pub fn validate(&self, value: &Value) -> Option<String> {
        match self {
            AdvisedValue::Literal { value: expected, .. } => {
                if expected == value {
                    None
                } else {
                    Some(format!("expected value {expected} but got {value}"))
                }
            }
            AdvisedValue::Dict {
                entries,
                allow_extras,
                ..
            } => validate_dict(entries, *allow_extras, value),
            AdvisedValue::DateRange { start, end, .. } => {
                let v = value.as_str().unwrap_or_default();
                if start.as_str() <= v && v <= end.as_str() {
                    None
                } else {
                    Some(format!("expected date in range {start}..{end} but got {value}"))
                }
            }
            AdvisedValue::OneOf { options, .. } => {
                for option in options {
                    if matches_literal_or_advice(option, value) {
                        return None;
                    }
                }
                Some(format!("expected one of {options:?} but got {value}"))
            }
            AdvisedValue::SubsetOf { options, .. } => {
                let candidates: Vec<Value> = match value.as_array() {
                    Some(arr) => arr.clone(),
                    None => vec![value.clone()],
                };
                for candidate in &candidates {
                    let ok = options
                        .iter()
                        .any(|option| matches_literal_or_advice(option, candidate));
                    if !ok {
                        return Some(format!(
                            "expected subset of {options:?} but got {value}; {candidate} is not allowed"
                        ));
                    }
                }
                None
            }
            AdvisedValue::Okay => None,
        }
    }

    /// Expand into the concrete branches a discovery tree should offer: for
    /// `OneOf`/`SubsetOf` with `split_on_advice` set, each option becomes its own
    /// literal branch; otherwise the whole advice is a single branch.
    #[must_use]
    pub fn iterate_advice_branches(&self) -> Vec<AdvisedValue> {
        match self {
            AdvisedValue::OneOf {
                options,
                break_on_advice,
                split_on_advice: true,
            }
            | AdvisedValue::SubsetOf {
                options,
                break_on_advice,
                split_on_advice: true,
            } => options
                .iter()
                .map(|opt| AdvisedValue::Literal {
                    value: opt.as_pydantic_value(),
                    break_on_advice: *break_on_advice,
                })
                .collect(),
            other => vec![other.clone()],
        }
    }

    /// The JSON value a client should see offered for this branch.
    #[must_use]
    pub fn as_pydantic_value(&self) -> Value {
        match self {
            AdvisedValue::Literal { value, .. } => value.clone(),
            AdvisedValue::Dict { entries, .. } => {
                let mut map = serde_json::Map::new();
                for (k, v) in entries {
                    let value = match v {
                        DictEntry::Fixed(v) => v.clone(),
                        DictEntry::Advised(a) => a.as_pydantic_value(),
                    };
                    map.insert(k.clone(), value);
                }
                Value::Object(map)
            }
            AdvisedValue::DateRange { start, end, .. } => serde_json::json!({
                "startdate": start,
                "enddate": end,
            }),
            AdvisedValue::OneOf { options, .. } | AdvisedValue::SubsetOf { options, .. } => {
                Value::Array(options.iter().map(AdvisedValue::as_pydantic_value).collect())
            }
            AdvisedValue::Okay => Value::Null,
        }
    }
}

fn matches_literal_or_advice(option: &AdvisedValue, value: &Value) -> bool {
    option.validate(value).is_none()
}

fn validate_dict(entries: &[(String, DictEntry)], allow_extras: bool, value: &Value) -> Option<String> {
    let Some(obj) = value.as_object() else {
        return Some(format!("expected an object but got {value}"));
    };
    for (key, expected) in entries {
        let Some(actual) = obj.get(key) else {
            return Some(format!("expected key {key} in {value}"));
        };
        match expected {
            DictEntry::Fixed(expected_value) => {
                if expected_value != actual {
                    return Some(format!(
                        "expected value {expected_value} for key {key} but got {actual}"
                    ));
                }
            }
            DictEntry::Advised(advice) => {
                if let Some(msg) = advice.validate(actual) {
                    return Some(msg);
                }
            }
        }
    }
    if !allow_extras && obj.len() != entries.len() {
        return Some(format!("unexpected extra keys in {value}"));
    }
    None
}

/// What following a branch of the advice tree leads to.
#[derive(Clone, Debug, PartialEq)]
pub enum Edge {
    /// Further advice is needed for a later field.
    Advice(Box<FieldAdvice>),
    /// This path is invalid; the message explains why.
    Error(String),
    /// Discovery was deliberately cut short on this branch to avoid combinatorial
    /// explosion; the caller should commit to values chosen so far and start a new
    /// discovery pass for the rest.
    Partial,
    /// No more fields need advice; the path is complete and valid.
    Done,
}

impl Edge {
    fn is_good_path(&self) -> bool {
        match self {
            Edge::Error(_) => false,
            Edge::Advice(advice) => advice.has_good_options(),
            Edge::Partial | Edge::Done => true,
        }
    }

    fn collect_into(&self, field: &str, error_map: &mut HashMap<String, HashSet<String>>) {
        match self {
            Edge::Error(msg) => {
                error_map
                    .entry(field.to_string())
                    .or_default()
                    .insert(msg.clone());
            }
            Edge::Advice(advice) => advice.collect_into(error_map),
            Edge::Partial | Edge::Done => {}
        }
    }
}

/// A node in the advice tree: either one field whose choice does not affect which
/// fields come next ([`FieldAdvice::Single`]), or one whose choice branches the
/// remainder of the tree ([`FieldAdvice::Branch`]).
#[derive(Clone, Debug, PartialEq)]
pub enum FieldAdvice {
    Single {
        field: String,
        value: Value,
        edge: Box<Edge>,
    },
    Branch {
        field: String,
        branches: Vec<(Value, Edge)>,
    },
}

impl FieldAdvice {
    /// The field this node advises.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            FieldAdvice::Single { field, .. } | FieldAdvice::Branch { field, .. } => field,
        }
    }

    /// Whether at least one branch through this node can still succeed.
    #[must_use]
    pub fn has_good_options(&self) -> bool {
        match self {
            FieldAdvice::Single { edge, .. } => edge.is_good_path(),
            FieldAdvice::Branch { branches, .. } => {
                branches.iter().any(|(_, edge)| edge.is_good_path())
            }
        }
    }

    /// Gather every error message reachable from this node, grouped by field.
    #[must_use]
    pub fn collect_error_messages(&self) -> HashMap<String, HashSet<String>> {
        let mut map = HashMap::new();
        self.collect_into(&mut map);
        map
    }

    fn collect_into(&self, error_map: &mut HashMap<String, HashSet<String>>) {
        match self {
            FieldAdvice::Single { field, edge, .. } => edge.collect_into(field, error_map),
            FieldAdvice::Branch { field, branches } => {
                for (_, edge) in branches {
                    edge.collect_into(field, error_map);
                }
            }
        }
    }

    /// Follow the branch matching `value`, returning the next node to advise (or
    /// `None` if this was the last field that needed advice).
    pub fn select(&self, value: &Value) -> Result<Option<&FieldAdvice>> {
        let edge = match self {
            FieldAdvice::Single { edge, .. } => edge.as_ref(),
            FieldAdvice::Branch { branches, .. } => {
                let (_, edge) = branches
                    .iter()
                    .find(|(candidate, _)| candidate == value)
                    .ok_or(Error::NoSuchBranch)?;
                edge
            }
        };
        match edge {
            Edge::Error(msg) => Err(Error::Advised(msg.clone())),
            Edge::Partial => Err(Error::Partial),
            Edge::Advice(advice) => Ok(Some(advice.as_ref())),
            Edge::Done => Ok(None),
        }
    }

    /// The values a caller may legally pick for this field, skipping branches that
    /// cannot possibly succeed.
    #[must_use]
    pub fn valid_values(&self) -> Vec<Value> {
        match self {
            FieldAdvice::Single { value, edge, .. } => {
                if edge.is_good_path() {
                    vec![value.clone()]
                } else {
                    vec![]
                }
            }
            FieldAdvice::Branch { branches, .. } => branches
                .iter()
                .filter(|(_, edge)| edge.is_good_path())
                .map(|(value, _)| value.clone())
                .collect(),
        }
    }
}

/// A discovered advice tree, wrapped at the top level with serde support for the
/// HTTP transport (the `api_class` tag distinguishes it from other response
/// payloads at the process service boundary, mirroring [`dfm_core::ResponseBody`]).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "api_class", rename = "AdviceTree")]
pub struct AdviceTree {
    /// `None` when the adapter needed no advice at all (every field was already
    /// fully specified and valid).
    pub root: Option<SerializedAdvice>,
}

/// JSON-friendly mirror of [`FieldAdvice`]/[`Edge`] for wire transport; built from
/// the in-memory tree by [`crate::builder::generate_advice`] callers via `From`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SerializedAdvice {
    Single {
        field: String,
        value: Value,
        edge: Box<SerializedEdge>,
    },
    Branch {
        field: String,
        branches: Vec<(Value, SerializedEdge)>,
    },
}

/// JSON-friendly mirror of [`Edge`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SerializedEdge {
    Advice(SerializedAdvice),
    Error { msg: String },
    Partial,
    Done,
}

impl From<&FieldAdvice> for SerializedAdvice {
    fn from(advice: &FieldAdvice) -> Self {
        match advice {
            FieldAdvice::Single { field, value, edge } => SerializedAdvice::Single {
                field: field.clone(),
                value: value.clone(),
                edge: Box::new(SerializedEdge::from(edge.as_ref())),
            },
            FieldAdvice::Branch { field, branches } => SerializedAdvice::Branch {
                field: field.clone(),
                branches: branches
                    .iter()
                    .map(|(v, e)| (v.clone(), SerializedEdge::from(e)))
                    .collect(),
            },
        }
    }
}

impl From<&Edge> for SerializedEdge {
    fn from(edge: &Edge) -> Self {
        match edge {
            Edge::Advice(advice) => SerializedEdge::Advice(SerializedAdvice::from(advice.as_ref())),
            Edge::Error(msg) => SerializedEdge::Error { msg: msg.clone() },
            Edge::Partial => SerializedEdge::Partial,
            Edge::Done => SerializedEdge::Done,
        }
    }
}
