//! Label selectors
//!
//! Requirements are ANDed together. They render to the query-string form
//! the Kubernetes API accepts and can also be evaluated locally against a
//! label map.

use crate::error::{IdlerError, Result};
use crate::models::Labels;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Equals,
    NotEquals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRequirement {
    pub key: String,
    pub operator: SelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

impl LabelRequirement {
    pub fn new(key: impl Into<String>, operator: SelectorOperator, values: &[&str]) -> Self {
        Self {
            key: key.into(),
            operator,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(IdlerError::Selector("requirement has an empty key".into()));
        }

        let expected = match self.operator {
            SelectorOperator::In | SelectorOperator::NotIn => {
                if self.values.is_empty() {
                    return Err(IdlerError::Selector(format!(
                        "{} {:?} needs at least one value",
                        self.key, self.operator
                    )));
                }
                return Ok(());
            }
            SelectorOperator::Exists | SelectorOperator::DoesNotExist => 0,
            SelectorOperator::Equals | SelectorOperator::NotEquals => 1,
        };

        if self.values.len() != expected {
            return Err(IdlerError::Selector(format!(
                "{} {:?} takes {} value(s), got {}",
                self.key,
                self.operator,
                expected,
                self.values.len()
            )));
        }
        Ok(())
    }

    /// Render one requirement; a missing value renders as empty
    fn render(&self) -> String {
        let first = self.values.first().map(String::as_str).unwrap_or_default();
        match self.operator {
            SelectorOperator::In => format!("{} in ({})", self.key, self.values.join(",")),
            SelectorOperator::NotIn => format!("{} notin ({})", self.key, self.values.join(",")),
            SelectorOperator::Exists => self.key.clone(),
            SelectorOperator::DoesNotExist => format!("!{}", self.key),
            SelectorOperator::Equals => format!("{}={}", self.key, first),
            SelectorOperator::NotEquals => format!("{}!={}", self.key, first),
        }
    }

    fn matches(&self, labels: &Labels) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            SelectorOperator::In => value.map_or(false, |v| self.values.contains(v)),
            SelectorOperator::NotIn => value.map_or(true, |v| !self.values.contains(v)),
            SelectorOperator::Exists => value.is_some(),
            SelectorOperator::DoesNotExist => value.is_none(),
            SelectorOperator::Equals => value == self.values.first(),
            SelectorOperator::NotEquals => value != self.values.first(),
        }
    }
}

/// A set of label requirements; empty matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSelector(pub Vec<LabelRequirement>);

impl LabelSelector {
    pub fn new(requirements: Vec<LabelRequirement>) -> Self {
        Self(requirements)
    }

    /// Selector with a single `key=value` requirement
    pub fn equals(key: impl Into<String>, value: &str) -> Self {
        Self(vec![LabelRequirement::new(
            key,
            SelectorOperator::Equals,
            &[value],
        )])
    }

    /// Extend this selector with a `key=value` requirement
    pub fn with_equals(mut self, key: impl Into<String>, value: &str) -> Self {
        self.0
            .push(LabelRequirement::new(key, SelectorOperator::Equals, &[value]));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        self.0.iter().try_for_each(LabelRequirement::validate)
    }

    /// Render as a Kubernetes label selector query string
    pub fn to_query(&self) -> String {
        self.0
            .iter()
            .map(LabelRequirement::render)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.0.iter().all(|r| r.matches(labels))
    }
}
