//! Users being evaluated
//!
//! Users are supplied per call and never stored by the engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Attribute value on a user or in a targeting rule
///
/// Booleans, integers and floats compare numerically, with `true` as 1 and
/// `false` as 0, so `Int(1) == Float(1.0) == Bool(true)`. Integer to float
/// comparison is exact, including beyond 2^53. Strings only equal strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        use AttributeValue::*;

        match (self, other) {
            (String(a), String(b)) => a == b,
            (String(_), _) | (_, String(_)) => false,
            (Float(a), Float(b)) => a == b,
            (Float(f), v) | (v, Float(f)) => v.integral().is_some_and(|i| int_eq_float(i, *f)),
            _ => self.integral() == other.integral(),
        }
    }
}

impl AttributeValue {
    /// Integer view of a boolean or integer
    fn integral(&self) -> Option<i64> {
        match self {
            AttributeValue::Bool(b) => Some(i64::from(*b)),
            AttributeValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

// i64 covers [-2^63, 2^63); both bounds are exact in f64
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn int_eq_float(i: i64, f: f64) -> bool {
    f.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&f) && f as i64 == i
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Float(x) => write!(f, "{}", x),
            AttributeValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(i64::from(value))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

/// User a flag is evaluated for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier; the rollout bucket is derived from it
    pub id: String,

    pub email: String,

    /// Group memberships (e.g. "premium", "beta")
    #[serde(default)]
    pub groups: Vec<String>,

    /// Free-form attributes for equality targeting
    #[serde(default)]
    pub attributes: HashMap<String, AttributeValue>,
}

impl User {
    /// Create a user with no groups or attributes
    ///
    /// # Examples
    ///
    /// ```
    /// use vexil_features::User;
    ///
    /// let user = User::new("2", "user2@test.com")
    ///     .with_group("premium")
    ///     .with_attribute("country", "NZ")
    ///     .with_attribute("age", 31);
    ///
    /// assert!(user.in_group("premium"));
    /// ```
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            groups: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    /// Add a group membership
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Add several group memberships
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Set an attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_cross_equality() {
        assert_eq!(AttributeValue::Int(1), AttributeValue::Float(1.0));
        assert_eq!(AttributeValue::Float(2.0), AttributeValue::Int(2));
        assert_ne!(AttributeValue::Int(1), AttributeValue::Float(1.5));
    }

    #[test]
    fn test_bool_compares_as_number() {
        assert_eq!(AttributeValue::Bool(true), AttributeValue::Int(1));
        assert_eq!(AttributeValue::Int(0), AttributeValue::Bool(false));
        assert_eq!(AttributeValue::Bool(true), AttributeValue::Float(1.0));
        assert_ne!(AttributeValue::Bool(true), AttributeValue::Int(2));
        assert_ne!(AttributeValue::Bool(false), AttributeValue::Float(0.5));
    }

    #[test]
    fn test_strings_only_equal_strings() {
        assert_ne!(AttributeValue::from("1"), AttributeValue::Int(1));
        assert_ne!(AttributeValue::from("true"), AttributeValue::Bool(true));
        assert_eq!(AttributeValue::from("pro"), AttributeValue::from("pro"));
    }

    #[test]
    fn test_large_int_float_comparison_is_exact() {
        // 2^53 + 1 has no exact f64; the nearest float is 2^53
        let int = AttributeValue::Int(9_007_199_254_740_993);
        assert_ne!(int, AttributeValue::Float(9_007_199_254_740_992.0));
        assert_eq!(
            AttributeValue::Int(9_007_199_254_740_992),
            AttributeValue::Float(9_007_199_254_740_992.0)
        );
        assert_eq!(AttributeValue::Int(i64::MIN), AttributeValue::Float(-9_223_372_036_854_775_808.0));
        assert_ne!(AttributeValue::Int(i64::MAX), AttributeValue::Float(9_223_372_036_854_775_808.0));
        assert_ne!(AttributeValue::Int(0), AttributeValue::Float(f64::NAN));
        assert_ne!(AttributeValue::Int(1), AttributeValue::Float(f64::INFINITY));
    }

    #[test]
    fn test_attribute_deserialization() {
        let user: User = serde_json::from_str(
            r#"{"id":"7","email":"a@b.c","attributes":{"plan":"pro","seats":5,"ratio":0.5,"beta":true}}"#,
        )
        .unwrap();

        assert!(user.groups.is_empty());
        assert_eq!(user.attribute("plan"), Some(&AttributeValue::from("pro")));
        assert_eq!(user.attribute("seats"), Some(&AttributeValue::Int(5)));
        assert_eq!(user.attribute("ratio"), Some(&AttributeValue::Float(0.5)));
        assert_eq!(user.attribute("beta"), Some(&AttributeValue::Bool(true)));
    }

    #[test]
    fn test_user_builder() {
        let user = User::new("1", "user1@test.com")
            .with_groups(["free", "beta"])
            .with_attribute("country", "NZ");

        assert!(user.in_group("beta"));
        assert!(!user.in_group("premium"));
        assert_eq!(user.attribute("missing"), None);
    }
}
