//! Test and production-code identifiers.
//!
//! Both [`TestCase`] and [`ChangedEntity`] use the textual form
//! `[module§]clazz[#method]` and serialize as plain strings, so they work as
//! JSON object keys without any mapper registration.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

const MODULE_SEPARATOR: char = '§';
const METHOD_SEPARATOR: char = '#';

/// Parsed parts of an identifier: (module, clazz, method).
type Parts = (Option<String>, String, Option<String>);

fn parse_parts(raw: &str) -> Result<Parts, String> {
    let raw = raw.trim();
    let (module, rest) = match raw.split_once(MODULE_SEPARATOR) {
        Some((module, rest)) if !module.is_empty() => (Some(module.to_string()), rest),
        Some((_, rest)) => (None, rest),
        None => (None, raw),
    };
    let (clazz, method) = match rest.split_once(METHOD_SEPARATOR) {
        Some((clazz, method)) if !method.is_empty() => (clazz, Some(method.to_string())),
        Some((clazz, _)) => (clazz, None),
        None => (rest, None),
    };
    if clazz.is_empty() {
        return Err(format!("identifier {:?} has no class part", raw));
    }
    Ok((module, clazz.to_string(), method))
}

fn write_parts(
    f: &mut fmt::Formatter<'_>,
    module: &Option<String>,
    clazz: &str,
    method: &Option<String>,
) -> fmt::Result {
    if let Some(module) = module {
        write!(f, "{}{}", module, MODULE_SEPARATOR)?;
    }
    f.write_str(clazz)?;
    if let Some(method) = method {
        write!(f, "{}{}", METHOD_SEPARATOR, method)?;
    }
    Ok(())
}

/// Fully qualified identifier of a single executable test.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TestCase {
    pub module: Option<String>,
    pub clazz: String,
    pub method: Option<String>,
}

impl TestCase {
    pub fn new(clazz: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            module: None,
            clazz: clazz.into(),
            method: Some(method.into()),
        }
    }

    /// `clazz#method`, the form shown to users and used to cross-reference
    /// the selection views.
    pub fn executable(&self) -> String {
        match &self.method {
            Some(method) => format!("{}{}{}", self.clazz, METHOD_SEPARATOR, method),
            None => self.clazz.clone(),
        }
    }

    /// Class name without its package.
    pub fn short_clazz(&self) -> &str {
        self.clazz.rsplit('.').next().unwrap_or(&self.clazz)
    }
}

impl FromStr for TestCase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (module, clazz, method) = parse_parts(s)?;
        Ok(Self {
            module,
            clazz,
            method,
        })
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_parts(f, &self.module, &self.clazz, &self.method)
    }
}

impl Serialize for TestCase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TestCase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Identifier of a changed production-code unit (class or method).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChangedEntity {
    pub module: Option<String>,
    pub clazz: String,
    pub method: Option<String>,
}

impl ChangedEntity {
    pub fn class(clazz: impl Into<String>) -> Self {
        Self {
            module: None,
            clazz: clazz.into(),
            method: None,
        }
    }
}

impl FromStr for ChangedEntity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (module, clazz, method) = parse_parts(s)?;
        Ok(Self {
            module,
            clazz,
            method,
        })
    }
}

impl fmt::Display for ChangedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_parts(f, &self.module, &self.clazz, &self.method)
    }
}

impl Serialize for ChangedEntity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChangedEntity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Ordered collection of unique tests selected by one strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<TestCase>", into = "Vec<TestCase>")]
pub struct TestSet {
    tests: Vec<TestCase>,
    seen: BTreeSet<TestCase>,
}

impl TestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a test, keeping first-seen order. Returns `false` for duplicates.
    pub fn insert(&mut self, test: TestCase) -> bool {
        if !self.seen.insert(test.clone()) {
            return false;
        }
        self.tests.push(test);
        true
    }

    pub fn tests(&self) -> &[TestCase] {
        &self.tests
    }

    pub fn contains(&self, test: &TestCase) -> bool {
        self.seen.contains(test)
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Test identifiers in set order.
    pub fn executables(&self) -> Vec<String> {
        self.tests.iter().map(TestCase::executable).collect()
    }
}

impl From<Vec<TestCase>> for TestSet {
    fn from(tests: Vec<TestCase>) -> Self {
        tests.into_iter().collect()
    }
}

impl From<TestSet> for Vec<TestCase> {
    fn from(set: TestSet) -> Self {
        set.tests
    }
}

impl FromIterator<TestCase> for TestSet {
    fn from_iter<I: IntoIterator<Item = TestCase>>(iter: I) -> Self {
        let mut set = TestSet::new();
        for test in iter {
            set.insert(test);
        }
        set
    }
}
