//! Spec type shared by unit tests.

use std::fmt;

use crate::model::ResourceSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestKind {
    Group,
    Member,
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestSpec {
    pub kind: TestKind,
    pub value: String,
    pub parents: Vec<String>,
}

impl TestSpec {
    pub fn new(value: &str) -> Self {
        Self {
            kind: TestKind::Group,
            value: value.to_string(),
            parents: Vec::new(),
        }
    }

    pub fn member(value: &str, parents: &[&str]) -> Self {
        Self {
            kind: TestKind::Member,
            value: value.to_string(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl ResourceSpec for TestSpec {
    type Kind = TestKind;

    fn kind(&self) -> TestKind {
        self.kind
    }
}
