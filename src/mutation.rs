use std::fmt;

use serde::{Deserialize, Serialize};

/// A method within a class: internal class name, method name, descriptor.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Location {
    pub class_name: String,
    pub method_name: String,
    pub method_descriptor: String,
}

impl Location {
    pub fn new(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        method_descriptor: impl Into<String>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            method_descriptor: method_descriptor.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}{}",
            self.class_name, self.method_name, self.method_descriptor
        )
    }
}

/// Stable identity of a mutation.
///
/// Identity is positional: `indexes` are instruction ordinals within the
/// method, so an identifier is only meaningful against the exact class bytes
/// it was produced from.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MutationIdentifier {
    pub location: Location,
    pub indexes: Vec<usize>,
    pub operator: String,
}

impl MutationIdentifier {
    pub fn new(location: Location, index: usize, operator: impl Into<String>) -> Self {
        Self {
            location,
            indexes: vec![index],
            operator: operator.into(),
        }
    }

    /// Same identity covering several instruction ordinals.
    pub fn with_indexes(&self, mut indexes: Vec<usize>) -> Self {
        indexes.sort_unstable();
        indexes.dedup();
        Self {
            location: self.location.clone(),
            indexes,
            operator: self.operator.clone(),
        }
    }

    pub fn first_index(&self) -> usize {
        self.indexes.first().copied().unwrap_or_default()
    }

    pub fn class_name(&self) -> &str {
        &self.location.class_name
    }

    /// True if this identifier covers `other`'s first instruction with the same operator.
    pub fn matches(&self, other: &MutationIdentifier) -> bool {
        self.location == other.location
            && self.operator == other.operator
            && self.indexes.contains(&other.first_index())
    }
}

impl fmt::Display for MutationIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indexes = self
            .indexes
            .iter()
            .map(|index| index.to_string())
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{} [{}] {}", self.location, indexes, self.operator)
    }
}

/// A proposed mutation and the metadata drivers need to schedule and report it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MutationDetails {
    pub id: MutationIdentifier,
    pub description: String,
    /// Source line from the LineNumberTable, if the class carries debug info.
    pub line: Option<u32>,
    pub block: u32,
    /// Human name of the operator that produced this mutation.
    pub mutator: String,
    pub filename: Option<String>,
    #[serde(default)]
    pub in_finally_block: bool,
}

impl MutationDetails {
    pub fn class_name(&self) -> &str {
        self.id.class_name()
    }

    pub fn method_name(&self) -> &str {
        &self.id.location.method_name
    }

    pub fn first_index(&self) -> usize {
        self.id.first_index()
    }
}

/// A rewritten class containing exactly one applied mutation.
#[derive(Clone, Debug)]
pub struct Mutant {
    pub details: MutationDetails,
    pub bytes: Vec<u8>,
}
