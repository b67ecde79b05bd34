use regex::Regex;

use crate::filters::{FilterKind, MethodScan, MutationFilter};
use crate::ir::Class;
use crate::mutation::MutationDetails;

/// Drops every mutation of classes produced by the Groovy compiler.
pub(crate) struct GroovyFilter {
    interfaces: Vec<String>,
    class_patterns: Vec<Regex>,
}

impl GroovyFilter {
    pub(crate) fn new(interfaces: Vec<String>, class_patterns: Vec<Regex>) -> Self {
        Self {
            interfaces,
            class_patterns,
        }
    }

    fn is_groovy(&self, class: &Class) -> bool {
        class
            .interfaces
            .iter()
            .any(|interface| self.interfaces.contains(interface))
            || self
                .class_patterns
                .iter()
                .any(|pattern| pattern.is_match(&class.name))
    }
}

impl MutationFilter for GroovyFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Groovy
    }

    fn apply(
        &self,
        class: &Class,
        _scan: &MethodScan<'_>,
        mutations: Vec<MutationDetails>,
    ) -> Vec<MutationDetails> {
        if self.is_groovy(class) {
            Vec::new()
        } else {
            mutations
        }
    }
}
