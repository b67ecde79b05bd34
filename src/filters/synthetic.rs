use regex::Regex;

use crate::filters::{FilterKind, MethodScan, MutationFilter};
use crate::ir::Class;
use crate::mutation::MutationDetails;

/// Drops mutations in bridge and synthetic methods, except those whose name
/// is allow-listed (lambda bodies are synthetic but hold user code).
pub(crate) struct SyntheticFilter {
    allowlist: Vec<Regex>,
}

impl SyntheticFilter {
    pub(crate) fn new(allowlist: Vec<Regex>) -> Self {
        Self { allowlist }
    }
}

impl MutationFilter for SyntheticFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Bridge
    }

    fn apply(
        &self,
        _class: &Class,
        scan: &MethodScan<'_>,
        mutations: Vec<MutationDetails>,
    ) -> Vec<MutationDetails> {
        let generated = scan.info.is_bridge() || scan.info.is_synthetic();
        if !generated {
            return mutations;
        }
        let name = scan.info.name();
        if self.allowlist.iter().any(|pattern| pattern.is_match(name)) {
            mutations
        } else {
            Vec::new()
        }
    }
}
