use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;

use crate::filters::{FilterKind, MethodScan, MutationFilter};
use crate::ir::{Class, Method};
use crate::mutation::MutationDetails;
use crate::opcodes;

/// Collapses the copies of a mutation that javac produces when it inlines a
/// `finally` block on every exit path.
///
/// Copies share operator, line and description, live in different blocks,
/// and at least one of them sits in a catch-all handler. They are merged into
/// one mutation covering every copy's ordinal.
pub(crate) struct InlinedFinallyFilter;

impl MutationFilter for InlinedFinallyFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::InlinedFinally
    }

    fn apply(
        &self,
        _class: &Class,
        scan: &MethodScan<'_>,
        mutations: Vec<MutationDetails>,
    ) -> Vec<MutationDetails> {
        let regions = catch_all_regions(scan.method);
        if regions.is_empty() {
            return mutations;
        }

        let mut groups: HashMap<(&str, u32, &str), Vec<usize>> = HashMap::new();
        for (position, details) in mutations.iter().enumerate() {
            let Some(line) = details.line else {
                continue;
            };
            groups
                .entry((details.mutator.as_str(), line, details.description.as_str()))
                .or_default()
                .push(position);
        }

        // position of the representative -> merged replacement; others vanish
        let mut merged = HashMap::new();
        let mut absorbed = BTreeSet::new();
        for positions in groups.into_values() {
            if positions.len() < 2 {
                continue;
            }
            let blocks = positions
                .iter()
                .map(|&position| scan.blocks.block_of(mutations[position].first_index()))
                .collect::<BTreeSet<_>>();
            let in_handler = positions.iter().any(|&position| {
                let ordinal = mutations[position].first_index();
                regions.iter().any(|region| region.contains(&ordinal))
            });
            if blocks.len() < 2 || !in_handler {
                continue;
            }

            let first = &mutations[positions[0]];
            let indexes = positions
                .iter()
                .flat_map(|&position| mutations[position].id.indexes.iter().copied())
                .collect();
            merged.insert(
                positions[0],
                MutationDetails {
                    id: first.id.with_indexes(indexes),
                    in_finally_block: true,
                    ..first.clone()
                },
            );
            absorbed.extend(positions[1..].iter().copied());
        }

        mutations
            .into_iter()
            .enumerate()
            .filter(|(position, _)| !absorbed.contains(position))
            .map(|(position, details)| merged.remove(&position).unwrap_or(details))
            .collect()
    }
}

/// Ordinal ranges from each catch-all handler entry to the first `athrow`
/// after it.
fn catch_all_regions(method: &Method) -> Vec<RangeInclusive<usize>> {
    method
        .exception_handlers
        .iter()
        .filter(|handler| handler.catch_type.is_none())
        .filter_map(|handler| {
            let start = method.ordinal_at(handler.handler_pc)?;
            let end = method.instructions[start..]
                .iter()
                .find(|inst| inst.opcode() == opcodes::ATHROW)
                .map_or(method.instructions.len().saturating_sub(1), |inst| {
                    inst.ordinal
                });
            Some(start..=end)
        })
        .collect()
}
