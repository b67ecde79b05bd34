use tracing::trace;

use crate::cfg::BlockMap;
use crate::ir::{Instruction, LineNumber};
use crate::mutation::{Location, MutationDetails, MutationIdentifier};

/// Per-method state shared by every visitor in the chain.
pub(crate) struct MutationContext<'m> {
    location: Location,
    filename: Option<&'m str>,
    lines: &'m [LineNumber],
    blocks: &'m BlockMap,
    target: Option<&'m MutationIdentifier>,
    ordinal: usize,
    line: Option<u32>,
    mutations: Vec<MutationDetails>,
    applied: Vec<usize>,
}

impl<'m> MutationContext<'m> {
    pub(crate) fn new(
        location: Location,
        filename: Option<&'m str>,
        lines: &'m [LineNumber],
        blocks: &'m BlockMap,
        target: Option<&'m MutationIdentifier>,
    ) -> Self {
        Self {
            location,
            filename,
            lines,
            blocks,
            target,
            ordinal: 0,
            line: None,
            mutations: Vec::new(),
            applied: Vec::new(),
        }
    }

    /// Move to `inst`, picking up the line of the closest preceding table entry.
    pub(crate) fn advance(&mut self, inst: &Instruction) {
        self.ordinal = inst.ordinal;
        let covered = self
            .lines
            .partition_point(|entry| entry.start_pc <= inst.offset);
        if covered > 0 {
            self.line = Some(self.lines[covered - 1].line);
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.ordinal
    }

    #[cfg(test)]
    pub(crate) fn line(&self) -> Option<u32> {
        self.line
    }

    pub(crate) fn location(&self) -> &Location {
        &self.location
    }

    pub(crate) fn identifier(&self, operator: &str) -> MutationIdentifier {
        MutationIdentifier::new(self.location.clone(), self.ordinal, operator)
    }

    pub(crate) fn register(
        &mut self,
        id: MutationIdentifier,
        description: impl Into<String>,
        mutator: &str,
    ) -> &MutationDetails {
        let details = MutationDetails {
            block: self.blocks.block_of(id.first_index()),
            id,
            description: description.into(),
            line: self.line,
            mutator: mutator.to_string(),
            filename: self.filename.map(str::to_string),
            in_finally_block: false,
        };
        trace!(id = %details.id, description = %details.description, "registered mutation");
        self.mutations.push(details);
        &self.mutations[self.mutations.len() - 1]
    }

    /// True the first time `id` hits an index covered by the target.
    pub(crate) fn should_apply(&mut self, id: &MutationIdentifier) -> bool {
        let Some(target) = self.target else {
            return false;
        };
        let index = id.first_index();
        if !target.matches(id) || self.applied.contains(&index) {
            return false;
        }
        self.applied.push(index);
        true
    }

    /// True once every index of the target has been replaced.
    pub(crate) fn applied(&self) -> bool {
        self.target.is_some_and(|target| {
            target
                .indexes
                .iter()
                .all(|index| self.applied.contains(index))
        })
    }

    pub(crate) fn into_mutations(self) -> Vec<MutationDetails> {
        self.mutations
    }
}
