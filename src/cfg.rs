use std::collections::BTreeSet;

use crate::bytecode::{is_conditional_branch, is_exit_opcode, is_switch, is_unconditional_branch};
use crate::ir::Method;

/// Basic-block index of every instruction in a method.
#[derive(Clone, Debug, Default)]
pub(crate) struct BlockMap {
    blocks: Vec<u32>,
}

impl BlockMap {
    /// Number blocks from leader offsets: branch and switch targets, the
    /// instruction after any jump or exit, and handler entries.
    pub(crate) fn build(method: &Method) -> Self {
        let mut leaders = BTreeSet::new();
        for handler in &method.exception_handlers {
            leaders.insert(handler.handler_pc);
        }
        for (inst, next) in method
            .instructions
            .iter()
            .zip(method.instructions.iter().skip(1))
        {
            let opcode = inst.opcode();
            let jumps = is_conditional_branch(opcode)
                || is_unconditional_branch(opcode)
                || is_switch(opcode);
            if jumps {
                leaders.extend(inst.insn.branch_targets());
            }
            if jumps || is_exit_opcode(opcode) {
                leaders.insert(next.offset);
            }
        }
        if let Some(last) = method.instructions.last() {
            // the last instruction has no successor but may still be a target
            leaders.extend(last.insn.branch_targets());
        }

        let mut blocks = Vec::with_capacity(method.instructions.len());
        let mut current = 0u32;
        for inst in &method.instructions {
            if inst.ordinal > 0 && leaders.contains(&inst.offset) {
                current += 1;
            }
            blocks.push(current);
        }
        Self { blocks }
    }

    pub(crate) fn block_of(&self, ordinal: usize) -> u32 {
        self.blocks.get(ordinal).copied().unwrap_or_default()
    }

    pub(crate) fn block_count(&self) -> u32 {
        self.blocks.last().map(|last| last + 1).unwrap_or(0)
    }
}
