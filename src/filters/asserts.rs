use crate::bytecode::Operand;
use crate::filters::{drop_ordinals, FilterKind, MethodScan, MutationFilter};
use crate::ir::{Class, Instruction};
use crate::mutation::MutationDetails;
use crate::opcodes;

const ASSERTIONS_DISABLED: &str = "$assertionsDisabled";

/// Suppresses mutations in the code javac generates for `assert`.
pub(crate) struct AssertFilter;

impl MutationFilter for AssertFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Assert
    }

    fn apply(
        &self,
        _class: &Class,
        scan: &MethodScan<'_>,
        mutations: Vec<MutationDetails>,
    ) -> Vec<MutationDetails> {
        let instructions = &scan.method.instructions;
        let mut ranges = Vec::new();
        for (inst, next) in instructions.iter().zip(instructions.iter().skip(1)) {
            // getstatic $assertionsDisabled; ifne <after assert>
            if is_flag_access(inst, opcodes::GETSTATIC) && next.opcode() == opcodes::IFNE {
                let Operand::Branch(target) = next.insn.operand else {
                    continue;
                };
                if let Some(end) = scan.method.ordinal_at(target) {
                    if end > inst.ordinal {
                        ranges.push((inst.ordinal, end - 1));
                    }
                }
            }
            // desiredAssertionStatus() ... putstatic $assertionsDisabled
            if is_desired_assertion_status(inst) {
                if let Some(store) = instructions[inst.ordinal..]
                    .iter()
                    .find(|candidate| is_flag_access(candidate, opcodes::PUTSTATIC))
                {
                    ranges.push((inst.ordinal, store.ordinal));
                }
            }
        }
        drop_ordinals(mutations, &ranges)
    }
}

fn is_flag_access(inst: &Instruction, opcode: u8) -> bool {
    inst.opcode() == opcode
        && inst
            .field()
            .is_some_and(|field| field.name == ASSERTIONS_DISABLED && field.descriptor == "Z")
}

fn is_desired_assertion_status(inst: &Instruction) -> bool {
    inst.call().is_some_and(|call| {
        call.owner == "java/lang/Class" && call.name == "desiredAssertionStatus"
    })
}
