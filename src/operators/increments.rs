use anyhow::Result;

use crate::bytecode::{Insn, Operand};
use crate::ir::Instruction;
use crate::method_info::MethodInfo;
use crate::opcodes;
use crate::operators::{MethodMutator, OperatorMetadata, Proposal};

/// Negates the delta of local variable increments.
pub(crate) struct Increments;

impl MethodMutator for Increments {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            name: "INCREMENTS",
            id: "jmutate.operators.INCREMENTS",
            description: "Replaces increments of local variables with decrements and vice versa",
        }
    }

    fn propose(&self, _method: &MethodInfo, inst: &Instruction) -> Result<Option<Proposal>> {
        let Some((index, delta)) = iinc(inst) else {
            return Ok(None);
        };
        // -32768 has no 16-bit negation
        let Some(negated) = delta.checked_neg() else {
            return Ok(None);
        };
        Ok(Some(Proposal::new(
            format!("Changed increment from {delta} to {negated}"),
            vec![Insn::new(
                opcodes::IINC,
                Operand::Iinc {
                    index,
                    delta: negated,
                },
            )],
        )))
    }
}

/// Drops local variable increments.
pub(crate) struct RemoveIncrements;

impl MethodMutator for RemoveIncrements {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            name: "REMOVE_INCREMENTS",
            id: "jmutate.operators.REMOVE_INCREMENTS",
            description: "Removes increments of local variables",
        }
    }

    fn propose(&self, _method: &MethodInfo, inst: &Instruction) -> Result<Option<Proposal>> {
        Ok(iinc(inst).map(|(_, delta)| Proposal::new(format!("Removed increment {delta}"), Vec::new())))
    }
}

fn iinc(inst: &Instruction) -> Option<(u16, i16)> {
    match inst.insn.operand {
        Operand::Iinc { index, delta } if inst.opcode() == opcodes::IINC => Some((index, delta)),
        _ => None,
    }
}
