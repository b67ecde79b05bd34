use anyhow::Result;

use crate::ir::Instruction;
use crate::method_info::MethodInfo;
use crate::opcodes;
use crate::operators::{MethodMutator, OperatorMetadata, Proposal};

/// Removes unary negation so `-x` evaluates to `x`.
pub(crate) struct InvertNegs;

impl MethodMutator for InvertNegs {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            name: "INVERT_NEGS",
            id: "jmutate.operators.INVERT_NEGS",
            description: "Inverts negation of numeric values",
        }
    }

    fn propose(&self, _method: &MethodInfo, inst: &Instruction) -> Result<Option<Proposal>> {
        let is_negation = matches!(
            inst.opcode(),
            opcodes::INEG | opcodes::LNEG | opcodes::FNEG | opcodes::DNEG
        );
        Ok(is_negation.then(|| Proposal::new("removed negation", Vec::new())))
    }
}
