use anyhow::Result;

use crate::bytecode::{Insn, Operand};
use crate::ir::Instruction;
use crate::method_info::MethodInfo;
use crate::opcodes;
use crate::operators::{MethodMutator, OperatorMetadata, Proposal};

/// Substitutes inline constants. Pool constants loaded with `ldc` are left alone.
pub(crate) struct InlineConsts;

impl MethodMutator for InlineConsts {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            name: "INLINE_CONSTS",
            id: "jmutate.operators.INLINE_CONSTS",
            description: "Mutates inline constants",
        }
    }

    fn propose(&self, _method: &MethodInfo, inst: &Instruction) -> Result<Option<Proposal>> {
        if let Some(value) = int_constant(inst) {
            let mutated = if value == 1 { 0 } else { value + 1 };
            return Ok(Some(Proposal::new(
                format!("Substituted {value} with {mutated}"),
                vec![Insn::push_int(mutated)],
            )));
        }
        let (opcode, from, to) = match inst.opcode() {
            opcodes::LCONST_0 => (opcodes::LCONST_1, "0", "1"),
            opcodes::LCONST_1 => (opcodes::LCONST_0, "1", "0"),
            opcodes::FCONST_0 => (opcodes::FCONST_1, "0.0", "1.0"),
            opcodes::FCONST_1 => (opcodes::FCONST_0, "1.0", "0.0"),
            opcodes::FCONST_2 => (opcodes::FCONST_1, "2.0", "1.0"),
            opcodes::DCONST_0 => (opcodes::DCONST_1, "0.0", "1.0"),
            opcodes::DCONST_1 => (opcodes::DCONST_0, "1.0", "0.0"),
            _ => return Ok(None),
        };
        Ok(Some(Proposal::new(
            format!("Substituted {from} with {to}"),
            vec![Insn::simple(opcode)],
        )))
    }
}

fn int_constant(inst: &Instruction) -> Option<i32> {
    match (inst.opcode(), &inst.insn.operand) {
        (opcodes::ICONST_M1..=opcodes::ICONST_5, _) => {
            Some(inst.opcode() as i32 - opcodes::ICONST_0 as i32)
        }
        (opcodes::BIPUSH, Operand::Byte(value)) => Some(*value as i32),
        (opcodes::SIPUSH, Operand::Short(value)) => Some(*value as i32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::test_support::{inst, method, with_operand};

    fn propose(inst: &Instruction) -> Proposal {
        InlineConsts
            .propose(&method("()V"), inst)
            .expect("propose")
            .expect("mutation")
    }

    #[test]
    fn one_becomes_zero_and_others_increment() {
        let one = propose(&inst(opcodes::ICONST_1));
        assert_eq!(one.description, "Substituted 1 with 0");
        assert_eq!(one.replacement, vec![Insn::simple(opcodes::ICONST_0)]);

        let minus_one = propose(&inst(opcodes::ICONST_M1));
        assert_eq!(minus_one.replacement, vec![Insn::simple(opcodes::ICONST_0)]);
    }

    #[test]
    fn widening_push_when_value_outgrows_its_encoding() {
        let proposal = propose(&with_operand(opcodes::BIPUSH, Operand::Byte(127)));

        assert_eq!(proposal.description, "Substituted 127 with 128");
        assert_eq!(
            proposal.replacement,
            vec![Insn::new(opcodes::SIPUSH, Operand::Short(128))]
        );
    }

    #[test]
    fn floating_constants_follow_fixed_table() {
        assert_eq!(propose(&inst(opcodes::FCONST_2)).description, "Substituted 2.0 with 1.0");
        assert_eq!(
            propose(&inst(opcodes::DCONST_0)).replacement,
            vec![Insn::simple(opcodes::DCONST_1)]
        );
        assert!(InlineConsts
            .propose(&method("()V"), &with_operand(opcodes::LDC, Operand::Constant(3)))
            .expect("propose")
            .is_none());
    }
}
