use anyhow::Result;

use crate::bytecode::Insn;
use crate::ir::Instruction;
use crate::method_info::MethodInfo;
use crate::opcodes;
use crate::operators::{MethodMutator, OperatorMetadata, Proposal};

/// Swaps binary arithmetic and bitwise operators for their complement.
pub(crate) struct Math;

impl MethodMutator for Math {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            name: "MATH",
            id: "jmutate.operators.MATH",
            description: "Replaces binary arithmetic operations with another operation",
        }
    }

    fn propose(&self, _method: &MethodInfo, inst: &Instruction) -> Result<Option<Proposal>> {
        Ok(replacement(inst.opcode()).map(|(opcode, description)| {
            Proposal::new(description, vec![Insn::simple(opcode)])
        }))
    }
}

fn replacement(opcode: u8) -> Option<(u8, &'static str)> {
    let mapped = match opcode {
        opcodes::IADD => (opcodes::ISUB, "Replaced integer addition with subtraction"),
        opcodes::ISUB => (opcodes::IADD, "Replaced integer subtraction with addition"),
        opcodes::IMUL => (opcodes::IDIV, "Replaced integer multiplication with division"),
        opcodes::IDIV => (opcodes::IMUL, "Replaced integer division with multiplication"),
        opcodes::IREM => (opcodes::IMUL, "Replaced integer modulus with multiplication"),
        opcodes::IOR => (opcodes::IAND, "Replaced bitwise OR with AND"),
        opcodes::IAND => (opcodes::IOR, "Replaced bitwise AND with OR"),
        opcodes::IXOR => (opcodes::IAND, "Replaced XOR with AND"),
        opcodes::ISHL => (opcodes::ISHR, "Replaced Shift Left with Shift Right"),
        opcodes::ISHR => (opcodes::ISHL, "Replaced Shift Right with Shift Left"),
        opcodes::IUSHR => (opcodes::ISHL, "Replaced Unsigned Shift Right with Shift Left"),

        opcodes::LADD => (opcodes::LSUB, "Replaced long addition with subtraction"),
        opcodes::LSUB => (opcodes::LADD, "Replaced long subtraction with addition"),
        opcodes::LMUL => (opcodes::LDIV, "Replaced long multiplication with division"),
        opcodes::LDIV => (opcodes::LMUL, "Replaced long division with multiplication"),
        opcodes::LREM => (opcodes::LMUL, "Replaced long modulus with multiplication"),
        opcodes::LOR => (opcodes::LAND, "Replaced bitwise OR with AND"),
        opcodes::LAND => (opcodes::LOR, "Replaced bitwise AND with OR"),
        opcodes::LXOR => (opcodes::LAND, "Replaced XOR with AND"),
        opcodes::LSHL => (opcodes::LSHR, "Replaced Shift Left with Shift Right"),
        opcodes::LSHR => (opcodes::LSHL, "Replaced Shift Right with Shift Left"),
        opcodes::LUSHR => (opcodes::LSHL, "Replaced Unsigned Shift Right with Shift Left"),

        opcodes::FADD => (opcodes::FSUB, "Replaced float addition with subtraction"),
        opcodes::FSUB => (opcodes::FADD, "Replaced float subtraction with addition"),
        opcodes::FMUL => (opcodes::FDIV, "Replaced float multiplication with division"),
        opcodes::FDIV => (opcodes::FMUL, "Replaced float division with multiplication"),
        opcodes::FREM => (opcodes::FMUL, "Replaced float modulus with multiplication"),

        opcodes::DADD => (opcodes::DSUB, "Replaced double addition with subtraction"),
        opcodes::DSUB => (opcodes::DADD, "Replaced double subtraction with addition"),
        opcodes::DMUL => (opcodes::DDIV, "Replaced double multiplication with division"),
        opcodes::DDIV => (opcodes::DMUL, "Replaced double division with multiplication"),
        opcodes::DREM => (opcodes::DMUL, "Replaced double modulus with multiplication"),
        _ => return None,
    };
    Some(mapped)
}
