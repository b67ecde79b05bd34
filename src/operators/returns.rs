use anyhow::Result;

use crate::bytecode::{Insn, Operand, PoolEntry};
use crate::ir::Instruction;
use crate::method_info::MethodInfo;
use crate::opcodes;
use crate::operators::{MethodMutator, OperatorMetadata, Proposal};

/// Mutates returned values; every replacement is branch free.
pub(crate) struct ReturnVals;

impl MethodMutator for ReturnVals {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            name: "RETURN_VALS",
            id: "jmutate.operators.RETURN_VALS",
            description: "Mutates the return values of method calls",
        }
    }

    fn propose(&self, method: &MethodInfo, inst: &Instruction) -> Result<Option<Proposal>> {
        if method.is_void() {
            return Ok(None);
        }
        let proposal = match inst.opcode() {
            opcodes::IRETURN => Proposal::new(
                "replaced return of integer sized value with (x == 0 ? 1 : 0)",
                // (x | -x) >>> 31 is 1 for any non-zero x
                vec![
                    Insn::simple(opcodes::DUP),
                    Insn::simple(opcodes::INEG),
                    Insn::simple(opcodes::IOR),
                    Insn::push_int(31),
                    Insn::simple(opcodes::IUSHR),
                    Insn::simple(opcodes::ICONST_1),
                    Insn::simple(opcodes::IXOR),
                    Insn::simple(opcodes::IRETURN),
                ],
            ),
            opcodes::LRETURN => Proposal::new(
                "replaced return of long value with value + 1",
                simple(&[opcodes::LCONST_1, opcodes::LADD, opcodes::LRETURN]),
            ),
            opcodes::FRETURN => Proposal::new(
                "replaced return of float value with -(x + 1)",
                simple(&[opcodes::FCONST_1, opcodes::FADD, opcodes::FNEG, opcodes::FRETURN]),
            ),
            opcodes::DRETURN => Proposal::new(
                "replaced return of double value with -(x + 1)",
                simple(&[opcodes::DCONST_1, opcodes::DADD, opcodes::DNEG, opcodes::DRETURN]),
            ),
            opcodes::ARETURN => Proposal::new(
                "mutated return of Object value to ( if (x != null) null else throw new RuntimeException )",
                vec![
                    Insn::new(
                        opcodes::INVOKESTATIC,
                        Operand::NewConstant(PoolEntry::Methodref {
                            owner: "java/util/Objects".to_string(),
                            name: "requireNonNull".to_string(),
                            descriptor: "(Ljava/lang/Object;)Ljava/lang/Object;".to_string(),
                        }),
                    ),
                    Insn::simple(opcodes::POP),
                    Insn::simple(opcodes::ACONST_NULL),
                    Insn::simple(opcodes::ARETURN),
                ],
            ),
            _ => return Ok(None),
        };
        Ok(Some(proposal))
    }
}

fn simple(sequence: &[u8]) -> Vec<Insn> {
    sequence.iter().copied().map(Insn::simple).collect()
}
