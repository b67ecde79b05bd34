use anyhow::Result;

use crate::bytecode::{Insn, Operand};
use crate::ir::Instruction;
use crate::method_info::MethodInfo;
use crate::opcodes;
use crate::operators::{MethodMutator, OperatorMetadata, Proposal};

/// Replaces each conditional jump with its opposite predicate.
pub(crate) struct NegateConditionals;

impl MethodMutator for NegateConditionals {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            name: "NEGATE_CONDITIONALS",
            id: "jmutate.operators.NEGATE_CONDITIONALS",
            description: "Negates conditional branches",
        }
    }

    fn propose(&self, _method: &MethodInfo, inst: &Instruction) -> Result<Option<Proposal>> {
        Ok(negated(inst.opcode()).map(|opcode| {
            Proposal::new(
                "negated conditional",
                vec![Insn::new(opcode, inst.insn.operand.clone())],
            )
        }))
    }
}

/// Moves the boundary of ordering comparisons: `<` and `<=`, `>` and `>=`.
pub(crate) struct ConditionalsBoundary;

impl MethodMutator for ConditionalsBoundary {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata {
            name: "CONDITIONALS_BOUNDARY",
            id: "jmutate.operators.CONDITIONALS_BOUNDARY",
            description: "Replaces relational operators with their boundary counterpart",
        }
    }

    fn propose(&self, _method: &MethodInfo, inst: &Instruction) -> Result<Option<Proposal>> {
        let opcode = match inst.opcode() {
            opcodes::IFLT => opcodes::IFLE,
            opcodes::IFLE => opcodes::IFLT,
            opcodes::IFGT => opcodes::IFGE,
            opcodes::IFGE => opcodes::IFGT,
            opcodes::IF_ICMPLT => opcodes::IF_ICMPLE,
            opcodes::IF_ICMPLE => opcodes::IF_ICMPLT,
            opcodes::IF_ICMPGT => opcodes::IF_ICMPGE,
            opcodes::IF_ICMPGE => opcodes::IF_ICMPGT,
            _ => return Ok(None),
        };
        Ok(Some(Proposal::new(
            "changed conditional boundary",
            vec![Insn::new(opcode, inst.insn.operand.clone())],
        )))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Comparison {
    Equality,
    Ordering,
}

/// Which side of the conditional survives the removal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Survivor {
    /// The guarded block always runs; the jump is never taken.
    If,
    /// The jump is always taken.
    Else,
}

/// Removes a conditional so that one side always executes.
pub(crate) struct RemoveConditionals {
    metadata: OperatorMetadata,
    comparison: Comparison,
    survivor: Survivor,
}

pub(crate) static REMOVE_EQUAL_IF: RemoveConditionals = RemoveConditionals {
    metadata: OperatorMetadata {
        name: "REMOVE_CONDITIONALS_EQUAL_IF",
        id: "jmutate.operators.REMOVE_CONDITIONALS_EQUAL_IF",
        description: "Removes equality conditionals so the guarded block always runs",
    },
    comparison: Comparison::Equality,
    survivor: Survivor::If,
};

pub(crate) static REMOVE_EQUAL_ELSE: RemoveConditionals = RemoveConditionals {
    metadata: OperatorMetadata {
        name: "REMOVE_CONDITIONALS_EQUAL_ELSE",
        id: "jmutate.operators.REMOVE_CONDITIONALS_EQUAL_ELSE",
        description: "Removes equality conditionals so the jump is always taken",
    },
    comparison: Comparison::Equality,
    survivor: Survivor::Else,
};

pub(crate) static REMOVE_ORDER_IF: RemoveConditionals = RemoveConditionals {
    metadata: OperatorMetadata {
        name: "REMOVE_CONDITIONALS_ORDER_IF",
        id: "jmutate.operators.REMOVE_CONDITIONALS_ORDER_IF",
        description: "Removes ordering conditionals so the guarded block always runs",
    },
    comparison: Comparison::Ordering,
    survivor: Survivor::If,
};

pub(crate) static REMOVE_ORDER_ELSE: RemoveConditionals = RemoveConditionals {
    metadata: OperatorMetadata {
        name: "REMOVE_CONDITIONALS_ORDER_ELSE",
        id: "jmutate.operators.REMOVE_CONDITIONALS_ORDER_ELSE",
        description: "Removes ordering conditionals so the jump is always taken",
    },
    comparison: Comparison::Ordering,
    survivor: Survivor::Else,
};

impl MethodMutator for RemoveConditionals {
    fn metadata(&self) -> OperatorMetadata {
        self.metadata
    }

    fn propose(&self, _method: &MethodInfo, inst: &Instruction) -> Result<Option<Proposal>> {
        let opcode = inst.opcode();
        if comparison(opcode) != Some(self.comparison) {
            return Ok(None);
        }
        let Operand::Branch(target) = inst.insn.operand else {
            anyhow::bail!("conditional without branch operand");
        };

        let two_operands = matches!(opcode, opcodes::IF_ICMPEQ..=opcodes::IF_ACMPNE);
        let mut replacement = vec![Insn::simple(if two_operands {
            opcodes::POP2
        } else {
            opcodes::POP
        })];
        let outcome = match self.survivor {
            Survivor::If => "true",
            Survivor::Else => {
                // a conditional jump keeps the fall-through reachable for the verifier
                replacement.push(Insn::simple(opcodes::ICONST_0));
                replacement.push(Insn::new(opcodes::IFEQ, Operand::Branch(target)));
                "false"
            }
        };
        let kind = match self.comparison {
            Comparison::Equality => "equality",
            Comparison::Ordering => "comparison",
        };
        Ok(Some(Proposal::new(
            format!("removed conditional - replaced {kind} check with {outcome}"),
            replacement,
        )))
    }
}

pub(crate) fn negated(opcode: u8) -> Option<u8> {
    let opposite = match opcode {
        opcodes::IFEQ => opcodes::IFNE,
        opcodes::IFNE => opcodes::IFEQ,
        opcodes::IFLT => opcodes::IFGE,
        opcodes::IFGE => opcodes::IFLT,
        opcodes::IFGT => opcodes::IFLE,
        opcodes::IFLE => opcodes::IFGT,
        opcodes::IF_ICMPEQ => opcodes::IF_ICMPNE,
        opcodes::IF_ICMPNE => opcodes::IF_ICMPEQ,
        opcodes::IF_ICMPLT => opcodes::IF_ICMPGE,
        opcodes::IF_ICMPGE => opcodes::IF_ICMPLT,
        opcodes::IF_ICMPGT => opcodes::IF_ICMPLE,
        opcodes::IF_ICMPLE => opcodes::IF_ICMPGT,
        opcodes::IF_ACMPEQ => opcodes::IF_ACMPNE,
        opcodes::IF_ACMPNE => opcodes::IF_ACMPEQ,
        opcodes::IFNULL => opcodes::IFNONNULL,
        opcodes::IFNONNULL => opcodes::IFNULL,
        _ => return None,
    };
    Some(opposite)
}

fn comparison(opcode: u8) -> Option<Comparison> {
    match opcode {
        opcodes::IFEQ
        | opcodes::IFNE
        | opcodes::IF_ICMPEQ
        | opcodes::IF_ICMPNE
        | opcodes::IF_ACMPEQ
        | opcodes::IF_ACMPNE
        | opcodes::IFNULL
        | opcodes::IFNONNULL => Some(Comparison::Equality),
        opcodes::IFLT
        | opcodes::IFGE
        | opcodes::IFGT
        | opcodes::IFLE
        | opcodes::IF_ICMPLT
        | opcodes::IF_ICMPGE
        | opcodes::IF_ICMPGT
        | opcodes::IF_ICMPLE => Some(Comparison::Ordering),
        _ => None,
    }
}
