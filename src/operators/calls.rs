use anyhow::{Context, Result};

use crate::bytecode::Insn;
use crate::descriptor::{self, JavaType};
use crate::ir::{CallKind, Instruction};
use crate::method_info::MethodInfo;
use crate::opcodes;
use crate::operators::{MethodMutator, OperatorMetadata, Proposal};

/// Removes method calls, selected by whether the callee returns a value.
pub(crate) struct MethodCalls {
    metadata: OperatorMetadata,
    void: bool,
}

pub(crate) static VOID_METHOD_CALLS: MethodCalls = MethodCalls {
    metadata: OperatorMetadata {
        name: "VOID_METHOD_CALLS",
        id: "jmutate.operators.VOID_METHOD_CALLS",
        description: "Removes calls to methods returning void",
    },
    void: true,
};

pub(crate) static NON_VOID_METHOD_CALLS: MethodCalls = MethodCalls {
    metadata: OperatorMetadata {
        name: "NON_VOID_METHOD_CALLS",
        id: "jmutate.operators.NON_VOID_METHOD_CALLS",
        description: "Replaces non-void method calls with the default value of their return type",
    },
    void: false,
};

impl MethodMutator for MethodCalls {
    fn metadata(&self) -> OperatorMetadata {
        self.metadata
    }

    fn propose(&self, _method: &MethodInfo, inst: &Instruction) -> Result<Option<Proposal>> {
        let Some(call) = inst.call() else {
            return Ok(None);
        };
        if call.name == "<init>" || descriptor::is_void(&call.descriptor) != self.void {
            return Ok(None);
        }
        let signature = descriptor::parse_method_type(&call.descriptor)
            .with_context(|| format!("call to {}::{}", call.owner, call.name))?;

        let mut replacement = signature
            .parameters
            .iter()
            .rev()
            .map(|ty| pop(ty.size()))
            .collect::<Vec<_>>();
        if call.kind != CallKind::Static {
            replacement.push(pop(1));
        }
        if let Some(zero) = zero_value(signature.return_type) {
            replacement.push(zero);
        }

        Ok(Some(Proposal::new(
            format!("removed call to {}::{}", call.owner, call.name),
            replacement,
        )))
    }
}

fn pop(size: u8) -> Insn {
    Insn::simple(if size == 2 { opcodes::POP2 } else { opcodes::POP })
}

/// Default value pushed in place of a removed call's result.
fn zero_value(ty: JavaType) -> Option<Insn> {
    let opcode = match ty {
        JavaType::Void => return None,
        JavaType::Long => opcodes::LCONST_0,
        JavaType::Float => opcodes::FCONST_0,
        JavaType::Double => opcodes::DCONST_0,
        JavaType::Reference => opcodes::ACONST_NULL,
        JavaType::Boolean | JavaType::Byte | JavaType::Char | JavaType::Short | JavaType::Int => {
            opcodes::ICONST_0
        }
    };
    Some(Insn::simple(opcode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::test_support::{call, inst, method};

    fn opcodes_of(proposal: &Proposal) -> Vec<u8> {
        proposal.replacement.iter().map(|insn| insn.opcode).collect()
    }

    #[test]
    fn void_virtual_call_pops_arguments_and_receiver() {
        let inst = call(opcodes::INVOKEVIRTUAL, "java/io/PrintStream", "println", "(JI)V");
        let proposal = VOID_METHOD_CALLS
            .propose(&method("()V"), &inst)
            .expect("propose")
            .expect("mutation");

        assert_eq!(proposal.description, "removed call to java/io/PrintStream::println");
        assert_eq!(
            opcodes_of(&proposal),
            vec![opcodes::POP, opcodes::POP2, opcodes::POP]
        );
    }

    #[test]
    fn non_void_static_call_pushes_default() {
        let inst = call(opcodes::INVOKESTATIC, "java/lang/Math", "max", "(DD)D");
        let proposal = NON_VOID_METHOD_CALLS
            .propose(&method("()D"), &inst)
            .expect("propose")
            .expect("mutation");

        assert_eq!(
            opcodes_of(&proposal),
            vec![opcodes::POP2, opcodes::POP2, opcodes::DCONST_0]
        );
        assert!(VOID_METHOD_CALLS
            .propose(&method("()D"), &inst)
            .expect("propose")
            .is_none());
    }

    #[test]
    fn constructors_and_non_calls_are_skipped() {
        let ctor = call(opcodes::INVOKESPECIAL, "java/lang/Object", "<init>", "()V");

        assert!(VOID_METHOD_CALLS
            .propose(&method("()V"), &ctor)
            .expect("propose")
            .is_none());
        assert!(NON_VOID_METHOD_CALLS
            .propose(&method("()V"), &inst(opcodes::INVOKEDYNAMIC))
            .expect("propose")
            .is_none());
    }

    #[test]
    fn interface_call_returning_object_pushes_null() {
        let inst = call(
            opcodes::INVOKEINTERFACE,
            "java/util/List",
            "get",
            "(I)Ljava/lang/Object;",
        );
        let proposal = NON_VOID_METHOD_CALLS
            .propose(&method("()V"), &inst)
            .expect("propose")
            .expect("mutation");

        assert_eq!(
            opcodes_of(&proposal),
            vec![opcodes::POP, opcodes::POP, opcodes::ACONST_NULL]
        );
    }
}
