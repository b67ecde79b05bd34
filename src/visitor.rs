use std::panic::{self, AssertUnwindSafe};

use crate::bytecode::Insn;
use crate::context::MutationContext;
use crate::error::{MutationError, Result};
use crate::ir::Instruction;
use crate::method_info::MethodInfo;
use crate::opcodes;
use crate::operators::Operator;

/// One layer of the per-method visitor chain.
pub(crate) trait MethodVisitor {
    fn visit_instruction(
        &mut self,
        context: &mut MutationContext<'_>,
        inst: &Instruction,
    ) -> Result<()>;

    /// `inst` has been replaced by an upstream operator.
    fn visit_replacement(
        &mut self,
        context: &mut MutationContext<'_>,
        inst: &Instruction,
        replacement: Vec<Insn>,
    ) -> Result<()>;
}

/// Instruction stream seen by the bottom of the chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Emitted {
    Original(usize),
    Replaced { ordinal: usize, insns: Vec<Insn> },
}

/// Sink for scan mode.
pub(crate) struct Discard;

impl MethodVisitor for Discard {
    fn visit_instruction(&mut self, _: &mut MutationContext<'_>, _: &Instruction) -> Result<()> {
        Ok(())
    }

    fn visit_replacement(
        &mut self,
        _: &mut MutationContext<'_>,
        _: &Instruction,
        _: Vec<Insn>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Sink for apply mode; records what the emitter has to lay out.
pub(crate) struct Collector<'a> {
    out: &'a mut Vec<Emitted>,
}

impl<'a> Collector<'a> {
    pub(crate) fn new(out: &'a mut Vec<Emitted>) -> Self {
        Self { out }
    }
}

impl MethodVisitor for Collector<'_> {
    fn visit_instruction(&mut self, _: &mut MutationContext<'_>, inst: &Instruction) -> Result<()> {
        self.out.push(Emitted::Original(inst.ordinal));
        Ok(())
    }

    fn visit_replacement(
        &mut self,
        _: &mut MutationContext<'_>,
        inst: &Instruction,
        insns: Vec<Insn>,
    ) -> Result<()> {
        self.out.push(Emitted::Replaced {
            ordinal: inst.ordinal,
            insns,
        });
        Ok(())
    }
}

/// Interposes one operator in front of `downstream`.
pub(crate) struct OperatorVisitor<'a> {
    operator: Operator,
    method: &'a MethodInfo,
    downstream: Box<dyn MethodVisitor + 'a>,
}

impl<'a> OperatorVisitor<'a> {
    pub(crate) fn new(
        operator: Operator,
        method: &'a MethodInfo,
        downstream: Box<dyn MethodVisitor + 'a>,
    ) -> Self {
        Self {
            operator,
            method,
            downstream,
        }
    }

    fn internal_error(&self, context: &MutationContext<'_>, reason: String) -> MutationError {
        MutationError::OperatorInternalError {
            operator: self.operator.id().to_string(),
            location: context.location().to_string(),
            ordinal: context.index(),
            reason,
        }
    }
}

impl MethodVisitor for OperatorVisitor<'_> {
    fn visit_instruction(
        &mut self,
        context: &mut MutationContext<'_>,
        inst: &Instruction,
    ) -> Result<()> {
        let operator = self.operator;
        let method = self.method;
        let proposal = match panic::catch_unwind(AssertUnwindSafe(|| operator.propose(method, inst))) {
            Ok(Ok(proposal)) => proposal,
            Ok(Err(err)) => return Err(self.internal_error(context, format!("{err:#}"))),
            Err(payload) => return Err(self.internal_error(context, panic_message(&payload))),
        };

        if let Some(proposal) = proposal {
            let id = context.identifier(operator.id());
            context.register(id.clone(), proposal.description, operator.name());
            if context.should_apply(&id) {
                let mut replacement = proposal.replacement;
                if replacement.is_empty() {
                    replacement.push(Insn::simple(opcodes::NOP));
                }
                return self.downstream.visit_replacement(context, inst, replacement);
            }
        }
        self.downstream.visit_instruction(context, inst)
    }

    fn visit_replacement(
        &mut self,
        context: &mut MutationContext<'_>,
        inst: &Instruction,
        replacement: Vec<Insn>,
    ) -> Result<()> {
        self.downstream.visit_replacement(context, inst, replacement)
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

/// Stack `operators` over `sink` so the first operator sees instructions first.
pub(crate) fn build_chain<'a>(
    operators: &[Operator],
    method: &'a MethodInfo,
    sink: Box<dyn MethodVisitor + 'a>,
) -> Box<dyn MethodVisitor + 'a> {
    operators
        .iter()
        .rev()
        .fold(sink, |downstream, operator| operator.create(method, downstream))
}
