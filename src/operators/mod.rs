use std::fmt;
use std::str::FromStr;

use anyhow::Result;

use crate::bytecode::Insn;
use crate::error::MutationError;
use crate::ir::Instruction;
use crate::method_info::MethodInfo;
use crate::visitor::{MethodVisitor, OperatorVisitor};

pub(crate) mod calls;
pub(crate) mod conditionals;
pub(crate) mod constants;
pub(crate) mod increments;
pub(crate) mod math;
pub(crate) mod negation;
pub(crate) mod returns;

/// Metadata describing a mutation operator.
#[derive(Clone, Copy, Debug)]
pub(crate) struct OperatorMetadata {
    pub(crate) name: &'static str,
    pub(crate) id: &'static str,
    pub(crate) description: &'static str,
}

/// A replacement an operator would make at one instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Proposal {
    pub(crate) description: String,
    pub(crate) replacement: Vec<Insn>,
}

impl Proposal {
    pub(crate) fn new(description: impl Into<String>, replacement: Vec<Insn>) -> Self {
        Self {
            description: description.into(),
            replacement,
        }
    }
}

/// Operator interface: recognise an opportunity and describe the replacement.
pub(crate) trait MethodMutator: Sync {
    fn metadata(&self) -> OperatorMetadata;
    fn propose(&self, method: &MethodInfo, inst: &Instruction) -> Result<Option<Proposal>>;
}

/// Closed catalogue of mutation operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Operator {
    ConditionalsBoundary,
    Increments,
    InvertNegs,
    Math,
    NegateConditionals,
    ReturnVals,
    VoidMethodCalls,
    NonVoidMethodCalls,
    RemoveConditionalsEqualIf,
    RemoveConditionalsEqualElse,
    RemoveConditionalsOrderIf,
    RemoveConditionalsOrderElse,
    RemoveIncrements,
    InlineConsts,
}

impl Operator {
    pub const ALL: [Operator; 14] = [
        Operator::ConditionalsBoundary,
        Operator::Increments,
        Operator::InvertNegs,
        Operator::Math,
        Operator::NegateConditionals,
        Operator::ReturnVals,
        Operator::VoidMethodCalls,
        Operator::NonVoidMethodCalls,
        Operator::RemoveConditionalsEqualIf,
        Operator::RemoveConditionalsEqualElse,
        Operator::RemoveConditionalsOrderIf,
        Operator::RemoveConditionalsOrderElse,
        Operator::RemoveIncrements,
        Operator::InlineConsts,
    ];

    fn mutator(self) -> &'static dyn MethodMutator {
        match self {
            Operator::ConditionalsBoundary => &conditionals::ConditionalsBoundary,
            Operator::Increments => &increments::Increments,
            Operator::InvertNegs => &negation::InvertNegs,
            Operator::Math => &math::Math,
            Operator::NegateConditionals => &conditionals::NegateConditionals,
            Operator::ReturnVals => &returns::ReturnVals,
            Operator::VoidMethodCalls => &calls::VOID_METHOD_CALLS,
            Operator::NonVoidMethodCalls => &calls::NON_VOID_METHOD_CALLS,
            Operator::RemoveConditionalsEqualIf => &conditionals::REMOVE_EQUAL_IF,
            Operator::RemoveConditionalsEqualElse => &conditionals::REMOVE_EQUAL_ELSE,
            Operator::RemoveConditionalsOrderIf => &conditionals::REMOVE_ORDER_IF,
            Operator::RemoveConditionalsOrderElse => &conditionals::REMOVE_ORDER_ELSE,
            Operator::RemoveIncrements => &increments::RemoveIncrements,
            Operator::InlineConsts => &constants::InlineConsts,
        }
    }

    pub(crate) fn metadata(self) -> OperatorMetadata {
        self.mutator().metadata()
    }

    /// Human name, e.g. `MATH`.
    pub fn name(self) -> &'static str {
        self.metadata().name
    }

    /// Globally unique id, e.g. `jmutate.operators.MATH`.
    pub fn id(self) -> &'static str {
        self.metadata().id
    }

    pub fn description(self) -> &'static str {
        self.metadata().description
    }

    pub(crate) fn propose(self, method: &MethodInfo, inst: &Instruction) -> Result<Option<Proposal>> {
        self.mutator().propose(method, inst)
    }

    /// Wrap `downstream` with a visitor applying this operator.
    pub(crate) fn create<'a>(
        self,
        method: &'a MethodInfo,
        downstream: Box<dyn MethodVisitor + 'a>,
    ) -> Box<dyn MethodVisitor + 'a> {
        Box::new(OperatorVisitor::new(self, method, downstream))
    }

    pub fn from_id(id: &str) -> Option<Operator> {
        Operator::ALL.into_iter().find(|operator| operator.id() == id)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operator {
    type Err = MutationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|operator| operator.name().eq_ignore_ascii_case(value) || operator.id() == value)
            .ok_or_else(|| MutationError::UnknownOperator(value.to_string()))
    }
}
