use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::cfg::BlockMap;
use crate::error::MutationError;
use crate::ir::{Class, Instruction, Method};
use crate::method_info::MethodInfo;
use crate::mutation::MutationDetails;
use crate::opcodes;

pub(crate) mod asserts;
pub(crate) mod enums;
pub(crate) mod groovy;
pub(crate) mod inlined_finally;
pub(crate) mod string_switch;
pub(crate) mod synthetic;

/// What a filter gets to see about the method whose mutations it inspects.
pub(crate) struct MethodScan<'a> {
    pub(crate) info: &'a MethodInfo,
    pub(crate) method: &'a Method,
    pub(crate) blocks: &'a BlockMap,
}

/// Post-processing step over one method's mutations.
pub(crate) trait MutationFilter: Send + Sync {
    fn kind(&self) -> FilterKind;
    fn apply(
        &self,
        class: &Class,
        scan: &MethodScan<'_>,
        mutations: Vec<MutationDetails>,
    ) -> Vec<MutationDetails>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FilterKind {
    Enum,
    Assert,
    StringSwitch,
    Groovy,
    Bridge,
    InlinedFinally,
}

impl FilterKind {
    pub const DEFAULTS: [FilterKind; 5] = [
        FilterKind::Enum,
        FilterKind::Assert,
        FilterKind::StringSwitch,
        FilterKind::Groovy,
        FilterKind::Bridge,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Enum => "ENUM",
            FilterKind::Assert => "ASSERT",
            FilterKind::StringSwitch => "STRING_SWITCH",
            FilterKind::Groovy => "GROOVY",
            FilterKind::Bridge => "BRIDGE",
            FilterKind::InlinedFinally => "INLINED_FINALLY",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterKind {
    type Err = MutationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [
            FilterKind::Enum,
            FilterKind::Assert,
            FilterKind::StringSwitch,
            FilterKind::Groovy,
            FilterKind::Bridge,
            FilterKind::InlinedFinally,
        ]
        .into_iter()
        .find(|kind| kind.name().eq_ignore_ascii_case(value))
        .ok_or_else(|| MutationError::FilterConfigError(value.to_string()))
    }
}

/// Knobs the configurable filters need.
#[derive(Clone, Debug)]
pub(crate) struct FilterSettings {
    pub(crate) groovy_interfaces: Vec<String>,
    pub(crate) groovy_class_patterns: Vec<Regex>,
    pub(crate) synthetic_method_allowlist: Vec<Regex>,
}

/// Ordered filters run over each method's mutations.
pub(crate) struct FilterChain {
    filters: Vec<Box<dyn MutationFilter>>,
}

impl FilterChain {
    pub(crate) fn new(kinds: &[FilterKind], settings: &FilterSettings) -> Self {
        let filters = kinds
            .iter()
            .map(|kind| -> Box<dyn MutationFilter> {
                match kind {
                    FilterKind::Enum => Box::new(enums::EnumFilter),
                    FilterKind::Assert => Box::new(asserts::AssertFilter),
                    FilterKind::StringSwitch => Box::new(string_switch::StringSwitchFilter),
                    FilterKind::Groovy => Box::new(groovy::GroovyFilter::new(
                        settings.groovy_interfaces.clone(),
                        settings.groovy_class_patterns.clone(),
                    )),
                    FilterKind::Bridge => Box::new(synthetic::SyntheticFilter::new(
                        settings.synthetic_method_allowlist.clone(),
                    )),
                    FilterKind::InlinedFinally => Box::new(inlined_finally::InlinedFinallyFilter),
                }
            })
            .collect();
        Self { filters }
    }

    pub(crate) fn kinds(&self) -> Vec<FilterKind> {
        self.filters.iter().map(|filter| filter.kind()).collect()
    }

    pub(crate) fn apply(
        &self,
        class: &Class,
        scan: &MethodScan<'_>,
        mut mutations: Vec<MutationDetails>,
    ) -> Vec<MutationDetails> {
        for filter in &self.filters {
            if mutations.is_empty() {
                break;
            }
            mutations = filter.apply(class, scan, mutations);
        }
        mutations
    }
}

/// Drop mutations whose first index falls into any of the inclusive ranges.
pub(crate) fn drop_ordinals(
    mutations: Vec<MutationDetails>,
    ranges: &[(usize, usize)],
) -> Vec<MutationDetails> {
    if ranges.is_empty() {
        return mutations;
    }
    mutations
        .into_iter()
        .filter(|details| {
            let index = details.first_index();
            !ranges
                .iter()
                .any(|(start, end)| (*start..=*end).contains(&index))
        })
        .collect()
}

/// Local slot read by an `iload` variant.
pub(crate) fn iload_slot(inst: &Instruction) -> Option<u16> {
    local_slot(inst, opcodes::ILOAD, opcodes::ILOAD_0)
}

pub(crate) fn istore_slot(inst: &Instruction) -> Option<u16> {
    local_slot(inst, opcodes::ISTORE, opcodes::ISTORE_0)
}

pub(crate) fn aload_slot(inst: &Instruction) -> Option<u16> {
    local_slot(inst, opcodes::ALOAD, opcodes::ALOAD_0)
}

pub(crate) fn astore_slot(inst: &Instruction) -> Option<u16> {
    local_slot(inst, opcodes::ASTORE, opcodes::ASTORE_0)
}

fn local_slot(inst: &Instruction, generic: u8, first_short: u8) -> Option<u16> {
    let opcode = inst.opcode();
    if opcode == generic {
        match inst.insn.operand {
            crate::bytecode::Operand::Local(index) => Some(index),
            _ => None,
        }
    } else if (first_short..first_short + 4).contains(&opcode) {
        Some((opcode - first_short) as u16)
    } else {
        None
    }
}
