use crate::bytecode::Insn;

/// Intermediate representation for a parsed JVM class.
#[derive(Clone, Debug)]
pub(crate) struct Class {
    pub(crate) name: String,
    pub(crate) interfaces: Vec<String>,
    pub(crate) access: u16,
    pub(crate) source_file: Option<String>,
    /// Internal names of class-level annotations, visible and invisible.
    pub(crate) annotations: Vec<String>,
    pub(crate) methods: Vec<Method>,
}

/// Intermediate representation for a method that carries bytecode.
#[derive(Clone, Debug)]
pub(crate) struct Method {
    /// Position in the class file's method table.
    pub(crate) index: usize,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) access: u16,
    pub(crate) code_length: u32,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) exception_handlers: Vec<ExceptionHandler>,
    pub(crate) line_numbers: Vec<LineNumber>,
}

impl Method {
    /// Ordinal of the instruction starting at `offset`.
    pub(crate) fn ordinal_at(&self, offset: u32) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&offset, |inst| inst.offset)
            .ok()
    }
}

/// Exception handler metadata from the Code attribute.
#[derive(Clone, Debug)]
pub(crate) struct ExceptionHandler {
    pub(crate) start_pc: u32,
    pub(crate) end_pc: u32,
    pub(crate) handler_pc: u32,
    pub(crate) catch_type: Option<String>,
}

/// LineNumberTable entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct LineNumber {
    pub(crate) start_pc: u32,
    pub(crate) line: u32,
}

/// Bytecode instruction captured for analysis and re-emission.
#[derive(Clone, Debug)]
pub(crate) struct Instruction {
    pub(crate) ordinal: usize,
    pub(crate) offset: u32,
    pub(crate) insn: Insn,
    pub(crate) kind: InstructionKind,
}

impl Instruction {
    pub(crate) fn opcode(&self) -> u8 {
        self.insn.opcode
    }

    pub(crate) fn call(&self) -> Option<&CallSite> {
        match &self.kind {
            InstructionKind::Invoke(call) => Some(call),
            _ => None,
        }
    }

    pub(crate) fn field(&self) -> Option<&FieldRef> {
        match &self.kind {
            InstructionKind::Field(field) => Some(field),
            _ => None,
        }
    }
}

/// Symbolic view of constant-pool operands the operators and filters inspect.
#[derive(Clone, Debug)]
pub(crate) enum InstructionKind {
    Invoke(CallSite),
    Field(FieldRef),
    Other,
}

/// Call site extracted from bytecode.
#[derive(Clone, Debug)]
pub(crate) struct CallSite {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) kind: CallKind,
}

/// Invoke opcode classification.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum CallKind {
    Virtual,
    Interface,
    Special,
    Static,
}

/// Field reference used by get/put instructions.
#[derive(Clone, Debug)]
pub(crate) struct FieldRef {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
}
