use anyhow::{Context, Result};

use crate::opcodes;

/// Encodable JVM instruction: an opcode plus its operand shape.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Insn {
    pub(crate) opcode: u8,
    pub(crate) operand: Operand,
}

/// Operand shapes of the JVM instruction set.
///
/// Branch targets are absolute offsets into the *original* code array. The
/// emitter translates them through its offset map when the method is laid out
/// again, so a replacement sequence can jump to any original instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Operand {
    None,
    Byte(i8),
    Short(i16),
    NewArray(u8),
    Local(u16),
    Iinc { index: u16, delta: i16 },
    Constant(u16),
    NewConstant(PoolEntry),
    Branch(u32),
    TableSwitch {
        default: u32,
        low: i32,
        targets: Vec<u32>,
    },
    LookupSwitch {
        default: u32,
        pairs: Vec<(i32, u32)>,
    },
    InvokeInterface { index: u16, count: u8 },
    InvokeDynamic(u16),
    MultiANewArray { index: u16, dimensions: u8 },
}

/// Constant pool entry requested by a replacement and appended on emission.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) enum PoolEntry {
    Integer(i32),
    Methodref {
        owner: String,
        name: String,
        descriptor: String,
    },
}

impl Insn {
    pub(crate) fn new(opcode: u8, operand: Operand) -> Self {
        Self { opcode, operand }
    }

    pub(crate) fn simple(opcode: u8) -> Self {
        Self::new(opcode, Operand::None)
    }

    /// Shortest instruction pushing the given int constant.
    pub(crate) fn push_int(value: i32) -> Self {
        match value {
            -1..=5 => Self::simple((opcodes::ICONST_0 as i32 + value) as u8),
            v if i8::try_from(v).is_ok() => Self::new(opcodes::BIPUSH, Operand::Byte(v as i8)),
            v if i16::try_from(v).is_ok() => Self::new(opcodes::SIPUSH, Operand::Short(v as i16)),
            v => Self::new(opcodes::LDC_W, Operand::NewConstant(PoolEntry::Integer(v))),
        }
    }

    /// Absolute branch targets of this instruction, including switch defaults.
    pub(crate) fn branch_targets(&self) -> Vec<u32> {
        match &self.operand {
            Operand::Branch(target) => vec![*target],
            Operand::TableSwitch {
                default, targets, ..
            } => {
                let mut all = vec![*default];
                all.extend(targets.iter().copied());
                all
            }
            Operand::LookupSwitch { default, pairs } => {
                let mut all = vec![*default];
                all.extend(pairs.iter().map(|(_, target)| *target));
                all
            }
            _ => Vec::new(),
        }
    }

    /// Size of the encoded instruction when placed at `offset`.
    pub(crate) fn encoded_len(&self, offset: u32) -> usize {
        match &self.operand {
            Operand::None => 1,
            Operand::Byte(_) | Operand::NewArray(_) => 2,
            Operand::Short(_) => 3,
            Operand::Local(index) => {
                if *index > u8::MAX as u16 {
                    4
                } else {
                    2
                }
            }
            Operand::Iinc { index, delta } => {
                if *index > u8::MAX as u16 || i8::try_from(*delta).is_err() {
                    6
                } else {
                    3
                }
            }
            Operand::Constant(index) => {
                if self.opcode == opcodes::LDC && *index <= u8::MAX as u16 {
                    2
                } else {
                    3
                }
            }
            Operand::NewConstant(_) => 3,
            Operand::Branch(_) => {
                if matches!(self.opcode, opcodes::GOTO_W | opcodes::JSR_W) {
                    5
                } else {
                    3
                }
            }
            Operand::TableSwitch { targets, .. } => {
                1 + padding(offset as usize) + 12 + targets.len() * 4
            }
            Operand::LookupSwitch { pairs, .. } => {
                1 + padding(offset as usize) + 8 + pairs.len() * 8
            }
            Operand::InvokeInterface { .. } | Operand::InvokeDynamic(_) => 5,
            Operand::MultiANewArray { .. } => 4,
        }
    }

    /// Append the encoding of this instruction placed at `offset`.
    ///
    /// `target` maps an original branch target to its new absolute offset.
    /// `NewConstant` operands must have been resolved to `Constant` first.
    pub(crate) fn encode(
        &self,
        offset: u32,
        target: &dyn Fn(u32) -> Result<u32>,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        match &self.operand {
            Operand::None => out.push(self.opcode),
            Operand::Byte(value) => {
                out.push(self.opcode);
                out.push(*value as u8);
            }
            Operand::NewArray(atype) => {
                out.push(self.opcode);
                out.push(*atype);
            }
            Operand::Short(value) => {
                out.push(self.opcode);
                out.extend_from_slice(&value.to_be_bytes());
            }
            Operand::Local(index) => {
                if *index > u8::MAX as u16 {
                    out.push(opcodes::WIDE);
                    out.push(self.opcode);
                    out.extend_from_slice(&index.to_be_bytes());
                } else {
                    out.push(self.opcode);
                    out.push(*index as u8);
                }
            }
            Operand::Iinc { index, delta } => {
                if *index > u8::MAX as u16 || i8::try_from(*delta).is_err() {
                    out.push(opcodes::WIDE);
                    out.push(opcodes::IINC);
                    out.extend_from_slice(&index.to_be_bytes());
                    out.extend_from_slice(&delta.to_be_bytes());
                } else {
                    out.push(opcodes::IINC);
                    out.push(*index as u8);
                    out.push(*delta as u8);
                }
            }
            Operand::Constant(index) => {
                if self.opcode == opcodes::LDC {
                    if *index <= u8::MAX as u16 {
                        out.push(opcodes::LDC);
                        out.push(*index as u8);
                    } else {
                        out.push(opcodes::LDC_W);
                        out.extend_from_slice(&index.to_be_bytes());
                    }
                } else {
                    out.push(self.opcode);
                    out.extend_from_slice(&index.to_be_bytes());
                }
            }
            Operand::NewConstant(entry) => {
                anyhow::bail!("unresolved constant pool entry {:?}", entry);
            }
            Operand::Branch(old_target) => {
                let relative = relative_offset(offset, target(*old_target)?);
                out.push(self.opcode);
                if matches!(self.opcode, opcodes::GOTO_W | opcodes::JSR_W) {
                    out.extend_from_slice(&relative.to_be_bytes());
                } else {
                    let short = i16::try_from(relative).with_context(|| {
                        format!("branch offset {relative} at {offset} does not fit 16 bits")
                    })?;
                    out.extend_from_slice(&short.to_be_bytes());
                }
            }
            Operand::TableSwitch {
                default,
                low,
                targets,
            } => {
                out.push(self.opcode);
                out.extend(std::iter::repeat(0u8).take(padding(offset as usize)));
                let high = low + targets.len() as i32 - 1;
                out.extend_from_slice(&relative_offset(offset, target(*default)?).to_be_bytes());
                out.extend_from_slice(&low.to_be_bytes());
                out.extend_from_slice(&high.to_be_bytes());
                for case in targets {
                    out.extend_from_slice(&relative_offset(offset, target(*case)?).to_be_bytes());
                }
            }
            Operand::LookupSwitch { default, pairs } => {
                out.push(self.opcode);
                out.extend(std::iter::repeat(0u8).take(padding(offset as usize)));
                out.extend_from_slice(&relative_offset(offset, target(*default)?).to_be_bytes());
                out.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
                for (key, case) in pairs {
                    out.extend_from_slice(&key.to_be_bytes());
                    out.extend_from_slice(&relative_offset(offset, target(*case)?).to_be_bytes());
                }
            }
            Operand::InvokeInterface { index, count } => {
                out.push(self.opcode);
                out.extend_from_slice(&index.to_be_bytes());
                out.push(*count);
                out.push(0);
            }
            Operand::InvokeDynamic(index) => {
                out.push(self.opcode);
                out.extend_from_slice(&index.to_be_bytes());
                out.extend_from_slice(&[0, 0]);
            }
            Operand::MultiANewArray { index, dimensions } => {
                out.push(self.opcode);
                out.extend_from_slice(&index.to_be_bytes());
                out.push(*dimensions);
            }
        }
        Ok(())
    }
}

fn relative_offset(from: u32, to: u32) -> i32 {
    to as i32 - from as i32
}

/// Decode a Code attribute's bytecode into offset-tagged instructions.
pub(crate) fn decode(code: &[u8]) -> Result<Vec<(u32, Insn)>> {
    let mut decoded = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let length = opcode_length(code, offset)?;
        if length == 0 || offset + length > code.len() {
            anyhow::bail!("invalid bytecode length at offset {}", offset);
        }
        let insn = decode_one(code, offset)
            .with_context(|| format!("decode instruction at offset {offset}"))?;
        decoded.push((offset as u32, insn));
        offset += length;
    }
    Ok(decoded)
}

fn decode_one(code: &[u8], offset: usize) -> Result<Insn> {
    let opcode = code[offset];
    let operand = match opcode {
        opcodes::BIPUSH => Operand::Byte(read_u8(code, offset + 1)? as i8),
        opcodes::SIPUSH => Operand::Short(read_i16(code, offset + 1)?),
        opcodes::LDC => Operand::Constant(read_u8(code, offset + 1)? as u16),
        opcodes::LDC_W | opcodes::LDC2_W => Operand::Constant(read_u16(code, offset + 1)?),
        0x15..=0x19 | 0x36..=0x3a | opcodes::RET => {
            Operand::Local(read_u8(code, offset + 1)? as u16)
        }
        opcodes::IINC => Operand::Iinc {
            index: read_u8(code, offset + 1)? as u16,
            delta: read_u8(code, offset + 2)? as i8 as i16,
        },
        0x99..=0xa8 | opcodes::IFNULL | opcodes::IFNONNULL => {
            let branch = read_i16(code, offset + 1)?;
            Operand::Branch(absolute_target(offset, branch as i32)?)
        }
        opcodes::GOTO_W | opcodes::JSR_W => {
            let branch = read_i32(code, offset + 1)?;
            Operand::Branch(absolute_target(offset, branch)?)
        }
        opcodes::TABLESWITCH => decode_tableswitch(code, offset)?,
        opcodes::LOOKUPSWITCH => decode_lookupswitch(code, offset)?,
        0xb2..=0xb8
        | opcodes::NEW
        | opcodes::ANEWARRAY
        | opcodes::CHECKCAST
        | opcodes::INSTANCEOF => Operand::Constant(read_u16(code, offset + 1)?),
        opcodes::INVOKEINTERFACE => Operand::InvokeInterface {
            index: read_u16(code, offset + 1)?,
            count: read_u8(code, offset + 3)?,
        },
        opcodes::INVOKEDYNAMIC => Operand::InvokeDynamic(read_u16(code, offset + 1)?),
        opcodes::NEWARRAY => Operand::NewArray(read_u8(code, offset + 1)?),
        opcodes::MULTIANEWARRAY => Operand::MultiANewArray {
            index: read_u16(code, offset + 1)?,
            dimensions: read_u8(code, offset + 3)?,
        },
        opcodes::WIDE => {
            let inner = read_u8(code, offset + 1)?;
            let index = read_u16(code, offset + 2)?;
            let operand = if inner == opcodes::IINC {
                Operand::Iinc {
                    index,
                    delta: read_i16(code, offset + 4)?,
                }
            } else {
                Operand::Local(index)
            };
            return Ok(Insn::new(inner, operand));
        }
        _ => Operand::None,
    };
    Ok(Insn::new(opcode, operand))
}

fn absolute_target(offset: usize, relative: i32) -> Result<u32> {
    let target = offset as i64 + relative as i64;
    u32::try_from(target).with_context(|| format!("branch target {target} out of range"))
}

fn decode_tableswitch(code: &[u8], offset: usize) -> Result<Operand> {
    let base = offset + 1 + padding(offset);
    let default = absolute_target(offset, read_i32(code, base)?)?;
    let low = read_i32(code, base + 4)?;
    let high = read_i32(code, base + 8)?;
    let count = high
        .checked_sub(low)
        .and_then(|v| v.checked_add(1))
        .context("invalid tableswitch range")?;
    let mut targets = Vec::with_capacity(count.max(0) as usize);
    let mut idx = base + 12;
    for _ in 0..count {
        targets.push(absolute_target(offset, read_i32(code, idx)?)?);
        idx += 4;
    }
    Ok(Operand::TableSwitch {
        default,
        low,
        targets,
    })
}

fn decode_lookupswitch(code: &[u8], offset: usize) -> Result<Operand> {
    let base = offset + 1 + padding(offset);
    let default = absolute_target(offset, read_i32(code, base)?)?;
    let npairs = read_i32(code, base + 4)?;
    let mut pairs = Vec::with_capacity(npairs.max(0) as usize);
    let mut idx = base + 8;
    for _ in 0..npairs {
        let key = read_i32(code, idx)?;
        let case = absolute_target(offset, read_i32(code, idx + 4)?)?;
        pairs.push((key, case));
        idx += 8;
    }
    Ok(Operand::LookupSwitch { default, pairs })
}

pub(crate) fn opcode_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code[offset];
    let length = match opcode {
        0x00..=0x0f => 1,
        opcodes::BIPUSH => 2,
        opcodes::SIPUSH => 3,
        opcodes::LDC => 2,
        opcodes::LDC_W | opcodes::LDC2_W => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        opcodes::IINC => 3,
        0x85..=0x98 => 1,
        0x99..=0xa6 => 3,
        opcodes::GOTO | opcodes::JSR => 3,
        opcodes::RET => 2,
        opcodes::TABLESWITCH => tableswitch_length(code, offset)?,
        opcodes::LOOKUPSWITCH => lookupswitch_length(code, offset)?,
        0xac..=0xb1 => 1,
        0xb2..=0xb5 => 3,
        opcodes::INVOKEVIRTUAL | opcodes::INVOKESPECIAL | opcodes::INVOKESTATIC => 3,
        opcodes::INVOKEINTERFACE | opcodes::INVOKEDYNAMIC => 5,
        opcodes::NEW => 3,
        opcodes::NEWARRAY => 2,
        opcodes::ANEWARRAY => 3,
        opcodes::ARRAYLENGTH | opcodes::ATHROW => 1,
        opcodes::CHECKCAST | opcodes::INSTANCEOF => 3,
        opcodes::MONITORENTER | opcodes::MONITOREXIT => 1,
        opcodes::WIDE => wide_length(code, offset)?,
        opcodes::MULTIANEWARRAY => 4,
        opcodes::IFNULL | opcodes::IFNONNULL => 3,
        opcodes::GOTO_W | opcodes::JSR_W => 5,
        _ => anyhow::bail!("unsupported opcode 0x{:02x}", opcode),
    };
    Ok(length)
}

fn tableswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = padding(offset);
    let base = offset + 1 + padding;
    let low = read_i32(code, base + 4)?;
    let high = read_i32(code, base + 8)?;
    let count = high
        .checked_sub(low)
        .and_then(|v| v.checked_add(1))
        .context("invalid tableswitch range")?;
    if count < 0 {
        anyhow::bail!("invalid tableswitch range");
    }
    Ok(1 + padding + 12 + (count as usize) * 4)
}

fn lookupswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = padding(offset);
    let base = offset + 1 + padding;
    let npairs = read_i32(code, base + 4)?;
    if npairs < 0 {
        anyhow::bail!("invalid lookupswitch pairs");
    }
    Ok(1 + padding + 8 + (npairs as usize) * 8)
}

fn wide_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code
        .get(offset + 1)
        .copied()
        .context("missing wide opcode")?;
    if opcode == opcodes::IINC { Ok(6) } else { Ok(4) }
}

pub(crate) fn padding(offset: usize) -> usize {
    (4 - ((offset + 1) % 4)) % 4
}

pub(crate) fn read_u8(code: &[u8], offset: usize) -> Result<u8> {
    code.get(offset).copied().context("bytecode u8 out of bounds")
}

pub(crate) fn read_u16(code: &[u8], offset: usize) -> Result<u16> {
    let slice = code
        .get(offset..offset + 2)
        .context("bytecode u16 out of bounds")?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

pub(crate) fn read_u32(code: &[u8], offset: usize) -> Result<u32> {
    let slice = code
        .get(offset..offset + 4)
        .context("bytecode u32 out of bounds")?;
    Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn read_i16(code: &[u8], offset: usize) -> Result<i16> {
    let value = read_u16(code, offset)?;
    Ok(i16::from_be_bytes(value.to_be_bytes()))
}

fn read_i32(code: &[u8], offset: usize) -> Result<i32> {
    let value = read_u32(code, offset)?;
    Ok(i32::from_be_bytes(value.to_be_bytes()))
}

pub(crate) fn is_conditional_branch(opcode: u8) -> bool {
    matches!(
        opcode,
        opcodes::IFEQ..=opcodes::IF_ACMPNE | opcodes::IFNULL | opcodes::IFNONNULL
    )
}

pub(crate) fn is_unconditional_branch(opcode: u8) -> bool {
    matches!(
        opcode,
        opcodes::GOTO | opcodes::JSR | opcodes::GOTO_W | opcodes::JSR_W
    )
}

pub(crate) fn is_switch(opcode: u8) -> bool {
    matches!(opcode, opcodes::TABLESWITCH | opcodes::LOOKUPSWITCH)
}

pub(crate) fn is_exit_opcode(opcode: u8) -> bool {
    matches!(
        opcode,
        opcodes::IRETURN
            | opcodes::LRETURN
            | opcodes::FRETURN
            | opcodes::DRETURN
            | opcodes::ARETURN
            | opcodes::RETURN
            | opcodes::ATHROW
            | opcodes::RET
    )
}
