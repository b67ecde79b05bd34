//! Writes a mutated method back into the original class bytes.
//!
//! Only the Code attribute of the mutated method and the tail of the constant
//! pool change; every other byte of the class is copied through untouched.

use std::collections::HashMap;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::bytecode::{is_conditional_branch, Insn, Operand, PoolEntry};
use crate::error::MutationError;
use crate::ir::Method;
use crate::layout::{read_u16_class, read_u8_class, ClassLayout, CodeLayout};
use crate::opcodes;
use crate::visitor::Emitted;

const MAX_CODE_LENGTH: usize = 65_535;
/// Headroom for the few extra operand slots a replacement may need.
const EXTRA_STACK: u16 = 2;

/// Reasons a mutated method cannot be expressed as a class file.
#[derive(Debug, Error)]
enum Unencodable {
    #[error("conditional branch at offset {0} no longer reaches its target")]
    BranchOverflow(u32),
    #[error("method code grew to {0} bytes")]
    CodeTooLarge(usize),
    #[error("constant pool is full")]
    PoolFull,
    #[error("constant string exceeds 65535 encoded bytes")]
    StringTooLong,
}

/// Rebuild the class with `method`'s code replaced by `stream`.
pub(crate) fn rewrite_method(
    class_name: &str,
    data: &[u8],
    method: &Method,
    stream: &[Emitted],
) -> crate::error::Result<Vec<u8>> {
    splice(data, method, stream).map_err(|err| match err.downcast_ref::<Unencodable>() {
        Some(reason) => MutationError::not_applicable(class_name, reason.to_string()),
        None => MutationError::invalid_class(class_name, &err),
    })
}

fn splice(data: &[u8], method: &Method, stream: &[Emitted]) -> Result<Vec<u8>> {
    let layout = ClassLayout::parse(data)?;
    let span = *layout
        .method_code(method.index)
        .with_context(|| format!("method {} has no Code attribute", method.name))?;
    let code_body = span.body(data);
    let code = CodeLayout::parse(code_body)?;
    let code_length = u32::try_from(code.code_end - code.code_start)?;
    anyhow::ensure!(
        code_length == method.code_length,
        "Code attribute of {} holds {code_length} bytes but {} were decoded",
        method.name,
        method.code_length
    );

    let mut pool = PoolAppender::new(layout.constant_pool_count);
    let mut slots = Vec::with_capacity(stream.len());
    let mut replaced = false;
    for item in stream {
        match item {
            Emitted::Original(ordinal) => {
                let inst = method
                    .instructions
                    .get(*ordinal)
                    .with_context(|| format!("no instruction at ordinal {ordinal}"))?;
                slots.push(Slot {
                    origin: Some(inst.offset),
                    insn: inst.insn.clone(),
                });
            }
            Emitted::Replaced { ordinal, insns } => {
                replaced = true;
                let inst = method
                    .instructions
                    .get(*ordinal)
                    .with_context(|| format!("no instruction at ordinal {ordinal}"))?;
                for (position, insn) in insns.iter().enumerate() {
                    slots.push(Slot {
                        origin: (position == 0).then_some(inst.offset),
                        insn: pool.resolve(insn)?,
                    });
                }
            }
        }
    }

    let (offsets, map) = lay_out(&mut slots, code_length)?;
    let mut new_code = Vec::new();
    let target = |old: u32| {
        map.get(&old)
            .copied()
            .with_context(|| format!("branch target {old} is not an instruction start"))
    };
    for (slot, offset) in slots.iter().zip(&offsets) {
        slot.insn.encode(*offset, &target, &mut new_code)?;
    }

    let identity = map.iter().all(|(old, new)| old == new);
    let mut attributes = Vec::new();
    for attribute in &code.attributes {
        let body = attribute.body(code_body);
        let rewritten = match layout.utf8(attribute.name_index) {
            Some("LineNumberTable") => Some(remap_line_numbers(body, &map)?),
            Some("LocalVariableTable" | "LocalVariableTypeTable") => {
                Some(remap_local_variables(body, &map)?)
            }
            Some("StackMapTable") => Some(remap_stack_map(body, &map)?),
            // anything else may hold offsets we cannot translate
            _ if identity => Some(body.to_vec()),
            _ => None,
        };
        if let Some(body) = rewritten {
            attributes.push((attribute.name_index, body));
        }
    }

    let mut out_body = Vec::with_capacity(code_body.len() + 16);
    let max_stack = if replaced {
        code.max_stack.saturating_add(EXTRA_STACK)
    } else {
        code.max_stack
    };
    out_body.extend_from_slice(&max_stack.to_be_bytes());
    out_body.extend_from_slice(&code.max_locals.to_be_bytes());
    out_body.extend_from_slice(&(new_code.len() as u32).to_be_bytes());
    out_body.extend_from_slice(&new_code);
    out_body.extend_from_slice(&(code.exception_table.len() as u16).to_be_bytes());
    for [start, end, handler, catch_type] in &code.exception_table {
        for pc in [start, end, handler] {
            let moved = target(*pc as u32).context("remap exception table")?;
            out_body.extend_from_slice(&(moved as u16).to_be_bytes());
        }
        out_body.extend_from_slice(&catch_type.to_be_bytes());
    }
    out_body.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
    for (name_index, body) in attributes {
        out_body.extend_from_slice(&name_index.to_be_bytes());
        out_body.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out_body.extend_from_slice(&body);
    }

    let mut out = Vec::with_capacity(data.len() + pool.bytes.len() + 16);
    out.extend_from_slice(&data[..layout.constant_pool_start]);
    out.extend_from_slice(&pool.next.to_be_bytes());
    out.extend_from_slice(&data[layout.constant_pool_start + 2..layout.constant_pool_end]);
    out.extend_from_slice(&pool.bytes);
    // name index of the Code attribute stays, its length changes
    out.extend_from_slice(&data[layout.constant_pool_end..span.start + 2]);
    out.extend_from_slice(&(out_body.len() as u32).to_be_bytes());
    out.extend_from_slice(&out_body);
    out.extend_from_slice(&data[span.end..]);
    Ok(out)
}

struct Slot {
    /// Original offset, for the first instruction emitted in place of it.
    origin: Option<u32>,
    insn: Insn,
}

/// Assign offsets, widening unconditional jumps until every branch fits.
fn lay_out(slots: &mut [Slot], old_length: u32) -> Result<(Vec<u32>, HashMap<u32, u32>)> {
    loop {
        let mut offsets = Vec::with_capacity(slots.len());
        let mut map = HashMap::new();
        let mut offset = 0usize;
        for slot in slots.iter() {
            offsets.push(offset as u32);
            if let Some(origin) = slot.origin {
                map.insert(origin, offset as u32);
            }
            offset += slot.insn.encoded_len(offset as u32);
        }
        if offset > MAX_CODE_LENGTH {
            return Err(Unencodable::CodeTooLarge(offset).into());
        }
        map.insert(old_length, offset as u32);

        let mut widened = false;
        for (slot, at) in slots.iter_mut().zip(&offsets) {
            let Operand::Branch(old_target) = slot.insn.operand else {
                continue;
            };
            if matches!(slot.insn.opcode, opcodes::GOTO_W | opcodes::JSR_W) {
                continue;
            }
            let new_target = *map
                .get(&old_target)
                .with_context(|| format!("branch target {old_target} is not an instruction start"))?;
            if i16::try_from(new_target as i64 - *at as i64).is_ok() {
                continue;
            }
            slot.insn.opcode = match slot.insn.opcode {
                opcodes::GOTO => opcodes::GOTO_W,
                opcodes::JSR => opcodes::JSR_W,
                opcode if is_conditional_branch(opcode) => {
                    return Err(Unencodable::BranchOverflow(*at).into());
                }
                opcode => anyhow::bail!("unexpected branch opcode {opcode:#04x}"),
            };
            widened = true;
        }
        if !widened {
            return Ok((offsets, map));
        }
    }
}

/// Constant pool entries requested by replacements, appended after the
/// existing pool.
struct PoolAppender {
    next: u16,
    bytes: Vec<u8>,
    utf8: HashMap<String, u16>,
    entries: HashMap<PoolEntry, u16>,
}

impl PoolAppender {
    fn new(count: u16) -> Self {
        Self {
            next: count,
            bytes: Vec::new(),
            utf8: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    fn resolve(&mut self, insn: &Insn) -> Result<Insn> {
        let Operand::NewConstant(entry) = &insn.operand else {
            return Ok(insn.clone());
        };
        let index = self.entry(entry)?;
        Ok(Insn::new(insn.opcode, Operand::Constant(index)))
    }

    fn entry(&mut self, entry: &PoolEntry) -> Result<u16> {
        if let Some(index) = self.entries.get(entry) {
            return Ok(*index);
        }
        let index = match entry {
            PoolEntry::Integer(value) => {
                let mut body = vec![3];
                body.extend_from_slice(&value.to_be_bytes());
                self.push(&body)?
            }
            PoolEntry::Methodref {
                owner,
                name,
                descriptor,
            } => {
                let owner_name = self.utf8(owner)?;
                let class = self.push(&tagged(7, &[owner_name]))?;
                let name = self.utf8(name)?;
                let descriptor = self.utf8(descriptor)?;
                let name_and_type = self.push(&tagged(12, &[name, descriptor]))?;
                self.push(&tagged(10, &[class, name_and_type]))?
            }
        };
        self.entries.insert(entry.clone(), index);
        Ok(index)
    }

    fn utf8(&mut self, value: &str) -> Result<u16> {
        if let Some(index) = self.utf8.get(value) {
            return Ok(*index);
        }
        let encoded = cesu8::to_java_cesu8(value);
        let length = u16::try_from(encoded.len()).map_err(|_| Unencodable::StringTooLong)?;
        let mut body = vec![1];
        body.extend_from_slice(&length.to_be_bytes());
        body.extend_from_slice(&encoded);
        let index = self.push(&body)?;
        self.utf8.insert(value.to_string(), index);
        Ok(index)
    }

    fn push(&mut self, body: &[u8]) -> Result<u16> {
        let index = self.next;
        self.next = self.next.checked_add(1).ok_or(Unencodable::PoolFull)?;
        self.bytes.extend_from_slice(body);
        Ok(index)
    }
}

fn tagged(tag: u8, indexes: &[u16]) -> Vec<u8> {
    let mut body = vec![tag];
    for index in indexes {
        body.extend_from_slice(&index.to_be_bytes());
    }
    body
}

fn moved(map: &HashMap<u32, u32>, pc: u16) -> Result<u16> {
    let new = map
        .get(&(pc as u32))
        .with_context(|| format!("offset {pc} is not an instruction start"))?;
    Ok(*new as u16)
}

fn remap_line_numbers(body: &[u8], map: &HashMap<u32, u32>) -> Result<Vec<u8>> {
    let mut offset = 0;
    let count = read_u16_class(body, &mut offset)?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let start_pc = read_u16_class(body, &mut offset)?;
        let line = read_u16_class(body, &mut offset)?;
        // entries pointing into the middle of an instruction carry nothing useful
        if let Ok(start_pc) = moved(map, start_pc) {
            entries.push((start_pc, line));
        }
    }
    let mut out = Vec::with_capacity(2 + entries.len() * 4);
    out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    for (start_pc, line) in entries {
        out.extend_from_slice(&start_pc.to_be_bytes());
        out.extend_from_slice(&line.to_be_bytes());
    }
    Ok(out)
}

fn remap_local_variables(body: &[u8], map: &HashMap<u32, u32>) -> Result<Vec<u8>> {
    let mut offset = 0;
    let count = read_u16_class(body, &mut offset)?;
    let mut out = Vec::with_capacity(body.len());
    out.extend_from_slice(&count.to_be_bytes());
    for _ in 0..count {
        let start_pc = read_u16_class(body, &mut offset)?;
        let length = read_u16_class(body, &mut offset)?;
        let start = moved(map, start_pc)?;
        let end = start_pc
            .checked_add(length)
            .context("local variable range overflows")?;
        let end = moved(map, end).context("local variable range end")?;
        let length = end
            .checked_sub(start)
            .context("local variable range reversed")?;
        out.extend_from_slice(&start.to_be_bytes());
        out.extend_from_slice(&length.to_be_bytes());
        // name, descriptor or signature, slot
        for _ in 0..3 {
            out.extend_from_slice(&read_u16_class(body, &mut offset)?.to_be_bytes());
        }
    }
    Ok(out)
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum VerificationType {
    /// Top, Integer, Float, Double, Long, Null, UninitializedThis.
    Simple(u8),
    Object(u16),
    Uninitialized(u32),
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum FrameKind {
    Same { compact: bool },
    SameLocals1 { compact: bool },
    Chop(u8),
    Append,
    Full,
}

#[derive(Clone, Debug)]
struct Frame {
    offset: u32,
    kind: FrameKind,
    locals: Vec<VerificationType>,
    stack: Vec<VerificationType>,
}

fn remap_stack_map(body: &[u8], map: &HashMap<u32, u32>) -> Result<Vec<u8>> {
    let frames = parse_frames(body)?;
    let mut out = Vec::with_capacity(body.len() + 8);
    out.extend_from_slice(&(frames.len() as u16).to_be_bytes());
    let mut previous: Option<u32> = None;
    for frame in frames {
        let offset = *map
            .get(&frame.offset)
            .with_context(|| format!("stack map frame at {} lost its instruction", frame.offset))?;
        let delta = match previous {
            None => offset,
            Some(previous) => offset
                .checked_sub(previous + 1)
                .context("stack map frames out of order")?,
        };
        previous = Some(offset);
        let delta = u16::try_from(delta).context("stack map delta overflow")?;
        let locals = remap_types(&frame.locals, map)?;
        let stack = remap_types(&frame.stack, map)?;
        match frame.kind {
            FrameKind::Same { compact } if compact && delta <= 63 => out.push(delta as u8),
            FrameKind::Same { .. } => {
                out.push(251);
                out.extend_from_slice(&delta.to_be_bytes());
            }
            FrameKind::SameLocals1 { compact } => {
                if compact && delta <= 63 {
                    out.push(64 + delta as u8);
                } else {
                    out.push(247);
                    out.extend_from_slice(&delta.to_be_bytes());
                }
                write_types(&mut out, &stack);
            }
            FrameKind::Chop(count) => {
                out.push(251 - count);
                out.extend_from_slice(&delta.to_be_bytes());
            }
            FrameKind::Append => {
                out.push(251 + locals.len() as u8);
                out.extend_from_slice(&delta.to_be_bytes());
                write_types(&mut out, &locals);
            }
            FrameKind::Full => {
                out.push(255);
                out.extend_from_slice(&delta.to_be_bytes());
                out.extend_from_slice(&(locals.len() as u16).to_be_bytes());
                write_types(&mut out, &locals);
                out.extend_from_slice(&(stack.len() as u16).to_be_bytes());
                write_types(&mut out, &stack);
            }
        }
    }
    Ok(out)
}

fn parse_frames(body: &[u8]) -> Result<Vec<Frame>> {
    let mut offset = 0;
    let count = read_u16_class(body, &mut offset)?;
    let mut frames = Vec::with_capacity(count as usize);
    let mut previous: Option<u32> = None;
    for _ in 0..count {
        let frame_type = read_u8_class(body, &mut offset)?;
        let (delta, kind, locals, stack) = match frame_type {
            0..=63 => (frame_type as u16, FrameKind::Same { compact: true }, vec![], vec![]),
            64..=127 => {
                let item = read_type(body, &mut offset)?;
                (
                    (frame_type - 64) as u16,
                    FrameKind::SameLocals1 { compact: true },
                    vec![],
                    vec![item],
                )
            }
            247 => {
                let delta = read_u16_class(body, &mut offset)?;
                let item = read_type(body, &mut offset)?;
                (delta, FrameKind::SameLocals1 { compact: false }, vec![], vec![item])
            }
            248..=250 => {
                let delta = read_u16_class(body, &mut offset)?;
                (delta, FrameKind::Chop(251 - frame_type), vec![], vec![])
            }
            251 => {
                let delta = read_u16_class(body, &mut offset)?;
                (delta, FrameKind::Same { compact: false }, vec![], vec![])
            }
            252..=254 => {
                let delta = read_u16_class(body, &mut offset)?;
                let locals = read_types(body, &mut offset, (frame_type - 251) as u16)?;
                (delta, FrameKind::Append, locals, vec![])
            }
            255 => {
                let delta = read_u16_class(body, &mut offset)?;
                let local_count = read_u16_class(body, &mut offset)?;
                let locals = read_types(body, &mut offset, local_count)?;
                let stack_count = read_u16_class(body, &mut offset)?;
                let stack = read_types(body, &mut offset, stack_count)?;
                (delta, FrameKind::Full, locals, stack)
            }
            reserved => anyhow::bail!("reserved stack map frame type {reserved}"),
        };
        let absolute = match previous {
            None => delta as u32,
            Some(previous) => previous + delta as u32 + 1,
        };
        previous = Some(absolute);
        frames.push(Frame {
            offset: absolute,
            kind,
            locals,
            stack,
        });
    }
    if offset != body.len() {
        anyhow::bail!("StackMapTable length mismatch");
    }
    Ok(frames)
}

fn read_types(body: &[u8], offset: &mut usize, count: u16) -> Result<Vec<VerificationType>> {
    (0..count).map(|_| read_type(body, offset)).collect()
}

fn read_type(body: &[u8], offset: &mut usize) -> Result<VerificationType> {
    let tag = read_u8_class(body, offset)?;
    Ok(match tag {
        0..=6 => VerificationType::Simple(tag),
        7 => VerificationType::Object(read_u16_class(body, offset)?),
        8 => VerificationType::Uninitialized(read_u16_class(body, offset)? as u32),
        _ => anyhow::bail!("unknown verification type tag {tag}"),
    })
}

fn remap_types(types: &[VerificationType], map: &HashMap<u32, u32>) -> Result<Vec<VerificationType>> {
    types
        .iter()
        .map(|item| match item {
            VerificationType::Uninitialized(at) => map
                .get(at)
                .map(|moved| VerificationType::Uninitialized(*moved))
                .with_context(|| format!("uninitialized type refers to lost `new` at {at}")),
            other => Ok(other.clone()),
        })
        .collect()
}

fn write_types(out: &mut Vec<u8>, types: &[VerificationType]) {
    for item in types {
        match item {
            VerificationType::Simple(tag) => out.push(*tag),
            VerificationType::Object(index) => {
                out.push(7);
                out.extend_from_slice(&index.to_be_bytes());
            }
            VerificationType::Uninitialized(at) => {
                out.push(8);
                out.extend_from_slice(&(*at as u16).to_be_bytes());
            }
        }
    }
}
