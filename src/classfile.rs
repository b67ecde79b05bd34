use anyhow::{Context, Result};
use jclassfile::class_file;
use jclassfile::constant_pool::ConstantPool;

use crate::bytecode::{self, Operand};
use crate::ir::{
    CallKind, CallSite, Class, ExceptionHandler, FieldRef, Instruction, InstructionKind,
    LineNumber, Method,
};
use crate::layout::ClassLayout;
use crate::opcodes;

/// Parse class bytes into the analysis model.
pub(crate) fn parse_class(data: &[u8]) -> Result<Class> {
    let class_file = class_file::parse(data).context("failed to parse class file bytes")?;
    let layout = ClassLayout::parse(data).context("failed to walk class file layout")?;
    let constant_pool = class_file.constant_pool();

    let name =
        resolve_class_name(constant_pool, class_file.this_class()).context("resolve class name")?;
    let mut interfaces = Vec::new();
    for interface in class_file.interfaces() {
        interfaces
            .push(resolve_class_name(constant_pool, *interface).context("resolve interface name")?);
    }

    let source_file = layout
        .source_file_index(data)
        .context("read SourceFile")?
        .map(|index| resolve_utf8(constant_pool, index))
        .transpose()
        .context("resolve SourceFile")?;
    let mut annotations = Vec::new();
    for index in layout
        .annotation_type_indexes(data)
        .context("read class annotations")?
    {
        let descriptor = resolve_utf8(constant_pool, index).context("resolve annotation type")?;
        let annotation = descriptor
            .strip_prefix('L')
            .and_then(|value| value.strip_suffix(';'))
            .unwrap_or(&descriptor);
        annotations.push(annotation.to_string());
    }

    if layout.methods.len() != class_file.methods().len() {
        anyhow::bail!("method table length disagrees with class layout");
    }
    let methods = parse_methods(constant_pool, class_file.methods(), &layout)
        .with_context(|| format!("parse methods of {name}"))?;

    Ok(Class {
        name,
        interfaces,
        access: layout.access_flags,
        source_file,
        annotations,
        methods,
    })
}

fn parse_methods(
    constant_pool: &[ConstantPool],
    methods: &[jclassfile::methods::MethodInfo],
    layout: &ClassLayout,
) -> Result<Vec<Method>> {
    let mut parsed = Vec::new();
    for (index, (method, raw)) in methods.iter().zip(&layout.methods).enumerate() {
        let name =
            resolve_utf8(constant_pool, method.name_index()).context("resolve method name")?;
        let descriptor = resolve_utf8(constant_pool, method.descriptor_index())
            .context("resolve method descriptor")?;
        let code = method
            .attributes()
            .iter()
            .find_map(|attribute| match attribute {
                jclassfile::attributes::Attribute::Code {
                    code,
                    exception_table,
                    attributes,
                    ..
                } => Some((code, exception_table, attributes)),
                _ => None,
            });
        let Some((code, exception_table, code_attributes)) = code else {
            continue;
        };

        let instructions = parse_bytecode(code, constant_pool)
            .with_context(|| format!("parse bytecode of {name}{descriptor}"))?;
        let exception_handlers =
            parse_exception_handlers(exception_table, constant_pool).context("parse handlers")?;
        let line_numbers = parse_line_numbers(code_attributes);

        let method = Method {
            index,
            name,
            descriptor,
            access: raw.access_flags,
            code_length: code.len() as u32,
            instructions,
            exception_handlers,
            line_numbers,
        };
        validate_offsets(&method)
            .with_context(|| format!("validate {}{}", method.name, method.descriptor))?;
        parsed.push(method);
    }
    Ok(parsed)
}

fn parse_bytecode(code: &[u8], constant_pool: &[ConstantPool]) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    for (ordinal, (offset, insn)) in bytecode::decode(code)?.into_iter().enumerate() {
        let kind = match (insn.opcode, &insn.operand) {
            (
                opcodes::INVOKEVIRTUAL | opcodes::INVOKESPECIAL | opcodes::INVOKESTATIC,
                Operand::Constant(index),
            )
            | (opcodes::INVOKEINTERFACE, Operand::InvokeInterface { index, .. }) => {
                let (owner, name, descriptor) = resolve_member_ref(constant_pool, *index)
                    .with_context(|| format!("resolve method ref at offset {offset}"))?;
                let kind = match insn.opcode {
                    opcodes::INVOKESPECIAL => CallKind::Special,
                    opcodes::INVOKESTATIC => CallKind::Static,
                    opcodes::INVOKEINTERFACE => CallKind::Interface,
                    _ => CallKind::Virtual,
                };
                InstructionKind::Invoke(CallSite {
                    owner,
                    name,
                    descriptor,
                    kind,
                })
            }
            (
                opcodes::GETSTATIC | opcodes::PUTSTATIC | opcodes::GETFIELD | opcodes::PUTFIELD,
                Operand::Constant(index),
            ) => {
                let (owner, name, descriptor) = resolve_member_ref(constant_pool, *index)
                    .with_context(|| format!("resolve field ref at offset {offset}"))?;
                InstructionKind::Field(FieldRef {
                    owner,
                    name,
                    descriptor,
                })
            }
            _ => InstructionKind::Other,
        };
        instructions.push(Instruction {
            ordinal,
            offset,
            insn,
            kind,
        });
    }
    Ok(instructions)
}

fn parse_exception_handlers(
    exception_table: &[jclassfile::attributes::ExceptionRecord],
    constant_pool: &[ConstantPool],
) -> Result<Vec<ExceptionHandler>> {
    let mut handlers = Vec::new();
    for record in exception_table {
        let catch_type = if record.catch_type() == 0 {
            None
        } else {
            Some(resolve_class_name(constant_pool, record.catch_type()).context("resolve catch type")?)
        };
        handlers.push(ExceptionHandler {
            start_pc: record.start_pc() as u32,
            end_pc: record.end_pc() as u32,
            handler_pc: record.handler_pc() as u32,
            catch_type,
        });
    }
    Ok(handlers)
}

fn parse_line_numbers(attributes: &[jclassfile::attributes::Attribute]) -> Vec<LineNumber> {
    let mut entries = Vec::new();
    for attribute in attributes {
        let jclassfile::attributes::Attribute::LineNumberTable { line_number_table } = attribute
        else {
            continue;
        };
        for record in line_number_table {
            entries.push(LineNumber {
                start_pc: record.start_pc() as u32,
                line: record.line_number() as u32,
            });
        }
    }
    entries.sort_by_key(|entry| entry.start_pc);
    entries
}

/// Branch targets and handler ranges must land on instruction boundaries.
fn validate_offsets(method: &Method) -> Result<()> {
    let is_start = |offset: u32| method.ordinal_at(offset).is_some();
    for inst in &method.instructions {
        for target in inst.insn.branch_targets() {
            if !is_start(target) {
                anyhow::bail!(
                    "branch at offset {} targets {} which is not an instruction start",
                    inst.offset,
                    target
                );
            }
        }
    }
    for handler in &method.exception_handlers {
        let end_ok = handler.end_pc == method.code_length || is_start(handler.end_pc);
        if !is_start(handler.start_pc) || !is_start(handler.handler_pc) || !end_ok {
            anyhow::bail!(
                "exception handler [{}, {}) -> {} is not aligned to instructions",
                handler.start_pc,
                handler.end_pc,
                handler.handler_pc
            );
        }
    }
    Ok(())
}

fn resolve_member_ref(constant_pool: &[ConstantPool], index: u16) -> Result<(String, String, String)> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing member ref entry")?;
    let (class_index, name_and_type_index) = match entry {
        ConstantPool::Methodref {
            class_index,
            name_and_type_index,
        }
        | ConstantPool::InterfaceMethodref {
            class_index,
            name_and_type_index,
        }
        | ConstantPool::Fieldref {
            class_index,
            name_and_type_index,
        } => (*class_index, *name_and_type_index),
        _ => anyhow::bail!("unexpected member ref entry"),
    };
    let owner = resolve_class_name(constant_pool, class_index).context("resolve owner")?;
    let (name_index, descriptor_index) = resolve_name_and_type(constant_pool, name_and_type_index)?;
    let name = resolve_utf8(constant_pool, name_index).context("resolve member name")?;
    let descriptor =
        resolve_utf8(constant_pool, descriptor_index).context("resolve member descriptor")?;
    Ok((owner, name, descriptor))
}

fn resolve_name_and_type(constant_pool: &[ConstantPool], index: u16) -> Result<(u16, u16)> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing name and type entry")?;
    match entry {
        ConstantPool::NameAndType {
            name_index,
            descriptor_index,
        } => Ok((*name_index, *descriptor_index)),
        _ => anyhow::bail!("unexpected name and type entry"),
    }
}

pub(crate) fn resolve_class_name(constant_pool: &[ConstantPool], class_index: u16) -> Result<String> {
    let entry = constant_pool
        .get(class_index as usize)
        .context("missing class entry")?;
    match entry {
        ConstantPool::Class { name_index } => resolve_utf8(constant_pool, *name_index),
        _ => anyhow::bail!("unexpected class entry"),
    }
}

fn resolve_utf8(constant_pool: &[ConstantPool], index: u16) -> Result<String> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing utf8 entry")?;
    match entry {
        ConstantPool::Utf8 { value } => Ok(value.clone()),
        _ => anyhow::bail!("unexpected utf8 entry"),
    }
}
