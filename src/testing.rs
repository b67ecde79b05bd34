//! Tiny class-file assembler for unit tests.
//!
//! Produces version 49 classes so no StackMapTable is required; tests that
//! exercise frame remapping attach one explicitly through
//! [`CodeBuilder::attribute`].

use std::collections::HashMap;

use crate::opcodes;

const MAJOR_VERSION: u16 = 49;
const MAX_STACK: u16 = 6;

#[derive(Default)]
pub(crate) struct PoolBuilder {
    entries: Vec<Vec<u8>>,
    slots: u16,
    index: HashMap<Vec<u8>, u16>,
}

impl PoolBuilder {
    fn push(&mut self, entry: Vec<u8>) -> u16 {
        if let Some(index) = self.index.get(&entry) {
            return *index;
        }
        let index = self.slots + 1;
        self.slots += 1;
        self.index.insert(entry.clone(), index);
        self.entries.push(entry);
        index
    }

    /// Stored in Modified UTF-8, as javac writes it.
    pub(crate) fn utf8(&mut self, value: &str) -> u16 {
        let encoded = cesu8::to_java_cesu8(value);
        let mut entry = vec![1];
        entry.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
        entry.extend_from_slice(&encoded);
        self.push(entry)
    }

    pub(crate) fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        self.push(tagged(7, &[name_index]))
    }

    pub(crate) fn string(&mut self, value: &str) -> u16 {
        let utf8 = self.utf8(value);
        self.push(tagged(8, &[utf8]))
    }

    pub(crate) fn integer(&mut self, value: i32) -> u16 {
        let mut entry = vec![3];
        entry.extend_from_slice(&value.to_be_bytes());
        self.push(entry)
    }

    pub(crate) fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.push(tagged(12, &[name_index, descriptor_index]))
    }

    fn member(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(owner);
        let nat = self.name_and_type(name, descriptor);
        self.push(tagged(tag, &[class_index, nat]))
    }

    pub(crate) fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member(9, owner, name, descriptor)
    }

    pub(crate) fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member(10, owner, name, descriptor)
    }

    pub(crate) fn interface_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member(11, owner, name, descriptor)
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.slots + 1).to_be_bytes());
        for entry in &self.entries {
            out.extend_from_slice(entry);
        }
    }
}

fn tagged(tag: u8, indexes: &[u16]) -> Vec<u8> {
    let mut entry = vec![tag];
    for index in indexes {
        entry.extend_from_slice(&index.to_be_bytes());
    }
    entry
}

pub(crate) struct ClassBuilder {
    pool: PoolBuilder,
    name: String,
    access: u16,
    super_name: String,
    interfaces: Vec<String>,
    source_file: Option<String>,
    annotations: Vec<(String, bool)>,
    methods: Vec<Vec<u8>>,
}

impl ClassBuilder {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            pool: PoolBuilder::default(),
            name: name.to_string(),
            access: 0x0021,
            super_name: "java/lang/Object".to_string(),
            interfaces: Vec::new(),
            source_file: None,
            annotations: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub(crate) fn access(&mut self, access: u16) -> &mut Self {
        self.access = access;
        self
    }

    pub(crate) fn super_class(&mut self, name: &str) -> &mut Self {
        self.super_name = name.to_string();
        self
    }

    pub(crate) fn interface(&mut self, name: &str) -> &mut Self {
        self.interfaces.push(name.to_string());
        self
    }

    pub(crate) fn source_file(&mut self, name: &str) -> &mut Self {
        self.source_file = Some(name.to_string());
        self
    }

    pub(crate) fn annotation(&mut self, internal_name: &str, visible: bool) -> &mut Self {
        self.annotations.push((internal_name.to_string(), visible));
        self
    }

    pub(crate) fn abstract_method(&mut self, access: u16, name: &str, descriptor: &str) -> &mut Self {
        let mut out = Vec::new();
        out.extend_from_slice(&access.to_be_bytes());
        out.extend_from_slice(&self.pool.utf8(name).to_be_bytes());
        out.extend_from_slice(&self.pool.utf8(descriptor).to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        self.methods.push(out);
        self
    }

    pub(crate) fn method(
        &mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        body: impl FnOnce(&mut CodeBuilder<'_>),
    ) -> &mut Self {
        let code = {
            let mut builder = CodeBuilder::new(&mut self.pool);
            body(&mut builder);
            builder.finish()
        };
        let mut out = Vec::new();
        out.extend_from_slice(&access.to_be_bytes());
        out.extend_from_slice(&self.pool.utf8(name).to_be_bytes());
        out.extend_from_slice(&self.pool.utf8(descriptor).to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        write_attribute(&mut out, self.pool.utf8("Code"), &code);
        self.methods.push(out);
        self
    }

    pub(crate) fn build(&mut self) -> Vec<u8> {
        let this_class = self.pool.class(&self.name.clone());
        let super_class = self.pool.class(&self.super_name.clone());
        let interfaces = self
            .interfaces
            .clone()
            .iter()
            .map(|name| self.pool.class(name))
            .collect::<Vec<_>>();

        let mut attributes = Vec::new();
        if let Some(source_file) = self.source_file.clone() {
            let mut body = Vec::new();
            body.extend_from_slice(&self.pool.utf8(&source_file).to_be_bytes());
            attributes.push((self.pool.utf8("SourceFile"), body));
        }
        for (attribute, visible) in [
            ("RuntimeVisibleAnnotations", true),
            ("RuntimeInvisibleAnnotations", false),
        ] {
            let names = self
                .annotations
                .iter()
                .filter(|(_, is_visible)| *is_visible == visible)
                .map(|(name, _)| name.clone())
                .collect::<Vec<_>>();
            if names.is_empty() {
                continue;
            }
            let mut body = Vec::new();
            body.extend_from_slice(&(names.len() as u16).to_be_bytes());
            for name in names {
                body.extend_from_slice(&self.pool.utf8(&format!("L{name};")).to_be_bytes());
                // one enum-valued element so the walker has to skip pairs
                body.extend_from_slice(&1u16.to_be_bytes());
                body.extend_from_slice(&self.pool.utf8("value").to_be_bytes());
                body.push(b'e');
                body.extend_from_slice(&self.pool.utf8("Lcom/example/Level;").to_be_bytes());
                body.extend_from_slice(&self.pool.utf8("HIGH").to_be_bytes());
            }
            attributes.push((self.pool.utf8(attribute), body));
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&MAJOR_VERSION.to_be_bytes());
        self.pool.write(&mut out);
        out.extend_from_slice(&self.access.to_be_bytes());
        out.extend_from_slice(&this_class.to_be_bytes());
        out.extend_from_slice(&super_class.to_be_bytes());
        out.extend_from_slice(&(interfaces.len() as u16).to_be_bytes());
        for interface in interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for method in &self.methods {
            out.extend_from_slice(method);
        }
        out.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
        for (name_index, body) in attributes {
            write_attribute(&mut out, name_index, &body);
        }
        out
    }
}

fn write_attribute(out: &mut Vec<u8>, name_index: u16, body: &[u8]) {
    out.extend_from_slice(&name_index.to_be_bytes());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Label(usize);

struct Fixup {
    at: usize,
    from: u32,
    label: Label,
    wide: bool,
}

pub(crate) struct CodeBuilder<'p> {
    pool: &'p mut PoolBuilder,
    code: Vec<u8>,
    labels: Vec<Option<u32>>,
    fixups: Vec<Fixup>,
    handlers: Vec<(Label, Label, Label, Option<String>)>,
    lines: Vec<(u32, u16)>,
    attributes: Vec<(String, Vec<u8>)>,
    max_locals: u16,
}

impl<'p> CodeBuilder<'p> {
    fn new(pool: &'p mut PoolBuilder) -> Self {
        Self {
            pool,
            code: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            handlers: Vec::new(),
            lines: Vec::new(),
            attributes: Vec::new(),
            max_locals: 8,
        }
    }

    pub(crate) fn offset(&self) -> u32 {
        self.code.len() as u32
    }

    pub(crate) fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub(crate) fn place(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.offset());
        self
    }

    pub(crate) fn line(&mut self, line: u16) -> &mut Self {
        let offset = self.offset();
        self.lines.push((offset, line));
        self
    }

    pub(crate) fn op(&mut self, opcode: u8) -> &mut Self {
        self.code.push(opcode);
        self
    }

    /// Opcode with a single unsigned byte operand (`iload`, `astore`, ...).
    pub(crate) fn op_u8(&mut self, opcode: u8, value: u8) -> &mut Self {
        self.code.push(opcode);
        self.code.push(value);
        self
    }

    pub(crate) fn op_u16(&mut self, opcode: u8, value: u16) -> &mut Self {
        self.code.push(opcode);
        self.code.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub(crate) fn push_int(&mut self, value: i32) -> &mut Self {
        match value {
            -1..=5 => self.op((opcodes::ICONST_0 as i32 + value) as u8),
            v if i8::try_from(v).is_ok() => self.op_u8(opcodes::BIPUSH, v as i8 as u8),
            v if i16::try_from(v).is_ok() => self.op_u16(opcodes::SIPUSH, v as i16 as u16),
            v => {
                let index = self.pool.integer(v);
                self.op_u16(opcodes::LDC_W, index)
            }
        }
    }

    pub(crate) fn ldc_string(&mut self, value: &str) -> &mut Self {
        let index = self.pool.string(value);
        self.op_u16(opcodes::LDC_W, index)
    }

    pub(crate) fn iinc(&mut self, index: u8, delta: i8) -> &mut Self {
        self.code.extend_from_slice(&[opcodes::IINC, index, delta as u8]);
        self
    }

    pub(crate) fn type_op(&mut self, opcode: u8, class: &str) -> &mut Self {
        let index = self.pool.class(class);
        self.op_u16(opcode, index)
    }

    pub(crate) fn field(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.field_ref(owner, name, descriptor);
        self.op_u16(opcode, index)
    }

    pub(crate) fn invoke(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        if opcode == opcodes::INVOKEINTERFACE {
            let index = self.pool.interface_method_ref(owner, name, descriptor);
            let count = crate::descriptor::parse_method_type(descriptor)
                .expect("valid descriptor")
                .argument_slots()
                + 1;
            self.op_u16(opcode, index);
            self.code.push(count as u8);
            self.code.push(0);
            self
        } else {
            let index = self.pool.method_ref(owner, name, descriptor);
            self.op_u16(opcode, index)
        }
    }

    pub(crate) fn jump(&mut self, opcode: u8, label: Label) -> &mut Self {
        let from = self.offset();
        self.code.push(opcode);
        let wide = matches!(opcode, opcodes::GOTO_W | opcodes::JSR_W);
        self.fixups.push(Fixup {
            at: self.code.len(),
            from,
            label,
            wide,
        });
        let width = if wide { 4 } else { 2 };
        self.code.extend(std::iter::repeat(0).take(width));
        self
    }

    fn align(&mut self) {
        while self.code.len() % 4 != 0 {
            self.code.push(0);
        }
    }

    fn wide_fixup(&mut self, from: u32, label: Label) {
        self.fixups.push(Fixup {
            at: self.code.len(),
            from,
            label,
            wide: true,
        });
        self.code.extend_from_slice(&[0, 0, 0, 0]);
    }

    pub(crate) fn tableswitch(&mut self, low: i32, default: Label, cases: &[Label]) -> &mut Self {
        let from = self.offset();
        self.code.push(opcodes::TABLESWITCH);
        self.align();
        self.wide_fixup(from, default);
        self.code.extend_from_slice(&low.to_be_bytes());
        self.code
            .extend_from_slice(&(low + cases.len() as i32 - 1).to_be_bytes());
        for case in cases {
            self.wide_fixup(from, *case);
        }
        self
    }

    pub(crate) fn lookupswitch(&mut self, default: Label, pairs: &[(i32, Label)]) -> &mut Self {
        let from = self.offset();
        self.code.push(opcodes::LOOKUPSWITCH);
        self.align();
        self.wide_fixup(from, default);
        self.code.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
        for (key, label) in pairs {
            self.code.extend_from_slice(&key.to_be_bytes());
            self.wide_fixup(from, *label);
        }
        self
    }

    pub(crate) fn try_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> &mut Self {
        self.handlers
            .push((start, end, handler, catch_type.map(str::to_string)));
        self
    }

    /// Attach a raw Code sub-attribute such as a StackMapTable.
    pub(crate) fn attribute(&mut self, name: &str, body: Vec<u8>) -> &mut Self {
        self.attributes.push((name.to_string(), body));
        self
    }

    fn resolve(&self, label: Label) -> u32 {
        self.labels[label.0].expect("label placed")
    }

    fn finish(mut self) -> Vec<u8> {
        for fixup in std::mem::take(&mut self.fixups) {
            let relative = self.resolve(fixup.label) as i32 - fixup.from as i32;
            if fixup.wide {
                self.code[fixup.at..fixup.at + 4].copy_from_slice(&relative.to_be_bytes());
            } else {
                let short = i16::try_from(relative).expect("short branch");
                self.code[fixup.at..fixup.at + 2].copy_from_slice(&short.to_be_bytes());
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(&MAX_STACK.to_be_bytes());
        out.extend_from_slice(&self.max_locals.to_be_bytes());
        out.extend_from_slice(&(self.code.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.code);
        out.extend_from_slice(&(self.handlers.len() as u16).to_be_bytes());
        let handlers = std::mem::take(&mut self.handlers);
        for (start, end, handler, catch_type) in handlers {
            let catch_index = catch_type.map(|name| self.pool.class(&name)).unwrap_or(0);
            for value in [
                self.resolve(start) as u16,
                self.resolve(end) as u16,
                self.resolve(handler) as u16,
                catch_index,
            ] {
                out.extend_from_slice(&value.to_be_bytes());
            }
        }

        let mut attributes = Vec::new();
        if !self.lines.is_empty() {
            let mut body = Vec::new();
            body.extend_from_slice(&(self.lines.len() as u16).to_be_bytes());
            for (pc, line) in &self.lines {
                body.extend_from_slice(&(*pc as u16).to_be_bytes());
                body.extend_from_slice(&line.to_be_bytes());
            }
            attributes.push((self.pool.utf8("LineNumberTable"), body));
        }
        for (name, body) in std::mem::take(&mut self.attributes) {
            attributes.push((self.pool.utf8(&name), body));
        }
        out.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
        for (name_index, body) in attributes {
            write_attribute(&mut out, name_index, &body);
        }
        out
    }
}

/// Enum shaped the way javac emits it, optionally with a constructor body
/// that increments a field.
pub(crate) fn enum_class(name: &str, constants: &[&str], counting_constructor: bool) -> Vec<u8> {
    let descriptor = format!("L{name};");
    let array = format!("[L{name};");
    let mut class = ClassBuilder::new(name);
    class.access(0x4031).super_class("java/lang/Enum");

    class.method(0x0009, "values", &format!("(){array}"), |code| {
        code.field(opcodes::GETSTATIC, name, "$VALUES", &array);
        code.invoke(opcodes::INVOKEVIRTUAL, &array, "clone", "()Ljava/lang/Object;");
        code.type_op(opcodes::CHECKCAST, &array);
        code.op(opcodes::ARETURN);
    });
    class.method(
        0x0009,
        "valueOf",
        &format!("(Ljava/lang/String;){descriptor}"),
        |code| {
            code.type_op(opcodes::LDC_W, name);
            code.op(opcodes::ALOAD_0);
            code.invoke(
                opcodes::INVOKESTATIC,
                "java/lang/Enum",
                "valueOf",
                "(Ljava/lang/Class;Ljava/lang/String;)Ljava/lang/Enum;",
            );
            code.type_op(opcodes::CHECKCAST, name);
            code.op(opcodes::ARETURN);
        },
    );
    class.method(0x0002, "<init>", "(Ljava/lang/String;I)V", |code| {
        code.op(opcodes::ALOAD_0).op(opcodes::ALOAD_1).op(opcodes::ILOAD_2);
        code.invoke(
            opcodes::INVOKESPECIAL,
            "java/lang/Enum",
            "<init>",
            "(Ljava/lang/String;I)V",
        );
        if counting_constructor {
            code.op(opcodes::ALOAD_0).op(opcodes::DUP);
            code.field(opcodes::GETFIELD, name, "i", "I");
            code.op(opcodes::ICONST_1).op(opcodes::IADD);
            code.field(opcodes::PUTFIELD, name, "i", "I");
        }
        code.op(opcodes::RETURN);
    });
    class.method(0x0008, "<clinit>", "()V", |code| {
        for (ordinal, constant) in constants.iter().enumerate() {
            code.type_op(opcodes::NEW, name).op(opcodes::DUP);
            code.ldc_string(constant).push_int(ordinal as i32);
            code.invoke(opcodes::INVOKESPECIAL, name, "<init>", "(Ljava/lang/String;I)V");
            code.field(opcodes::PUTSTATIC, name, constant, &descriptor);
        }
        code.push_int(constants.len() as i32).type_op(opcodes::ANEWARRAY, name);
        for (ordinal, constant) in constants.iter().enumerate() {
            code.op(opcodes::DUP).push_int(ordinal as i32);
            code.field(opcodes::GETSTATIC, name, constant, &descriptor);
            code.op(opcodes::AASTORE);
        }
        code.field(opcodes::PUTSTATIC, name, "$VALUES", &array);
        code.op(opcodes::RETURN);
    });
    class.build()
}

/// `void foo(int i) { assert i + 20 > 10; [if (i > 1) state = 1;] }` with
/// the `$assertionsDisabled` static initializer javac adds.
pub(crate) fn assert_class(name: &str, with_if: bool) -> Vec<u8> {
    let mut class = ClassBuilder::new(name);
    class.method(0x0001, "foo", "(I)V", |code| {
        let after_assert = code.label();
        code.line(5);
        code.field(opcodes::GETSTATIC, name, "$assertionsDisabled", "Z");
        code.jump(opcodes::IFNE, after_assert);
        code.op(opcodes::ILOAD_1).push_int(20).op(opcodes::IADD).push_int(10);
        code.jump(opcodes::IF_ICMPGT, after_assert);
        code.type_op(opcodes::NEW, "java/lang/AssertionError").op(opcodes::DUP);
        code.invoke(opcodes::INVOKESPECIAL, "java/lang/AssertionError", "<init>", "()V");
        code.op(opcodes::ATHROW);
        code.place(after_assert);
        if with_if {
            let end = code.label();
            code.line(6);
            code.op(opcodes::ILOAD_1).op(opcodes::ICONST_1);
            code.jump(opcodes::IF_ICMPLE, end);
            code.line(7);
            code.op(opcodes::ALOAD_0).op(opcodes::ICONST_1);
            code.field(opcodes::PUTFIELD, name, "state", "I");
            code.place(end);
        }
        code.line(9);
        code.op(opcodes::RETURN);
    });
    class.method(0x0008, "<clinit>", "()V", |code| {
        let enabled = code.label();
        let store = code.label();
        code.type_op(opcodes::LDC_W, name);
        code.invoke(opcodes::INVOKEVIRTUAL, "java/lang/Class", "desiredAssertionStatus", "()Z");
        code.jump(opcodes::IFNE, enabled);
        code.op(opcodes::ICONST_1).jump(opcodes::GOTO, store);
        code.place(enabled).op(opcodes::ICONST_0);
        code.place(store);
        code.field(opcodes::PUTSTATIC, name, "$assertionsDisabled", "Z");
        code.op(opcodes::RETURN);
    });
    class.build()
}

/// `int f(String s) { switch (s) { case "a": return 1; case "b": return 2; default: return 0; } }`
pub(crate) fn string_switch_class(name: &str) -> Vec<u8> {
    let mut class = ClassBuilder::new(name);
    class.method(0x0001, "f", "(Ljava/lang/String;)I", |code| {
        let case_a = code.label();
        let case_b = code.label();
        let dispatch = code.label();
        let ret_a = code.label();
        let ret_b = code.label();
        let ret_default = code.label();
        code.op(opcodes::ALOAD_1).op(opcodes::ASTORE_2);
        code.op(opcodes::ICONST_M1).op(opcodes::ISTORE_3);
        code.op(opcodes::ALOAD_2);
        code.invoke(opcodes::INVOKEVIRTUAL, "java/lang/String", "hashCode", "()I");
        code.lookupswitch(dispatch, &[(97, case_a), (98, case_b)]);
        for (label, literal, value) in [(case_a, "a", 0), (case_b, "b", 1)] {
            code.place(label).op(opcodes::ALOAD_2).ldc_string(literal);
            code.invoke(
                opcodes::INVOKEVIRTUAL,
                "java/lang/String",
                "equals",
                "(Ljava/lang/Object;)Z",
            );
            code.jump(opcodes::IFEQ, dispatch);
            code.push_int(value).op(opcodes::ISTORE_3);
            if value == 0 {
                code.jump(opcodes::GOTO, dispatch);
            }
        }
        code.place(dispatch).op(opcodes::ILOAD_3);
        code.tableswitch(0, ret_default, &[ret_a, ret_b]);
        code.place(ret_a).op(opcodes::ICONST_1).op(opcodes::IRETURN);
        code.place(ret_b).op(opcodes::ICONST_2).op(opcodes::IRETURN);
        code.place(ret_default).op(opcodes::ICONST_0).op(opcodes::IRETURN);
    });
    class.build()
}
