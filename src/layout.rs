//! Byte-level layout of a class file.
//!
//! The reader gets semantics from `jclassfile`; this walker records where
//! things live in the raw bytes so the emitter can splice a rewritten Code
//! attribute and extend the constant pool without re-serialising the class.

use anyhow::{Context, Result};

const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Span of one attribute: `start` points at its name index, `body_start` at
/// the first payload byte, `end` one past the payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct AttributeSpan {
    pub(crate) name_index: u16,
    pub(crate) start: usize,
    pub(crate) body_start: usize,
    pub(crate) end: usize,
}

impl AttributeSpan {
    pub(crate) fn body<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.body_start..self.end]
    }
}

#[derive(Clone, Debug)]
pub(crate) struct MethodLayout {
    pub(crate) access_flags: u16,
    pub(crate) attributes: Vec<AttributeSpan>,
}

#[derive(Clone, Debug)]
pub(crate) struct ClassLayout {
    pub(crate) constant_pool_count: u16,
    /// Offset of the count field; entries follow it.
    pub(crate) constant_pool_start: usize,
    pub(crate) constant_pool_end: usize,
    pub(crate) access_flags: u16,
    pub(crate) methods: Vec<MethodLayout>,
    pub(crate) attributes: Vec<AttributeSpan>,
    /// Pool strings that are plain UTF-8. Strings that need Modified UTF-8
    /// (NUL, supplementary characters) are absent; resolve those through
    /// `jclassfile`.
    utf8: Vec<Option<String>>,
}

impl ClassLayout {
    pub(crate) fn parse(data: &[u8]) -> Result<Self> {
        let mut offset = 0usize;
        let magic = read_u32_class(data, &mut offset)?;
        if magic != CLASS_MAGIC {
            anyhow::bail!("invalid class file magic");
        }
        let _minor = read_u16_class(data, &mut offset)?;
        let _major = read_u16_class(data, &mut offset)?;
        let constant_pool_start = offset;
        let (constant_pool_count, utf8) = parse_constant_pool(data, &mut offset)?;
        let constant_pool_end = offset;
        let access_flags = read_u16_class(data, &mut offset)?;
        let _this_class = read_u16_class(data, &mut offset)?;
        let _super_class = read_u16_class(data, &mut offset)?;
        let interface_count = read_u16_class(data, &mut offset)? as usize;
        skip_class_bytes(data, &mut offset, interface_count * 2)?;

        let field_count = read_u16_class(data, &mut offset)?;
        for _ in 0..field_count {
            skip_class_bytes(data, &mut offset, 6)?;
            parse_attributes(data, &mut offset)?;
        }

        let method_count = read_u16_class(data, &mut offset)?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            let access_flags = read_u16_class(data, &mut offset)?;
            // name and descriptor come from jclassfile
            skip_class_bytes(data, &mut offset, 4)?;
            let attributes = parse_attributes(data, &mut offset)?;
            methods.push(MethodLayout {
                access_flags,
                attributes,
            });
        }

        let attributes = parse_attributes(data, &mut offset)?;
        if offset != data.len() {
            anyhow::bail!("{} trailing bytes after class attributes", data.len() - offset);
        }

        Ok(Self {
            constant_pool_count,
            constant_pool_start,
            constant_pool_end,
            access_flags,
            methods,
            attributes,
            utf8,
        })
    }

    pub(crate) fn utf8(&self, index: u16) -> Option<&str> {
        self.utf8.get(index as usize).and_then(|value| value.as_deref())
    }

    pub(crate) fn attribute_named<'a>(
        &self,
        attributes: &'a [AttributeSpan],
        name: &str,
    ) -> Option<&'a AttributeSpan> {
        attributes
            .iter()
            .find(|attr| self.utf8(attr.name_index) == Some(name))
    }

    pub(crate) fn method_code(&self, method_index: usize) -> Option<&AttributeSpan> {
        let method = self.methods.get(method_index)?;
        self.attribute_named(&method.attributes, "Code")
    }

    /// Pool index of the file name in the class-level SourceFile attribute.
    pub(crate) fn source_file_index(&self, data: &[u8]) -> Result<Option<u16>> {
        let Some(span) = self.attribute_named(&self.attributes, "SourceFile") else {
            return Ok(None);
        };
        let mut offset = 0;
        Ok(Some(read_u16_class(span.body(data), &mut offset)?))
    }

    /// Pool indexes of the type descriptors of class annotations, both
    /// runtime-visible and invisible.
    pub(crate) fn annotation_type_indexes(&self, data: &[u8]) -> Result<Vec<u16>> {
        let mut indexes = Vec::new();
        for span in &self.attributes {
            let is_annotations = matches!(
                self.utf8(span.name_index),
                Some("RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations")
            );
            if !is_annotations {
                continue;
            }
            let body = span.body(data);
            let mut offset = 0;
            let count = read_u16_class(body, &mut offset)?;
            for _ in 0..count {
                indexes.push(read_u16_class(body, &mut offset)?);
                skip_element_pairs(body, &mut offset)?;
            }
        }
        Ok(indexes)
    }
}

/// Raw Code attribute, split into the pieces the emitter rewrites.
#[derive(Clone, Debug)]
pub(crate) struct CodeLayout {
    pub(crate) max_stack: u16,
    pub(crate) max_locals: u16,
    pub(crate) code_start: usize,
    pub(crate) code_end: usize,
    pub(crate) exception_table: Vec<[u16; 4]>,
    pub(crate) attributes: Vec<AttributeSpan>,
}

impl CodeLayout {
    /// Parse the payload of a Code attribute; spans are relative to `body`.
    pub(crate) fn parse(body: &[u8]) -> Result<Self> {
        let mut offset = 0usize;
        let max_stack = read_u16_class(body, &mut offset)?;
        let max_locals = read_u16_class(body, &mut offset)?;
        let code_length = read_u32_class(body, &mut offset)? as usize;
        let code_start = offset;
        skip_class_bytes(body, &mut offset, code_length)?;
        let code_end = offset;
        let handler_count = read_u16_class(body, &mut offset)?;
        let mut exception_table = Vec::with_capacity(handler_count as usize);
        for _ in 0..handler_count {
            exception_table.push([
                read_u16_class(body, &mut offset)?,
                read_u16_class(body, &mut offset)?,
                read_u16_class(body, &mut offset)?,
                read_u16_class(body, &mut offset)?,
            ]);
        }
        let attributes = parse_attributes(body, &mut offset)?;
        if offset != body.len() {
            anyhow::bail!("Code attribute length mismatch");
        }
        Ok(Self {
            max_stack,
            max_locals,
            code_start,
            code_end,
            exception_table,
            attributes,
        })
    }
}

fn parse_constant_pool(data: &[u8], offset: &mut usize) -> Result<(u16, Vec<Option<String>>)> {
    let count = read_u16_class(data, offset)?;
    let mut utf8 = vec![None; count as usize];
    let mut index = 1u16;
    while index < count {
        let tag = read_u8_class(data, offset)?;
        match tag {
            1 => {
                let len = read_u16_class(data, offset)? as usize;
                let bytes = read_bytes_class(data, offset, len)?;
                utf8[index as usize] = std::str::from_utf8(bytes).ok().map(str::to_string);
            }
            3 | 4 => skip_class_bytes(data, offset, 4)?,
            5 | 6 => {
                skip_class_bytes(data, offset, 8)?;
                index += 1;
            }
            7 | 8 | 16 | 19 | 20 => skip_class_bytes(data, offset, 2)?,
            9 | 10 | 11 | 12 | 17 | 18 => skip_class_bytes(data, offset, 4)?,
            15 => skip_class_bytes(data, offset, 3)?,
            _ => anyhow::bail!("unsupported constant pool tag: {}", tag),
        }
        index += 1;
    }
    Ok((count, utf8))
}

fn parse_attributes(data: &[u8], offset: &mut usize) -> Result<Vec<AttributeSpan>> {
    let count = read_u16_class(data, offset)?;
    let mut spans = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let start = *offset;
        let name_index = read_u16_class(data, offset)?;
        let length = read_u32_class(data, offset)? as usize;
        let body_start = *offset;
        skip_class_bytes(data, offset, length)?;
        spans.push(AttributeSpan {
            name_index,
            start,
            body_start,
            end: *offset,
        });
    }
    Ok(spans)
}

fn skip_element_pairs(data: &[u8], offset: &mut usize) -> Result<()> {
    let pairs = read_u16_class(data, offset)?;
    for _ in 0..pairs {
        skip_class_bytes(data, offset, 2)?;
        skip_element_value(data, offset)?;
    }
    Ok(())
}

fn skip_element_value(data: &[u8], offset: &mut usize) -> Result<()> {
    let tag = read_u8_class(data, offset)?;
    match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => {
            skip_class_bytes(data, offset, 2)
        }
        b'e' => skip_class_bytes(data, offset, 4),
        b'@' => {
            skip_class_bytes(data, offset, 2)?;
            skip_element_pairs(data, offset)
        }
        b'[' => {
            let count = read_u16_class(data, offset)?;
            for _ in 0..count {
                skip_element_value(data, offset)?;
            }
            Ok(())
        }
        _ => anyhow::bail!("unsupported annotation element tag: {}", tag),
    }
}

pub(crate) fn read_u8_class(data: &[u8], offset: &mut usize) -> Result<u8> {
    let byte = *data.get(*offset).context("class file out of bounds")?;
    *offset += 1;
    Ok(byte)
}

pub(crate) fn read_u16_class(data: &[u8], offset: &mut usize) -> Result<u16> {
    let bytes = read_bytes_class(data, offset, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn read_u32_class(data: &[u8], offset: &mut usize) -> Result<u32> {
    let bytes = read_bytes_class(data, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn read_bytes_class<'a>(
    data: &'a [u8],
    offset: &mut usize,
    len: usize,
) -> Result<&'a [u8]> {
    let start = *offset;
    let end = start.checked_add(len).context("class file out of bounds")?;
    let slice = data.get(start..end).context("class file out of bounds")?;
    *offset = end;
    Ok(slice)
}

fn skip_class_bytes(data: &[u8], offset: &mut usize, len: usize) -> Result<()> {
    read_bytes_class(data, offset, len)?;
    Ok(())
}
