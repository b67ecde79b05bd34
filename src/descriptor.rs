use std::str::FromStr;

use anyhow::{Context, Result};
use jdescriptor::{MethodDescriptor, TypeDescriptor};

/// Computational type of a descriptor component.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum JavaType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Reference,
    Void,
}

impl JavaType {
    /// Operand stack slots occupied by a value of this type.
    pub(crate) fn size(self) -> u8 {
        match self {
            JavaType::Void => 0,
            JavaType::Long | JavaType::Double => 2,
            _ => 1,
        }
    }
}

/// Parameter and return types of a method descriptor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MethodType {
    pub(crate) parameters: Vec<JavaType>,
    pub(crate) return_type: JavaType,
}

#[cfg(test)]
impl MethodType {
    /// Total stack slots taken by the arguments (receiver excluded).
    pub(crate) fn argument_slots(&self) -> u32 {
        self.parameters.iter().map(|ty| ty.size() as u32).sum()
    }
}

/// True when the character after the closing parenthesis is `V`.
pub(crate) fn is_void(descriptor: &str) -> bool {
    descriptor
        .split_once(')')
        .map(|(_, ret)| ret.starts_with('V'))
        .unwrap_or(false)
}

pub(crate) fn parse_method_type(descriptor: &str) -> Result<MethodType> {
    let validated =
        MethodDescriptor::from_str(descriptor).context("parse method descriptor")?;
    let inner = descriptor
        .strip_prefix('(')
        .context("method descriptor must start with '('")?;
    let (params, ret) = inner
        .split_once(')')
        .context("method descriptor missing ')'")?;

    let mut parameters = Vec::new();
    let mut rest = params;
    while !rest.is_empty() {
        let (ty, tail) = parse_field_type(rest)?;
        parameters.push(ty);
        rest = tail;
    }
    if parameters.len() != validated.parameter_types().len() {
        anyhow::bail!("inconsistent parameter count in {}", descriptor);
    }

    let return_type = if ret == "V" {
        JavaType::Void
    } else {
        let (ty, tail) = parse_field_type(ret)?;
        if !tail.is_empty() {
            anyhow::bail!("trailing characters in {}", descriptor);
        }
        ty
    };
    if return_type == JavaType::Reference && !is_reference_type(validated.return_type()) {
        anyhow::bail!("inconsistent return type in {}", descriptor);
    }

    Ok(MethodType {
        parameters,
        return_type,
    })
}

fn parse_field_type(input: &str) -> Result<(JavaType, &str)> {
    let first = input.chars().next().context("empty field descriptor")?;
    let ty = match first {
        'Z' => JavaType::Boolean,
        'B' => JavaType::Byte,
        'C' => JavaType::Char,
        'S' => JavaType::Short,
        'I' => JavaType::Int,
        'J' => JavaType::Long,
        'F' => JavaType::Float,
        'D' => JavaType::Double,
        'L' => {
            let end = input.find(';').context("unterminated class descriptor")?;
            return Ok((JavaType::Reference, &input[end + 1..]));
        }
        '[' => {
            let (_, tail) = parse_field_type(&input[1..])?;
            return Ok((JavaType::Reference, tail));
        }
        other => anyhow::bail!("unexpected descriptor character '{}'", other),
    };
    Ok((ty, &input[1..]))
}

fn is_reference_type(ty: &TypeDescriptor) -> bool {
    matches!(ty, TypeDescriptor::Object(_) | TypeDescriptor::Array(_, _))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_void_only_checks_return_type() {
        assert!(is_void("()V"));
        assert!(is_void("(Ljava/lang/String;I)V"));
        assert!(!is_void("(V)I"));
        assert!(!is_void("()Ljava/lang/Void;"));
    }

    #[test]
    fn parse_method_type_sizes_wide_parameters() {
        let ty = parse_method_type("(IJ[Ljava/lang/String;D)Z").expect("parse");

        assert_eq!(
            ty.parameters,
            vec![
                JavaType::Int,
                JavaType::Long,
                JavaType::Reference,
                JavaType::Double
            ]
        );
        assert_eq!(ty.argument_slots(), 6);
        assert_eq!(ty.return_type, JavaType::Boolean);
    }

    #[test]
    fn parse_method_type_handles_reference_return() {
        let ty = parse_method_type("()[[I").expect("parse");

        assert!(ty.parameters.is_empty());
        assert_eq!(ty.return_type, JavaType::Reference);
    }

    #[test]
    fn parse_method_type_rejects_garbage() {
        assert!(parse_method_type("I)V").is_err());
        assert!(parse_method_type("(Q)V").is_err());
    }
}
