use crate::bytecode::{is_switch, Operand};
use crate::filters::{
    aload_slot, astore_slot, drop_ordinals, iload_slot, istore_slot, FilterKind, MethodScan,
    MutationFilter,
};
use crate::ir::{Class, Instruction, Method};
use crate::mutation::MutationDetails;
use crate::opcodes;

/// Suppresses the hash dispatch javac emits for `switch` over strings.
///
/// The recognised shape is
/// `[astore s] iconst_m1; istore n; aload s; String.hashCode(); switch`
/// whose default target is `iload n` feeding a second switch. Everything from
/// the start of that shape through the `iload n` is generated.
pub(crate) struct StringSwitchFilter;

impl MutationFilter for StringSwitchFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::StringSwitch
    }

    fn apply(
        &self,
        _class: &Class,
        scan: &MethodScan<'_>,
        mutations: Vec<MutationDetails>,
    ) -> Vec<MutationDetails> {
        let ranges = scan
            .method
            .instructions
            .iter()
            .filter(|inst| is_string_hash_code(inst))
            .filter_map(|inst| generated_range(scan.method, inst.ordinal))
            .collect::<Vec<_>>();
        drop_ordinals(mutations, &ranges)
    }
}

fn generated_range(method: &Method, hash_call: usize) -> Option<(usize, usize)> {
    let instructions = &method.instructions;
    if hash_call < 3 {
        return None;
    }
    let hash_switch = instructions.get(hash_call + 1)?;
    if !is_switch(hash_switch.opcode()) {
        return None;
    }
    aload_slot(&instructions[hash_call - 1])?;
    let selector = istore_slot(&instructions[hash_call - 2])?;
    if instructions[hash_call - 3].opcode() != opcodes::ICONST_M1 {
        return None;
    }
    let mut start = hash_call - 3;
    if start > 0 && astore_slot(&instructions[start - 1]).is_some() {
        start -= 1;
    }

    let default = match &hash_switch.insn.operand {
        Operand::TableSwitch { default, .. } | Operand::LookupSwitch { default, .. } => *default,
        _ => return None,
    };
    let dispatch = method.ordinal_at(default)?;
    if iload_slot(&instructions[dispatch]) != Some(selector) {
        return None;
    }
    if !instructions
        .get(dispatch + 1)
        .is_some_and(|next| is_switch(next.opcode()))
    {
        return None;
    }
    Some((start, dispatch))
}

fn is_string_hash_code(inst: &Instruction) -> bool {
    inst.opcode() == opcodes::INVOKEVIRTUAL
        && inst.call().is_some_and(|call| {
            call.owner == "java/lang/String" && call.name == "hashCode" && call.descriptor == "()I"
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::parse_class;
    use crate::filters::test_support::{every_ordinal, surviving};
    use crate::testing::{string_switch_class, ClassBuilder};

    #[test]
    fn hash_dispatch_is_suppressed() {
        let class = parse_class(&string_switch_class("com/example/Java7Switch")).expect("parse");

        let kept = surviving(&StringSwitchFilter, &class, "f", every_ordinal(&class, "f"));

        let mut expected = vec![0];
        expected.extend(21..=27);
        assert_eq!(kept, expected);
    }

    #[test]
    fn user_hash_code_switch_is_kept() {
        let mut builder = ClassBuilder::new("com/example/Hashes");
        builder.method(0x0001, "f", "(Ljava/lang/String;)I", |code| {
            let one = code.label();
            let other = code.label();
            code.op(opcodes::ALOAD_1);
            code.invoke(opcodes::INVOKEVIRTUAL, "java/lang/String", "hashCode", "()I");
            code.lookupswitch(other, &[(1, one)]);
            code.place(one).op(opcodes::ICONST_1).op(opcodes::IRETURN);
            code.place(other).op(opcodes::ICONST_0).op(opcodes::IRETURN);
        });
        let class = parse_class(&builder.build()).expect("parse");

        let mutations = every_ordinal(&class, "f");
        let count = mutations.len();
        let kept = surviving(&StringSwitchFilter, &class, "f", mutations);

        assert_eq!(kept.len(), count);
    }
}
