use crate::filters::{drop_ordinals, FilterKind, MethodScan, MutationFilter};
use crate::ir::Class;
use crate::mutation::MutationDetails;
use crate::opcodes;

/// Suppresses mutations in the methods javac synthesises for enums.
pub(crate) struct EnumFilter;

impl MutationFilter for EnumFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Enum
    }

    fn apply(
        &self,
        class: &Class,
        scan: &MethodScan<'_>,
        mutations: Vec<MutationDetails>,
    ) -> Vec<MutationDetails> {
        if !scan.info.is_generated_enum_method() {
            return mutations;
        }
        if !scan.info.is_static_initializer() {
            return Vec::new();
        }
        // only the prefix that builds the constants and $VALUES is generated
        let values_store = scan.method.instructions.iter().find(|inst| {
            inst.opcode() == opcodes::PUTSTATIC
                && inst
                    .field()
                    .is_some_and(|field| field.owner == class.name && field.name == "$VALUES")
        });
        match values_store {
            Some(store) => drop_ordinals(mutations, &[(0, store.ordinal)]),
            None => mutations,
        }
    }
}
