use tracing::{debug, warn};

use crate::cfg::BlockMap;
use crate::classfile::parse_class;
use crate::config::EngineSettings;
use crate::context::MutationContext;
use crate::emit::rewrite_method;
use crate::error::{MutationError, Result};
use crate::filters::{FilterChain, MethodScan};
use crate::ir::{Class, Method};
use crate::method_info::MethodInfo;
use crate::mutation::{Mutant, MutationDetails, MutationIdentifier};
use crate::operators::Operator;
use crate::source::{internal_name, ClassByteSource};
use crate::visitor::{build_chain, Collector, Discard, MethodVisitor};

/// Finds mutations in classes and builds mutants on request.
pub struct Mutater<S> {
    source: S,
    settings: EngineSettings,
    filters: FilterChain,
}

impl<S: ClassByteSource> Mutater<S> {
    pub fn new(source: S, settings: EngineSettings) -> Self {
        let filters = FilterChain::new(&settings.filters, &settings.filter_settings);
        debug!(
            operators = settings.operators.len(),
            filters = ?filters.kinds(),
            "mutater ready"
        );
        Self {
            source,
            settings,
            filters,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Every mutation the configured operators find in `class_name`, after
    /// filtering. A class the source does not have yields no mutations.
    pub fn find_mutations(&self, class_name: &str) -> Result<Vec<MutationDetails>> {
        let name = internal_name(class_name);
        let Some(data) = self.read(&name)? else {
            warn!(class = %name, "class not found, no mutations");
            return Ok(Vec::new());
        };
        let class = parse_class(&data).map_err(|err| MutationError::invalid_class(&name, &err))?;
        if self.settings.is_excluded_class(&class.annotations) {
            debug!(class = %class.name, "class excluded by annotation");
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for method in &class.methods {
            if self.settings.is_excluded_method(&method.name) {
                debug!(class = %class.name, method = %method.name, "method excluded");
                continue;
            }
            let info = method_info(&class, method);
            let blocks = BlockMap::build(method);
            let context = visit_method(
                &class,
                method,
                &info,
                &blocks,
                &self.settings.operators,
                None,
                Box::new(Discard),
            )?;
            let scan = MethodScan {
                info: &info,
                method,
                blocks: &blocks,
            };
            let mutations = self.filters.apply(&class, &scan, context.into_mutations());
            debug!(
                method = %info.location(),
                blocks = blocks.block_count(),
                mutations = mutations.len(),
                "scanned method"
            );
            found.extend(mutations);
        }
        debug!(class = %class.name, mutations = found.len(), "scanned class");
        Ok(found)
    }

    /// Rewrite the class so that exactly the mutation `id` is applied.
    pub fn get_mutation(&self, id: &MutationIdentifier) -> Result<Mutant> {
        let name = internal_name(id.class_name());
        let data = self
            .read(&name)?
            .ok_or_else(|| MutationError::ClassNotFound {
                class: name.clone(),
            })?;
        let class = parse_class(&data).map_err(|err| MutationError::invalid_class(&name, &err))?;
        let location = &id.location;
        let method = class
            .methods
            .iter()
            .find(|method| {
                method.name == location.method_name
                    && method.descriptor == location.method_descriptor
            })
            .ok_or_else(|| {
                MutationError::not_applicable(&name, format!("no method with code at {location}"))
            })?;
        let operator = Operator::from_id(&id.operator).ok_or_else(|| {
            MutationError::not_applicable(&name, format!("unknown operator {}", id.operator))
        })?;

        let info = method_info(&class, method);
        let blocks = BlockMap::build(method);
        let mut emitted = Vec::new();
        let context = visit_method(
            &class,
            method,
            &info,
            &blocks,
            &[operator],
            Some(id),
            Box::new(Collector::new(&mut emitted)),
        )?;
        if !context.applied() {
            return Err(MutationError::not_applicable(
                &name,
                format!("{id} does not match an instruction at every index"),
            ));
        }
        let first = id.first_index();
        let details = context
            .into_mutations()
            .into_iter()
            .find(|details| details.first_index() == first)
            .map(|details| MutationDetails {
                id: id.clone(),
                in_finally_block: id.indexes.len() > 1,
                ..details
            })
            .ok_or_else(|| {
                MutationError::not_applicable(&name, format!("{id} was not registered"))
            })?;

        let bytes = rewrite_method(&class.name, &data, method, &emitted)?;
        debug!(id = %id, size = bytes.len(), "built mutant");
        Ok(Mutant { details, bytes })
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        self.source.read(name).map_err(|err| MutationError::Source {
            class: name.to_string(),
            reason: format!("{err:#}"),
        })
    }
}

fn method_info(class: &Class, method: &Method) -> MethodInfo {
    MethodInfo::new(
        &class.name,
        class.access,
        &method.name,
        &method.descriptor,
        method.access,
    )
}

/// Feed every instruction of `method` through the operator chain.
fn visit_method<'m>(
    class: &'m Class,
    method: &'m Method,
    info: &'m MethodInfo,
    blocks: &'m BlockMap,
    operators: &[Operator],
    target: Option<&'m MutationIdentifier>,
    sink: Box<dyn MethodVisitor + '_>,
) -> Result<MutationContext<'m>> {
    let mut context = MutationContext::new(
        info.location(),
        class.source_file.as_deref(),
        &method.line_numbers,
        blocks,
        target,
    );
    let mut chain = build_chain(operators, info, sink);
    for inst in &method.instructions {
        context.advance(inst);
        chain.visit_instruction(&mut context, inst)?;
    }
    Ok(context)
}
