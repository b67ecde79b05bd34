//! `jmutate.toml` configuration.
//!
//! The file is deserialised into [MutationConfig] and then resolved into
//! [EngineSettings]; every selector and pattern is checked during
//! resolution, before any class is scanned.

use std::fs::read_to_string;
use std::path::Path;

use anyhow::Context;
use regex::Regex;
use serde::Deserialize;

use crate::catalogue::OperatorCatalogue;
use crate::error::{MutationError, Result};
use crate::filters::{FilterKind, FilterSettings};
use crate::operators::Operator;

/// Configuration as written by the user.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MutationConfig {
    /// Operator names, ids or groups.
    pub mutators: Vec<String>,
    /// Methods whose name matches any of these regexes are not mutated.
    pub excluded_methods: Vec<String>,
    /// Classes carrying one of these annotations, by simple or qualified name,
    /// are not mutated.
    pub excluded_class_annotations: Vec<String>,
    /// Merge mutations duplicated by inlined `finally` blocks.
    pub detect_inlined_code: bool,
    pub filters: Vec<String>,
    pub groovy_interfaces: Vec<String>,
    pub groovy_class_patterns: Vec<String>,
    pub synthetic_method_allowlist: Vec<String>,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            mutators: vec!["DEFAULTS".to_string()],
            excluded_methods: Vec::new(),
            excluded_class_annotations: ["Generated", "DoNotMutate", "CoverageIgnore"]
                .map(String::from)
                .to_vec(),
            detect_inlined_code: false,
            filters: FilterKind::DEFAULTS
                .iter()
                .map(|kind| kind.name().to_string())
                .collect(),
            groovy_interfaces: vec!["groovy/lang/GroovyObject".to_string()],
            groovy_class_patterns: vec![r"\$_.*_closure".to_string()],
            synthetic_method_allowlist: vec![r"^lambda\$".to_string()],
        }
    }
}

impl MutationConfig {
    pub fn read_file(path: &Path) -> anyhow::Result<MutationConfig> {
        let toml = read_to_string(path).with_context(|| format!("read config {path:?}"))?;
        Self::from_toml(&toml).with_context(|| format!("parse toml from {path:?}"))
    }

    pub fn from_toml(toml: &str) -> anyhow::Result<MutationConfig> {
        Ok(toml::de::from_str(toml)?)
    }

    /// Validate selectors and compile patterns.
    pub fn resolve(&self) -> Result<EngineSettings> {
        let operators = OperatorCatalogue::resolve(&self.mutators)?;
        let mut filters = Vec::new();
        for name in &self.filters {
            let kind = name.parse::<FilterKind>()?;
            if !filters.contains(&kind) {
                filters.push(kind);
            }
        }
        if self.detect_inlined_code && !filters.contains(&FilterKind::InlinedFinally) {
            filters.push(FilterKind::InlinedFinally);
        }
        Ok(EngineSettings {
            operators,
            excluded_methods: compile(&self.excluded_methods)?,
            excluded_class_annotations: self.excluded_class_annotations.clone(),
            filters,
            filter_settings: FilterSettings {
                groovy_interfaces: self
                    .groovy_interfaces
                    .iter()
                    .map(|name| name.replace('.', "/"))
                    .collect(),
                groovy_class_patterns: compile(&self.groovy_class_patterns)?,
                synthetic_method_allowlist: compile(&self.synthetic_method_allowlist)?,
            },
        })
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|err| MutationError::invalid_pattern(pattern, &err))
        })
        .collect()
}

/// Validated engine configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub(crate) operators: Vec<Operator>,
    pub(crate) excluded_methods: Vec<Regex>,
    pub(crate) excluded_class_annotations: Vec<String>,
    pub(crate) filters: Vec<FilterKind>,
    pub(crate) filter_settings: FilterSettings,
}

impl EngineSettings {
    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    pub fn filters(&self) -> &[FilterKind] {
        &self.filters
    }

    /// Replace the operator set, keeping everything else.
    pub fn with_operators(mut self, operators: Vec<Operator>) -> Self {
        self.operators = operators;
        self
    }

    pub(crate) fn is_excluded_method(&self, name: &str) -> bool {
        self.excluded_methods
            .iter()
            .any(|pattern| pattern.is_match(name))
    }

    /// True if any annotation matches an excluded name, by simple or
    /// fully qualified name.
    pub(crate) fn is_excluded_class(&self, annotations: &[String]) -> bool {
        annotations.iter().any(|annotation| {
            let qualified = annotation.replace('/', ".");
            let simple = qualified.rsplit(['.', '$']).next().unwrap_or(&qualified);
            self.excluded_class_annotations
                .iter()
                .any(|excluded| *excluded == qualified || excluded == simple)
        })
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        // defaults only name built-in operators, filters and valid patterns
        let config = MutationConfig::default();
        EngineSettings {
            operators: OperatorCatalogue::by_name("DEFAULTS").unwrap_or_default(),
            excluded_methods: Vec::new(),
            excluded_class_annotations: config.excluded_class_annotations,
            filters: FilterKind::DEFAULTS.to_vec(),
            filter_settings: FilterSettings {
                groovy_interfaces: config.groovy_interfaces,
                groovy_class_patterns: compile(&config.groovy_class_patterns).unwrap_or_default(),
                synthetic_method_allowlist: compile(&config.synthetic_method_allowlist)
                    .unwrap_or_default(),
            },
        }
    }
}
