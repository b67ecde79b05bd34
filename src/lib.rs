//! Bytecode mutation engine for JVM class files.
//!
//! [Mutater::find_mutations] lists the mutations the selected operators
//! propose for a class, after filtering out compiler-generated code.
//! [Mutater::get_mutation] rewrites the class with one of them applied.

mod bytecode;
pub mod catalogue;
mod cfg;
mod classfile;
pub mod config;
mod context;
mod descriptor;
mod emit;
pub mod error;
pub mod filters;
mod ir;
mod layout;
mod method_info;
pub mod mutater;
pub mod mutation;
mod opcodes;
pub mod operators;
pub mod report;
pub mod source;
#[cfg(test)]
mod testing;
mod visitor;

pub use catalogue::OperatorCatalogue;
pub use config::{EngineSettings, MutationConfig};
pub use error::{MutationError, Result};
pub use filters::FilterKind;
pub use mutater::Mutater;
pub use mutation::{Location, Mutant, MutationDetails, MutationIdentifier};
pub use operators::Operator;
pub use source::{
    ClassByteSource, ClassFilter, ClasspathSource, DirectorySource, JarSource, MemorySource,
};
