//! JSON and SARIF renderings of a mutation list.

use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_sarif::sarif::{
    ArtifactLocation, Invocation, Location, LogicalLocation, Message, MultiformatMessageString,
    PhysicalLocation, Region, ReportingDescriptor, Result as SarifResult, Run, Sarif, Tool,
    ToolComponent, SCHEMA_URL,
};

use crate::mutation::MutationDetails;
use crate::operators::Operator;

/// Everything `jmutate list` found.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationReport {
    /// Classes scanned, including those without mutations.
    pub classes: usize,
    pub mutations: Vec<MutationDetails>,
}

pub fn build_invocation() -> Invocation {
    let arguments: Vec<String> = std::env::args().collect();
    let command_line = arguments.join(" ");

    Invocation::builder()
        .execution_successful(true)
        .arguments(arguments)
        .command_line(command_line)
        .build()
}

/// One SARIF result per mutation, with a rule per selected operator.
pub fn build_sarif(
    operators: &[Operator],
    mutations: &[MutationDetails],
    invocation: Invocation,
) -> Sarif {
    let rules = operators
        .iter()
        .map(|operator| {
            ReportingDescriptor::builder()
                .id(operator.name())
                .name(operator.id())
                .short_description(
                    MultiformatMessageString::builder()
                        .text(operator.description())
                        .build(),
                )
                .build()
        })
        .collect::<Vec<_>>();
    let driver = ToolComponent::builder()
        .name("jmutate")
        .version(env!("CARGO_PKG_VERSION"))
        .rules(rules)
        .build();
    let tool = Tool {
        driver,
        extensions: None,
        properties: None,
    };
    let results = mutations.iter().map(mutation_result).collect::<Vec<_>>();
    let run = Run::builder()
        .tool(tool)
        .invocations(vec![invocation])
        .results(results)
        .build();

    Sarif::builder()
        .schema(SCHEMA_URL)
        .runs(vec![run])
        .version(json!("2.1.0"))
        .build()
}

fn mutation_result(details: &MutationDetails) -> SarifResult {
    let location = &details.id.location;
    let logical = method_logical_location(
        &location.class_name,
        &location.method_name,
        &location.method_descriptor,
    );
    let builder = Location::builder().logical_locations(vec![logical]);
    let location = match source_location(details) {
        Some(physical) => builder.physical_location(physical).build(),
        None => builder.build(),
    };

    SarifResult::builder()
        .rule_id(details.mutator.as_str())
        .message(Message::builder().text(details.description.as_str()).build())
        .locations(vec![location])
        .build()
}

fn method_logical_location(class_name: &str, method_name: &str, descriptor: &str) -> LogicalLocation {
    LogicalLocation::builder()
        .name(format!("{}.{method_name}{descriptor}", class_name.replace('/', ".")))
        .kind("function")
        .build()
}

/// Source file resolved against the class's package, plus the line if known.
fn source_location(details: &MutationDetails) -> Option<PhysicalLocation> {
    let filename = details.filename.as_deref()?;
    let uri = match details.class_name().rsplit_once('/') {
        Some((package, _)) => format!("{package}/{filename}"),
        None => filename.to_string(),
    };
    let artifact = ArtifactLocation::builder().uri(uri).build();
    let physical = PhysicalLocation::builder().artifact_location(artifact);
    Some(match details.line {
        Some(line) => physical
            .region(Region::builder().start_line(i64::from(line)).build())
            .build(),
        None => physical.build(),
    })
}
