use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

use jmutate::report::{build_invocation, build_sarif, MutationReport};
use jmutate::source::list_classes;
use jmutate::{
    ClassFilter, ClasspathSource, EngineSettings, MutationConfig, MutationIdentifier, Mutater,
};

/// CLI arguments for jmutate execution.
#[derive(Parser, Debug)]
#[command(
    name = "jmutate",
    about = "Bytecode mutation engine for JVM class and JAR files.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Show debug output; repeat for trace output.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every mutation found in the input.
    List(ListArgs),
    /// Write the class with one mutation applied.
    Apply(ApplyArgs),
}

#[derive(clap::Args, Debug)]
struct ListArgs {
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    #[arg(long, value_name = "PATH")]
    classpath: Vec<PathBuf>,
    /// Operators or groups, overriding the config file.
    #[arg(long, value_delimiter = ',')]
    mutators: Vec<String>,
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Regexes over dotted class names; every class when omitted.
    #[arg(long, value_name = "REGEX")]
    target_classes: Vec<String>,
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long)]
    timing: bool,
}

#[derive(clap::Args, Debug)]
struct ApplyArgs {
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    #[arg(long, value_name = "PATH")]
    classpath: Vec<PathBuf>,
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// JSON mutation identifier, or `-` for stdin.
    #[arg(long, value_name = "PATH")]
    id: PathBuf,
    #[arg(long, value_name = "PATH")]
    output: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Sarif,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_trace(cli.verbose, cli.quiet);
    match cli.command {
        Command::List(args) => list(args, cli.quiet),
        Command::Apply(args) => apply(args),
    }
}

fn setup_trace(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::DEBUG,
        _ => Level::TRACE,
    };
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(LevelFilter::from_level(level));
    tracing_subscriber::registry().with(console_layer).init();
}

fn check_inputs(input: &Path, classpath: &[PathBuf]) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("input not found: {}", input.display());
    }
    for entry in classpath {
        if !entry.exists() {
            anyhow::bail!("classpath entry not found: {}", entry.display());
        }
    }
    Ok(())
}

fn load_settings(config: Option<&Path>, mutators: &[String]) -> Result<EngineSettings> {
    let mut config = match config {
        Some(path) => MutationConfig::read_file(path)?,
        None => MutationConfig::default(),
    };
    if !mutators.is_empty() {
        config.mutators = mutators.to_vec();
    }
    Ok(config.resolve()?)
}

fn list(args: ListArgs, quiet: bool) -> Result<()> {
    check_inputs(&args.input, &args.classpath)?;
    let settings = load_settings(args.config.as_deref(), &args.mutators)?;
    let filter = ClassFilter::new(&args.target_classes, &[])?;

    let started_at = Instant::now();
    let source = ClasspathSource::open(&args.input, &args.classpath)?;
    let mutater = Mutater::new(source, settings);
    let mut report = MutationReport::default();
    for class in list_classes(&args.input)? {
        if !filter.matches(&class) {
            continue;
        }
        report.classes += 1;
        let mutations = mutater
            .find_mutations(&class)
            .with_context(|| format!("failed to scan {class}"))?;
        report.mutations.extend(mutations);
    }
    info!(
        classes = report.classes,
        mutations = report.mutations.len(),
        "scan finished"
    );

    let mut writer = output_writer(args.output.as_deref())?;
    match args.format {
        Format::Json => serde_json::to_writer_pretty(&mut writer, &report)
            .context("failed to serialize JSON output")?,
        Format::Sarif => {
            let sarif = build_sarif(
                mutater.settings().operators(),
                &report.mutations,
                build_invocation(),
            );
            serde_json::to_writer_pretty(&mut writer, &sarif)
                .context("failed to serialize SARIF output")?
        }
    }
    writer.write_all(b"\n").context("failed to write output")?;

    if args.timing && !quiet {
        eprintln!(
            "timing: total_ms={} classes={} mutations={}",
            started_at.elapsed().as_millis(),
            report.classes,
            report.mutations.len()
        );
    }
    Ok(())
}

fn apply(args: ApplyArgs) -> Result<()> {
    check_inputs(&args.input, &args.classpath)?;
    let settings = load_settings(args.config.as_deref(), &[])?;
    let id = read_identifier(&args.id)?;

    let source = ClasspathSource::open(&args.input, &args.classpath)?;
    let mutater = Mutater::new(source, settings);
    let mutant = mutater
        .get_mutation(&id)
        .with_context(|| format!("failed to apply {id}"))?;
    fs::write(&args.output, &mutant.bytes)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!(id = %id, output = %args.output.display(), "wrote mutant");
    Ok(())
}

fn read_identifier(path: &Path) -> Result<MutationIdentifier> {
    let text = if path == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("failed to read identifier from stdin")?;
        text
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    };
    serde_json::from_str(&text).context("failed to parse mutation identifier")
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_arguments_parse() {
        let cli = Cli::try_parse_from([
            "jmutate",
            "list",
            "--input",
            "app.jar",
            "--mutators",
            "MATH,INLINE_CONSTS",
            "--format",
            "sarif",
            "-vv",
        ])
        .expect("parse");

        assert_eq!(cli.verbose, 2);
        let Command::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.mutators, vec!["MATH", "INLINE_CONSTS"]);
        assert_eq!(args.format, Format::Sarif);
        assert_eq!(args.input, PathBuf::from("app.jar"));
    }

    #[test]
    fn apply_requires_an_identifier() {
        assert!(Cli::try_parse_from(["jmutate", "apply", "--input", "a", "--output", "b"]).is_err());
    }

    #[test]
    fn command_line_mutators_override_config() {
        let settings = load_settings(None, &["REMOVE_CONDITIONALS".to_string()]).expect("settings");

        assert_eq!(settings.operators().len(), 4);
        assert!(load_settings(None, &["NOPE".to_string()]).is_err());
    }

    #[test]
    fn missing_input_is_reported() {
        let err = check_inputs(Path::new("does/not/exist.jar"), &[]).expect_err("missing");

        assert!(err.to_string().contains("input not found"));
    }

    #[test]
    fn identifier_is_read_from_json() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"location":{{"class_name":"com/example/Foo","method_name":"bar","method_descriptor":"(I)I"}},"indexes":[4],"operator":"jmutate.operators.MATH"}}"#
        )
        .expect("write");

        let id = read_identifier(file.path()).expect("identifier");

        assert_eq!(id.first_index(), 4);
        assert_eq!(id.class_name(), "com/example/Foo");
    }
}
