//! Binary entry point for the Atlas query CLI.
#![forbid(unsafe_code)]

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use atlas::config::AtlasConfig;
use atlas::logging::init_logging;
use atlas::query::{Intent, Plan, RequestDescriptor, SchemaProvider};
use atlas::service::{AtlasService, QueryResponse};
use atlas::storage::Source;
use atlas::AtlasError;

#[derive(Parser, Debug)]
#[command(
    name = "atlas",
    version,
    about = "Plan and run structured questions over operational CSV datasets",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "Configuration file (TOML or legacy JSON)")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "Base directory for relative source paths"
    )]
    data_dir: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "RUST_LOG",
        help = "Log filter directive (defaults to the configured level)"
    )]
    log_level: Option<String>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "List configured sources and their resolved paths")]
    Sources,

    #[command(about = "Print the canonical columns of a source")]
    Schema {
        #[arg(value_name = "SOURCE")]
        source: String,
    },

    #[command(about = "Build and print the plan for a question")]
    Plan(QuestionArgs),

    #[command(about = "Plan and execute a question")]
    Run(QuestionArgs),
}

#[derive(Args, Debug)]
struct QuestionArgs {
    #[arg(long, short, help = "Natural-language question")]
    question: String,

    #[arg(long, value_name = "FILE", help = "Request descriptor JSON")]
    request: Option<PathBuf>,

    #[arg(long, help = "Intent override (TRANSACTIONAL, OPERATIONAL, ...)")]
    intent: Option<String>,

    #[arg(long, help = "Source override")]
    source: Option<String>,

    #[arg(long, short, help = "Row cap when the question names none")]
    k: Option<usize>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct SourceEntry {
    source: Source,
    path: PathBuf,
    exists: bool,
}

#[derive(Serialize)]
struct SchemaReport {
    source: Source,
    columns: Vec<String>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32, Box<dyn Error>> {
    let cli = Cli::parse();
    let mut config = AtlasConfig::load(cli.config.clone())?;
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir);
    }
    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    init_logging(&level)?;

    match &cli.command {
        Command::Sources => {
            let entries: Vec<SourceEntry> = config
                .source_paths()
                .into_iter()
                .map(|(source, path)| SourceEntry {
                    source,
                    exists: path.is_file(),
                    path,
                })
                .collect();
            emit(cli.format, &entries, || print_sources_text(&entries))?;
        }
        Command::Schema { source } => {
            let source: Source = source.parse()?;
            let service = AtlasService::from_config(&config)?;
            let columns = service.registry().columns(source).ok_or_else(|| {
                AtlasError::InvalidArgument(format!("source '{source}' is not available"))
            })?;
            let report = SchemaReport { source, columns };
            emit(cli.format, &report, || {
                for column in &report.columns {
                    println!("{column}");
                }
            })?;
        }
        Command::Plan(args) => {
            let request = load_request(args)?;
            let service = AtlasService::from_config(&config)?;
            let plan = service.plan(&args.question, &request);
            emit(cli.format, &plan, || print_plan_text(&plan))?;
        }
        Command::Run(args) => {
            let request = load_request(args)?;
            let service = AtlasService::from_config(&config)?;
            let response = service.answer(&args.question, &request);
            emit(cli.format, &response, || print_response_text(&response))?;
            if response.meta.failure().is_some() {
                return Ok(2);
            }
        }
    }
    Ok(0)
}

fn load_request(args: &QuestionArgs) -> Result<RequestDescriptor, Box<dyn Error>> {
    let mut request = match &args.request {
        Some(path) => serde_json::from_str::<RequestDescriptor>(&fs::read_to_string(path)?)?,
        None => RequestDescriptor::default(),
    };
    if let Some(intent) = &args.intent {
        request.intent = Intent::from(intent.clone());
    }
    if let Some(source) = &args.source {
        request.source = Some(source.clone());
    }
    if args.k.is_some() {
        request.k = args.k;
    }
    Ok(request)
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_sources_text(entries: &[SourceEntry]) {
    for entry in entries {
        let marker = if entry.exists { "" } else { " (missing)" };
        println!("{:<16} {}{marker}", entry.source, entry.path.display());
    }
}

fn print_plan_text(plan: &Plan) {
    print!("{}", plan.explain());
}

fn print_response_text(response: &QueryResponse) {
    print_plan_text(&response.plan);
    println!();
    if !response.columns.is_empty() {
        println!("{}", response.columns.join("\t"));
        for row in &response.rows {
            let cells: Vec<String> = response
                .columns
                .iter()
                .map(|column| row.get(column).map(ToString::to_string).unwrap_or_default())
                .collect();
            println!("{}", cells.join("\t"));
        }
        println!();
    }
    let meta = &response.meta;
    println!(
        "request={} rows={} clipped={} elapsed_ms={:.2} plan_hash={}",
        response.request_id,
        response.rows.len(),
        meta.clipped,
        meta.elapsed_ms,
        meta.plan_hash
    );
    if let Some(warning) = &meta.warning {
        println!("warning: {warning}");
    }
    for entry in &meta.lineage {
        match &entry.error {
            Some(error) => println!("  step {} {} failed: {error}", entry.step, entry.op),
            None => println!(
                "  step {} {} rows={} elapsed_ms={:.2}{}",
                entry.step,
                entry.op,
                entry.rows_after_step,
                entry.elapsed_ms,
                if entry.truncated { " (truncated)" } else { "" }
            ),
        }
    }
}
