use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use pantun_sense::labeler::Labeler;
use pantun_sense::schema::{parse_request, EvaluateRequest};
use pantun_sense::{Config, Evaluator, VerdictResponse};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pantun-sense",
    about = "Check a pantun against traditional structure",
    version
)]
struct Cli {
    /// File paths to evaluate (reads stdin if none provided)
    files: Vec<String>,

    /// Treat each input as a JSON body: {"pantun": "..."}
    #[arg(long)]
    request: bool,

    /// Print the full verdict, including per-line metrics
    #[arg(long, conflicts_with = "label")]
    detailed: bool,

    /// Print strict dataset labels instead of verdicts
    #[arg(long)]
    label: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Config file (defaults to ./pantun.toml or ~/.config/pantun-sense/pantun.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::load()?,
    };
    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let evaluator = config.build_evaluator();

    let mut inputs: Vec<(String, String)> = Vec::new();
    if cli.files.is_empty() {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("reading stdin")?;
        inputs.push(("<stdin>".to_string(), input));
    } else {
        for path in &cli.files {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            inputs.push((path.clone(), text));
        }
    }

    let mut requests = Vec::with_capacity(inputs.len());
    for (source, body) in inputs {
        let request = if cli.request {
            parse_request(&body).with_context(|| format!("parsing request from {source}"))?
        } else {
            EvaluateRequest { pantun: body }
        };
        requests.push(request);
    }

    if cli.label {
        let mut labeler = Labeler::new(evaluator.vocabulary());
        for request in &requests {
            labeler.add(&request.pantun);
        }
        println!("{}", serde_json::to_string_pretty(labeler.records())?);
        return Ok(());
    }

    for request in &requests {
        print_verdict(&evaluator, request, cli.detailed)?;
    }
    Ok(())
}

fn print_verdict(
    evaluator: &Evaluator,
    request: &EvaluateRequest,
    detailed: bool,
) -> anyhow::Result<()> {
    let verdict = evaluator.evaluate(&request.pantun);
    let json = if detailed {
        serde_json::to_string_pretty(&verdict)?
    } else {
        serde_json::to_string_pretty(&VerdictResponse::from(&verdict))?
    };
    println!("{json}");
    Ok(())
}
