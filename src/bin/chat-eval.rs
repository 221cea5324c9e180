#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use chat_eval_harness::diagnostics::{DiagnosticSink, TracingSink};
use chat_eval_harness::gateway::GenerationParams;
use chat_eval_harness::language_model::OpenAiChatModel;
use chat_eval_harness::prompts::{preset_by_slug, PRESETS};
use chat_eval_harness::results::{load_json, JUDGEMENTS_FILE_NAME, OUTPUTS_FILE_NAME};
use chat_eval_harness::run::{
    build_llm_judge, run_generate, run_pairwise, GenerateRunConfig, NamedOutputs,
    PairwiseRunConfig, RetrySettings, RunMetadata,
};

/// sysexits(3) code for malformed user input.
const EX_DATAERR: i32 = 65;

#[derive(Parser)]
#[command(name = "chat-eval", version, about = "Chat model evaluation harness")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate model replies for every instance of a JSONL chat dataset
    Generate(GenerateArgs),
    /// Compare saved outputs of two or more models with an LLM judge
    Pairwise(PairwiseArgs),
    /// List built-in judge presets, or print one
    Presets {
        /// Preset to print
        name: Option<String>,
    },
}

#[derive(Args)]
struct GenerationArgs {
    #[arg(long)]
    max_new_tokens: Option<u32>,
    /// Stop sequence (repeatable)
    #[arg(long = "stop")]
    stop_sequences: Vec<String>,
    /// Raw request option as key=<json value> (repeatable)
    #[arg(long = "option", value_parser = parse_option)]
    options: Vec<(String, Value)>,
}

impl GenerationArgs {
    fn apply(self, params: &mut GenerationParams) {
        if let Some(max) = self.max_new_tokens {
            params.max_new_tokens = Some(max);
        }
        if !self.stop_sequences.is_empty() {
            params.stop_sequences = Some(self.stop_sequences);
        }
        params.options.extend(self.options);
    }
}

#[derive(Args)]
struct RetryArgs {
    /// Attempts per request, including the first
    #[arg(long)]
    max_num_trials: Option<u32>,
    /// Seconds to wait before the first retry
    #[arg(long)]
    first_wait_secs: Option<u64>,
}

impl RetryArgs {
    fn apply(self, retry: &mut RetrySettings) {
        if let Some(n) = self.max_num_trials {
            retry.max_num_trials = n;
        }
        if let Some(secs) = self.first_wait_secs {
            retry.first_wait_secs = secs;
        }
    }
}

#[derive(Args)]
struct GenerateArgs {
    /// JSONL chat dataset
    #[arg(long)]
    dataset: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    save_dir: Option<PathBuf>,
    /// Field holding the reference answers
    #[arg(long)]
    references_key: Option<String>,
    /// Half-open instance range, e.g. 0:100
    #[arg(long, value_parser = parse_range)]
    data_range: Option<(usize, usize)>,
    /// Answer multi-turn conversations one user turn at a time
    #[arg(long)]
    incremental: bool,
    #[command(flatten)]
    generation: GenerationArgs,
    #[command(flatten)]
    retry: RetryArgs,
    /// Start from a saved config.json; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overwrite a save dir that already holds a run
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct PairwiseArgs {
    /// Model outputs as name=path/to/outputs.jsonl (repeat for each model)
    #[arg(long = "lm-output", value_parser = parse_named_output)]
    lm_outputs: Vec<NamedOutputs>,
    /// Judge preset name or path to a Jinja2 template file
    #[arg(long)]
    judge: Option<String>,
    #[arg(long)]
    judge_model: Option<String>,
    /// Overrides the preset's system message; pass "" to send none
    #[arg(long)]
    system_message: Option<String>,
    #[arg(long)]
    save_dir: Option<PathBuf>,
    #[command(flatten)]
    generation: GenerationArgs,
    #[command(flatten)]
    retry: RetryArgs,
    /// Start from a saved config.json; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    force: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate(args) => {
            let force = args.force;
            let config = resolve_generate_config(args)?;
            let diagnostics: Arc<dyn DiagnosticSink> = Arc::new(TracingSink);
            let model = OpenAiChatModel::from_env(
                config.model.clone(),
                config.retry.to_dispatch_config(),
                diagnostics,
            )?;

            let records = run_generate(&config, &model, force).await?;
            println!(
                "wrote {} outputs to {}",
                records.len(),
                config.save_dir.join(OUTPUTS_FILE_NAME).display()
            );
        }
        Commands::Pairwise(args) => {
            let force = args.force;
            let config = resolve_pairwise_config(args)?;
            config.validate()?;
            let diagnostics: Arc<dyn DiagnosticSink> = Arc::new(TracingSink);
            let model = OpenAiChatModel::from_env(
                config.judge.model.clone(),
                config.retry.to_dispatch_config(),
                diagnostics.clone(),
            )?;
            let judge = build_llm_judge(&config.judge, Arc::new(model), diagnostics)?;

            let records = run_pairwise(&config, &judge, force).await?;
            println!(
                "wrote {} judgements to {}",
                records.len(),
                config.save_dir.join(JUDGEMENTS_FILE_NAME).display()
            );
        }
        Commands::Presets { name } => match name {
            None => {
                for preset in PRESETS {
                    println!("{}", preset.slug);
                }
            }
            Some(name) => match preset_by_slug(&name) {
                Some(preset) => {
                    if let Some(system) = preset.system {
                        println!("[system]\n{system}\n");
                    }
                    println!("[template]\n{}", preset.template);
                }
                None => {
                    let known: Vec<&str> = PRESETS.iter().map(|p| p.slug).collect();
                    eprintln!("unknown preset '{name}'; available: {}", known.join(", "));
                    std::process::exit(EX_DATAERR);
                }
            },
        },
    }

    Ok(())
}

fn resolve_generate_config(
    args: GenerateArgs,
) -> Result<GenerateRunConfig, Box<dyn std::error::Error>> {
    let mut config = match args.config {
        Some(path) => {
            let mut config: GenerateRunConfig = load_json(path)?;
            config.metadata = RunMetadata::new();
            if let Some(save_dir) = args.save_dir {
                config.save_dir = save_dir;
            }
            if let Some(dataset) = args.dataset {
                config.dataset = dataset;
            }
            config
        }
        None => {
            let dataset = args.dataset.ok_or("generate requires --dataset or --config")?;
            let save_dir = args
                .save_dir
                .ok_or("generate requires --save-dir or --config")?;
            GenerateRunConfig::new(dataset, save_dir)
        }
    };

    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(key) = args.references_key {
        config.references_key = key;
    }
    if args.data_range.is_some() {
        config.data_range = args.data_range;
    }
    if args.incremental {
        config.incremental = true;
    }
    args.generation.apply(&mut config.params);
    args.retry.apply(&mut config.retry);
    Ok(config)
}

fn resolve_pairwise_config(
    args: PairwiseArgs,
) -> Result<PairwiseRunConfig, Box<dyn std::error::Error>> {
    let mut config = match args.config {
        Some(path) => {
            let mut config: PairwiseRunConfig = load_json(path)?;
            config.metadata = RunMetadata::new();
            if let Some(save_dir) = args.save_dir {
                config.save_dir = save_dir;
            }
            if !args.lm_outputs.is_empty() {
                config.lm_outputs = args.lm_outputs;
            }
            config
        }
        None => {
            let save_dir = args
                .save_dir
                .ok_or("pairwise requires --save-dir or --config")?;
            PairwiseRunConfig::new(args.lm_outputs, save_dir)
        }
    };

    if let Some(judge) = args.judge {
        config.judge.template = judge;
    }
    if let Some(model) = args.judge_model {
        config.judge.model = model;
    }
    if args.system_message.is_some() {
        config.judge.system_message = args.system_message;
    }
    args.generation.apply(&mut config.judge.params);
    args.retry.apply(&mut config.retry);
    Ok(config)
}

fn parse_range(raw: &str) -> Result<(usize, usize), String> {
    let (start, end) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected start:end, got '{raw}'"))?;
    let start: usize = start
        .trim()
        .parse()
        .map_err(|e| format!("bad range start: {e}"))?;
    let end: usize = end
        .trim()
        .parse()
        .map_err(|e| format!("bad range end: {e}"))?;
    if start > end {
        return Err(format!("range start {start} is after end {end}"));
    }
    Ok((start, end))
}

/// `key=value` where value is JSON; bare words fall back to strings.
fn parse_option(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty option key in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn parse_named_output(raw: &str) -> Result<NamedOutputs, String> {
    let (name, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=path, got '{raw}'"))?;
    if name.is_empty() || path.is_empty() {
        return Err(format!("expected name=path, got '{raw}'"));
    }
    Ok(NamedOutputs {
        name: name.to_string(),
        path: PathBuf::from(path),
    })
}
