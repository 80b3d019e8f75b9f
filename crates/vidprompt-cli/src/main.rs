mod logging;
mod server;

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::debug;
use vidprompt_contracts::history::DEFAULT_HISTORY_LIMIT;
use vidprompt_contracts::prompts::{DurationMode, MAX_PROMPTS};
use vidprompt_contracts::sections::split_sections;
use vidprompt_engine::{
    normalize_image, AppConfig, HistoryRecorder, PromptEngine, ReqwestTransport, SlotBoard,
};

#[derive(Debug, Parser)]
#[command(name = "vidprompt", version, about = "Image-to-video prompt generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the generation and history endpoints.
    Serve(ServeArgs),
    /// Generate prompts for local images and descriptions.
    Generate(GenerateArgs),
    /// Split a generated reply into labeled sections.
    Sections(SectionsArgs),
    /// Show recent history entries, newest first.
    History(HistoryArgs),
    /// Normalize one image the way uploads are normalized.
    Normalize(NormalizeArgs),
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long)]
    listen: Option<String>,
    #[arg(long)]
    history: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    /// Image for the next slot; repeat for more slots.
    #[arg(long = "image")]
    images: Vec<PathBuf>,
    /// Description for the next slot; repeat for more slots.
    #[arg(long = "description")]
    descriptions: Vec<String>,
    /// Number of active slots; defaults to the number of filled slots.
    #[arg(long)]
    count: Option<usize>,
    #[arg(long, default_value_t = 10)]
    duration: u32,
    #[arg(long)]
    history: Option<PathBuf>,
    /// Print sections as JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct SectionsArgs {
    /// Reply text file; stdin when omitted.
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    limit: usize,
    #[arg(long)]
    history: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct NormalizeArgs {
    input: PathBuf,
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("vidprompt error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    // .env may carry RUST_LOG, so it loads first and is reported once logging is up.
    let env_file = dotenv::dotenv();
    logging::configure_logging()?;
    debug!("{}", env_file_outcome(&env_file));
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => block_on(run_serve(args)),
        Command::Generate(args) => block_on(run_generate(args)),
        Command::Sections(args) => run_sections(args),
        Command::History(args) => run_history(args),
        Command::Normalize(args) => run_normalize(args),
    }
}

fn env_file_outcome(loaded: &dotenv::Result<PathBuf>) -> String {
    match loaded {
        Ok(path) => format!("loaded environment from {}", path.display()),
        Err(_) => "no .env file loaded".to_string(),
    }
}

fn block_on<F>(future: F) -> Result<i32>
where
    F: std::future::Future<Output = Result<i32>>,
{
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?
        .block_on(future)
}

fn load_config(history: Option<PathBuf>) -> Result<AppConfig> {
    let mut config = AppConfig::from_env()?;
    if history.is_some() {
        config.history_path = history;
    }
    Ok(config)
}

async fn run_serve(args: ServeArgs) -> Result<i32> {
    let mut config = load_config(args.history)?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    let engine = PromptEngine::from_config(&config, Arc::new(ReqwestTransport::new()));
    server::serve(Arc::new(engine), &config.listen).await?;
    Ok(0)
}

async fn run_generate(args: GenerateArgs) -> Result<i32> {
    let duration = DurationMode::try_from(args.duration).map_err(anyhow::Error::msg)?;
    let filled = args.images.len().max(args.descriptions.len());
    if filled == 0 {
        bail!("provide at least one --image or --description");
    }
    if filled > MAX_PROMPTS {
        bail!("at most {MAX_PROMPTS} slots are available (got {filled})");
    }

    let mut board = SlotBoard::new();
    for (index, description) in args.descriptions.iter().enumerate() {
        board.set_description(index, description.as_str())?;
    }
    for (index, path) in args.images.iter().enumerate() {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let normalized = board
            .set_image(index, &bytes, Some(guess_image_mime(path)))
            .with_context(|| format!("failed to prepare {}", path.display()))?;
        debug!(
            path = %path.display(),
            width = normalized.width,
            height = normalized.height,
            bytes = normalized.byte_len,
            "image ready"
        );
    }

    let body = board.build_body(args.count.unwrap_or(filled), duration)?;
    let config = load_config(args.history)?;
    let engine = PromptEngine::from_config(&config, Arc::new(ReqwestTransport::new()));
    let generation = engine.generate(body).await?;
    let persisted = engine.record_in_background(&generation);

    let sections = generation.sections();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&sections)?);
    } else {
        for section in &sections {
            println!("== {} ==", section.title);
            if let Some(highlight) = section.highlight.as_deref() {
                println!("[master prompt] {highlight}");
            }
            println!("{}\n", section.content);
        }
    }

    // Output is already printed; only keep the process alive for the append.
    if let Err(err) = persisted.await {
        debug!(error = %err, "history task did not complete");
    }
    Ok(0)
}

fn run_sections(args: SectionsArgs) -> Result<i32> {
    let text = match args.file {
        Some(path) => fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            buffer
        }
    };
    println!("{}", serde_json::to_string_pretty(&split_sections(&text))?);
    Ok(0)
}

fn run_history(args: HistoryArgs) -> Result<i32> {
    let config = load_config(args.history)?;
    let recorder = HistoryRecorder::from_path(config.history_path);
    if !recorder.is_enabled() {
        eprintln!("history is disabled; set VIDPROMPT_HISTORY_PATH or pass --history");
    }
    let entries = recorder.recent(args.limit);
    println!("{}", serde_json::to_string_pretty(&json!({ "history": entries }))?);
    Ok(0)
}

fn run_normalize(args: NormalizeArgs) -> Result<i32> {
    let bytes = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let normalized = normalize_image(&bytes, Some(guess_image_mime(&args.input)))?;
    if let Some(out) = args.out.as_ref() {
        let decoded = normalized
            .image
            .decode()
            .context("normalized image is not valid base64")?;
        fs::write(out, decoded).with_context(|| format!("failed to write {}", out.display()))?;
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "mimeType": normalized.image.mime_type,
            "width": normalized.width,
            "height": normalized.height,
            "quality": normalized.quality,
            "bytes": normalized.byte_len,
        }))?
    );
    Ok(0)
}

fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "png" => "image/png",
        "heic" => "image/heic",
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        _ => "image/png",
    }
}
