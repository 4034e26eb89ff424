//! CLI binary for edgequake-ocrprep.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PrepConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_ocrprep::pipeline::BUILTIN_PIPELINES;
use edgequake_ocrprep::{
    apply_transform, draw_bounding_boxes, preprocess, preprocess_batch, recognize, source,
    DenoiseMode, MorphologyOrder, PipelineDefinition, PipelineProgressCallback, PrepConfig,
    ProgressCallback, RecognizeOptions, StageParams, ThresholdMode, Transform,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar counting stages across every source,
/// plus a log line per finished stage. Sources of a batch run concurrently,
/// so stage timings are keyed by `(source, stage_num)`.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<(String, usize), Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} stages  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_prefix("Preprocessing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed(&self, source: &str, stage_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(&(source.to_string(), stage_num)))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
        let errors = self.errors.load(Ordering::SeqCst);
        if errors > 0 {
            eprintln!("{} {} stage(s) failed", red("✘"), bold(&errors.to_string()));
        }
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_pipeline_start(&self, _source: &str, total_stages: usize) {
        self.bar.inc_length(total_stages as u64);
    }

    fn on_stage_start(&self, source: &str, stage_num: usize, _total: usize, stage: &str) {
        if let Ok(mut t) = self.start_times.lock() {
            t.insert((source.to_string(), stage_num), Instant::now());
        }
        self.bar.set_message(format!("{source}: {stage}"));
    }

    fn on_stage_complete(&self, source: &str, stage_num: usize, total: usize, path: &Path) {
        let secs = self.elapsed(source, stage_num);
        self.bar.println(format!(
            "  {} {:<24} {:>2}/{:<2}  {}  {}",
            green("✓"),
            source,
            stage_num,
            total,
            path.display(),
            dim(&format!("{secs:.2}s")),
        ));
        self.bar.inc(1);
    }

    fn on_stage_error(&self, source: &str, stage_num: usize, total: usize, error: &str) {
        let secs = self.elapsed(source, stage_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:<24} {:>2}/{:<2}  {}  {}",
            red("✗"),
            source,
            stage_num,
            total,
            red(&msg),
            dim(&format!("{secs:.2}s")),
        ));
        // Stages after a failure never run; drop them from the bar.
        self.bar
            .set_length(self.bar.length().unwrap_or(0).saturating_sub((total - stage_num) as u64));
    }

    fn on_pipeline_complete(&self, source: &str, total_stages: usize, completed: usize) {
        if completed == total_stages {
            self.bar.println(format!("{} {}", cyan("◆"), bold(source)));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Canonical OCR preprocessing (grayscale → threshold → denoise → deskew → invert)
  ocrprep --root ./images run receipt.png

  # One transform, with a mode
  ocrprep --root ./images apply threshold:adaptive receipt.png

  # Custom stage list over several images
  ocrprep --root ./images run --stages grayscale,equalize,threshold a.png b.png

  # Preprocess then recognise, JSON output
  ocrprep --root ./images --json ocr poster.jpg

  # Draw word boxes over the original
  ocrprep --root ./images boxes poster.jpg

  # HTTP surface on port 8000
  ocrprep --root ./images serve --addr 0.0.0.0:8000

ARTIFACTS:
  Every stage writes <root>/<stage dir>/<prefix>_<input name>:
    grayscale/gray_*  thresholding/thresh_*  no_noise/no_noise_*  deskew/deskewed_*
    inverted/inverted_*  morphology/morph_*  edge_detection/edges_*
    contours/contours_*  equalized/equalized_*  processed/autocontrast_*
    preprocessed/upscaled_*  bounding/bounding_boxes_*

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (default OCR engine)
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  OCRPREP_IMAGE_ROOT      Image root directory (default /images)
  RUST_LOG                Overrides --verbose / --quiet log filtering
"#;

/// Preprocess images for OCR and recognise them with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "ocrprep",
    version,
    about = "Preprocess images for OCR and recognise them with Vision LLMs",
    long_about = "Run classical image preprocessing pipelines (grayscale, threshold, denoise, \
deskew, invert, ...) over images under a root directory, keeping every intermediate artifact, \
then optionally recognise the text with a Vision LLM and clean it up.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Image root; sources and artifacts live under it.
    #[arg(long, global = true, env = "OCRPREP_IMAGE_ROOT", default_value = "/images")]
    root: PathBuf,

    /// Subfolder of the root holding the source images.
    #[arg(long, global = true, env = "OCRPREP_SUBFOLDER")]
    subfolder: Option<String>,

    /// Threshold mode for threshold stages: global, adaptive.
    #[arg(long = "threshold", global = true, env = "OCRPREP_THRESHOLD")]
    threshold: Option<String>,

    /// Denoise mode for denoise stages: median, gaussian.
    #[arg(long = "denoise", global = true, env = "OCRPREP_DENOISE")]
    denoise: Option<String>,

    /// Morphology order: close (1), open (2).
    #[arg(long = "morphology", global = true, env = "OCRPREP_MORPHOLOGY")]
    morphology: Option<String>,

    /// Number of sources processed concurrently.
    #[arg(short, long, global = true, env = "OCRPREP_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// OCR language hint, e.g. eng or eng+deu.
    #[arg(long, global = true, env = "OCRPREP_LANGUAGE", default_value = "eng")]
    language: String,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file containing a custom OCR system prompt.
    #[arg(long, global = true, env = "OCRPREP_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per image.
    #[arg(long, global = true, env = "OCRPREP_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "OCRPREP_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Retries per image on LLM failure (off unless set).
    #[arg(long, global = true, env = "OCRPREP_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Output structured JSON instead of a summary.
    #[arg(long, global = true, env = "OCRPREP_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "OCRPREP_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OCRPREP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OCRPREP_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply one transform, written as name[:mode] (e.g. threshold:adaptive).
    Apply {
        transform: Transform,
        image: String,
    },
    /// Run a pipeline over one or more images.
    Run {
        /// Built-in pipeline name.
        #[arg(long, default_value = "preprocess-for-ocr", conflicts_with = "stages")]
        pipeline: String,
        /// Comma-separated stage descriptors instead of a built-in pipeline.
        #[arg(long)]
        stages: Option<String>,
        #[arg(required = true)]
        images: Vec<String>,
    },
    /// Preprocess (unless --pipeline none) and recognise one image.
    Ocr {
        #[arg(long, default_value = "preprocess-for-ocr")]
        pipeline: String,
        image: String,
    },
    /// Draw the recognised word boxes over one image.
    #[command(alias = "bounding-boxes")]
    Boxes { image: String },
    /// List built-in pipelines and transforms.
    Pipelines,
    /// Serve the HTTP surface.
    #[cfg(feature = "server")]
    Serve {
        #[arg(long, env = "OCRPREP_ADDR", default_value = "127.0.0.1:8000")]
        addr: std::net::SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let g = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let uses_bar = matches!(cli.command, Command::Run { .. } | Command::Ocr { .. });
    let show_progress = uses_bar && !g.quiet && !g.no_progress && !g.json;
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        g,
        progress.clone().map(|cb| cb as Arc<dyn PipelineProgressCallback>),
    )
    .await?;
    let params = stage_params(g)?;

    let outcome = dispatch(&cli.command, g, &config, &params).await;
    if let Some(cb) = progress {
        cb.finish();
    }
    outcome
}

async fn dispatch(
    command: &Command,
    g: &GlobalArgs,
    config: &PrepConfig,
    params: &StageParams,
) -> Result<()> {
    match command {
        Command::Apply { transform, image } => {
            let src = source(image, g.subfolder.as_deref(), config)
                .with_context(|| format!("Invalid image name {image:?}"))?;
            let artifact = apply_transform(transform.with_params(params), &src, config)
                .await
                .with_context(|| format!("{transform} failed on {image}"))?;
            emit(g, &artifact, || {
                println!("{}", artifact.path.display());
            })
        }

        Command::Run {
            pipeline,
            stages,
            images,
        } => {
            let definition = match stages {
                Some(list) => PipelineDefinition::parse("custom", list),
                None => PipelineDefinition::builtin(pipeline),
            }
            .context("Invalid pipeline")?;

            if let [image] = images.as_slice() {
                let src = source(image, g.subfolder.as_deref(), config)
                    .with_context(|| format!("Invalid image name {image:?}"))?;
                let run = preprocess(&definition, &src, params, config)
                    .await
                    .with_context(|| format!("Pipeline '{}' failed on {image}", definition.name))?;
                return emit(g, &run, || {
                    println!("{}", run.final_path.display());
                    if !g.quiet {
                        eprintln!(
                            "{}  {} stages  {}ms",
                            green("✔"),
                            run.stages.len(),
                            run.duration_ms
                        );
                    }
                });
            }

            let sources = images
                .iter()
                .map(|image| source(image, g.subfolder.as_deref(), config))
                .collect::<Result<Vec<_>, _>>()
                .context("Invalid image name")?;
            let batch = preprocess_batch(&sources, &definition, params, config).await;
            emit(g, &batch, || {
                for item in &batch.items {
                    match (&item.run, &item.error) {
                        (Some(run), _) => println!("{}", run.final_path.display()),
                        (None, Some(err)) => eprintln!("{} {}", red("✗"), err),
                        (None, None) => {}
                    }
                }
                if !g.quiet {
                    eprintln!(
                        "{} {}/{} images  {}ms",
                        if batch.stats.failed == 0 {
                            green("✔")
                        } else {
                            cyan("⚠")
                        },
                        bold(&batch.stats.succeeded.to_string()),
                        batch.stats.total_sources,
                        batch.stats.total_duration_ms,
                    );
                }
            })?;
            if batch.stats.succeeded == 0 {
                anyhow::bail!("All {} images failed", batch.stats.total_sources);
            }
            Ok(())
        }

        Command::Ocr { pipeline, image } => {
            let src = source(image, g.subfolder.as_deref(), config)
                .with_context(|| format!("Invalid image name {image:?}"))?;
            let options = RecognizeOptions {
                pipeline: match pipeline.as_str() {
                    "none" => None,
                    text => Some(PipelineDefinition::resolve(text).context("Invalid pipeline")?),
                },
                params: *params,
            };
            let out = recognize(&src, &options, config)
                .await
                .with_context(|| format!("OCR failed on {image}"))?;
            emit(g, &out, || {
                println!("{}", out.record.cleaned_text);
                if !g.quiet {
                    for (category, keyword) in &out.record.categories {
                        eprintln!("  {} {category}: {keyword}", cyan("◆"));
                    }
                    eprintln!(
                        "   {} tokens in  /  {} tokens out  via {}  {}ms",
                        dim(&out.input_tokens.to_string()),
                        dim(&out.output_tokens.to_string()),
                        out.engine,
                        out.duration_ms,
                    );
                }
            })
        }

        Command::Boxes { image } => {
            let src = source(image, g.subfolder.as_deref(), config)
                .with_context(|| format!("Invalid image name {image:?}"))?;
            let out = draw_bounding_boxes(&src, config)
                .await
                .with_context(|| format!("Bounding boxes failed on {image}"))?;
            emit(g, &out, || {
                println!("{}", out.path.display());
                if !g.quiet {
                    eprintln!("   {}/{} boxes drawn", out.drawn, out.boxes.len());
                }
            })
        }

        Command::Pipelines => {
            let definitions = BUILTIN_PIPELINES
                .iter()
                .map(|name| PipelineDefinition::builtin(name))
                .collect::<Result<Vec<_>, _>>()?;
            emit(g, &definitions, || {
                for def in &definitions {
                    println!("{def}");
                }
                println!();
                for t in Transform::ALL {
                    let dir = t.stage_dir();
                    println!("{:<16} {}/{}_*", t.name(), dir.directory, dir.prefix);
                }
            })
        }

        #[cfg(feature = "server")]
        Command::Serve { addr } => edgequake_ocrprep::server::serve(*addr, config.clone())
            .await
            .context("Server failed"),
    }
}

/// Print `value` as JSON with `--json`, otherwise run `human`.
fn emit<T: Serialize>(g: &GlobalArgs, value: &T, human: impl FnOnce()) -> Result<()> {
    if g.json {
        let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        human();
    }
    Ok(())
}

/// Map CLI args to `PrepConfig`.
async fn build_config(g: &GlobalArgs, progress: Option<ProgressCallback>) -> Result<PrepConfig> {
    let mut builder = PrepConfig::builder()
        .image_root(&g.root)
        .language(&g.language)
        .concurrency(g.concurrency)
        .max_tokens(g.max_tokens)
        .temperature(g.temperature)
        .max_retries(g.max_retries);

    if let Some(ref path) = g.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = g.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = g.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse the mode flags into per-stage overrides.
fn stage_params(g: &GlobalArgs) -> Result<StageParams> {
    Ok(StageParams {
        threshold: g
            .threshold
            .as_deref()
            .map(str::parse::<ThresholdMode>)
            .transpose()?,
        denoise: g
            .denoise
            .as_deref()
            .map(str::parse::<DenoiseMode>)
            .transpose()?,
        morphology: g
            .morphology
            .as_deref()
            .map(str::parse::<MorphologyOrder>)
            .transpose()?,
    })
}
