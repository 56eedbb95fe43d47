//! OpenMic CLI - AI stand-up comedy writers' room
//!
//! Runs a team of AI agents that write a stand-up set, and renders scripts
//! to speech with comedic timing.

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use openmic_core::speech::tts::output_filename;
use openmic_core::speech::{KokoroBackend, SpeechOutput, SpeechPipeline, write_wav};
use openmic_core::style::available_styles;
use openmic_core::{
    ComedyBrief, ComedyEvent, ComedyOrchestrator, ComedyStyle, Config, ModelHandle, OpenAiModel,
    Progress, SessionConfig,
};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "openmic",
    version,
    about = "AI stand-up comedy writers' room",
    long_about = "Runs a team of AI agents over an OpenAI-compatible API to write a stand-up set, \
                  and performs scripts with local text-to-speech."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to a TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Write a stand-up set about a topic
    Write(WriteArgs),
    /// Perform an existing script
    Speak(SpeakArgs),
}

#[derive(Args)]
struct WriteArgs {
    /// The topic of the set
    #[arg(value_name = "TOPIC")]
    topic: String,

    /// Comedy style: observational, self-deprecating or roast
    #[arg(short, long, default_value = "observational", value_name = "STYLE")]
    style: String,

    /// Target length in minutes
    #[arg(short, long, default_value = "3", value_name = "MINUTES")]
    duration: u32,

    /// Who the set is for
    #[arg(short, long, default_value = "young adults", value_name = "AUDIENCE")]
    audience: String,

    /// Model for every agent (overrides config and DEFAULT_MODEL)
    #[arg(short, long, value_name = "MODEL")]
    model: Option<String>,

    /// Maximum number of agent turns
    #[arg(long, value_name = "TURNS")]
    max_turns: Option<usize>,

    /// Save the full result as JSON
    #[arg(long, value_name = "FILE")]
    save: Option<PathBuf>,

    /// Perform the final script after writing it
    #[arg(long)]
    speak: bool,

    /// WAV output path when speaking
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Kokoro voice ID
    #[arg(long, value_name = "VOICE")]
    voice: Option<String>,
}

#[derive(Args)]
struct SpeakArgs {
    /// Script file to perform
    #[arg(value_name = "SCRIPT_FILE")]
    script: PathBuf,

    /// WAV output path
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Kokoro voice ID
    #[arg(long, value_name = "VOICE")]
    voice: Option<String>,

    /// Emotion profile: flat, roast, excited or deadpan
    #[arg(short, long, value_name = "PROFILE")]
    profile: Option<String>,

    /// Skip all language model passes
    #[arg(long)]
    no_llm: bool,

    /// Do not insert filler words
    #[arg(long)]
    no_fillers: bool,

    /// Seed for filler placement
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    apply_env_overrides(&mut config);
    tracing::debug!(
        model = %config.llm.model,
        api_base = %config.llm.api_base,
        "configuration loaded"
    );

    let api_key = env::var("OPENAI_API_KEY")
        .or_else(|_| env::var("DEEPSEEK_API_KEY"))
        .ok()
        .filter(|key| !key.is_empty());

    match cli.command {
        Command::Write(args) => run_write(args, config, api_key).await,
        Command::Speak(args) => run_speak(args, config, api_key).await,
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "openmic=debug,openmic_core=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(base) = env::var("OPENAI_API_BASE").or_else(|_| env::var("DEEPSEEK_BASE_URL")) {
        config.llm.api_base = base;
    }
    if let Ok(model) = env::var("DEFAULT_MODEL") {
        config.llm.model = model;
    }
}

async fn run_write(
    args: WriteArgs,
    mut config: Config,
    api_key: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let style = ComedyStyle::from_name(&args.style).ok_or_else(|| {
        format!(
            "Unknown style: '{}'. Available styles: {}",
            args.style,
            available_styles().join(", ")
        )
    })?;

    let api_key = api_key.unwrap_or_else(|| {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY / DEEPSEEK_API_KEY not set. API calls may fail.".yellow()
        );
        String::new()
    });

    if let Some(model) = &args.model {
        config.llm.model = model.clone();
        config.agents = Default::default();
    }
    if let Some(max_turns) = args.max_turns {
        config.workflow.max_turns = max_turns;
    }

    let brief = ComedyBrief::new(&args.topic)
        .with_style(style)
        .with_duration(args.duration)
        .with_audience(&args.audience);
    let team = config.team();

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", format!("  {} - Writers' Room", "OpenMic".bold()).bright_blue().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Topic:".bold(), brief.topic.bright_white());
    println!(
        "{} {} - {}",
        "Style:".bold(),
        style.name().bright_white(),
        style.description().dimmed()
    );
    println!(
        "{} {} min for {}",
        "Set:".bold(),
        brief.duration_minutes,
        brief.target_audience
    );
    println!();
    println!("{}", "Team:".bold());
    for (i, agent) in team.iter().enumerate() {
        let prompt = if agent.custom_system_prompt.is_some() {
            " (custom prompt)"
        } else {
            ""
        };
        println!(
            "  {}. {} - using {}{}",
            i + 1,
            agent.display_name_with_stage().bright_cyan(),
            agent.model.dimmed(),
            prompt.dimmed()
        );
    }
    println!();
    println!("{}", "─".repeat(70).dimmed());

    let model = Arc::new(OpenAiModel::new(&config.llm, &api_key)?);
    let session = SessionConfig::from_config(brief, &config);
    let mut orchestrator = ComedyOrchestrator::new(session, team, model.clone())?
        .with_callback(create_console_callback());

    let result = orchestrator.run().await?;

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    let summary = format!(
        "  Session finished: {} ({} turns, {} revisions)",
        result.outcome.description(),
        result.total_turns,
        result.revisions
    );
    if result.outcome.is_success() {
        println!("{}", summary.bright_green().bold());
    } else {
        println!("{}", summary.yellow().bold());
    }
    println!("{}", "═".repeat(70).bright_blue());

    if let Some(script) = &result.script {
        println!();
        println!("{}", "Final script:".bold());
        print_wrapped(script);
    }

    if let Some(path) = &args.save {
        std::fs::write(path, serde_json::to_string_pretty(&result)?)?;
        println!("{} {}", "Saved result to".dimmed(), path.display());
    }

    if args.speak {
        match &result.script {
            Some(script) => {
                let handle = (!api_key.is_empty()).then(|| {
                    ModelHandle::new(model, config.llm.model.clone(), config.llm.max_tokens)
                });
                let output = args
                    .output
                    .unwrap_or_else(|| PathBuf::from(output_filename(&result.brief.topic)));
                perform(
                    script,
                    &config,
                    args.voice,
                    Some(style.preferred_profile()),
                    handle,
                    &output,
                )
                .await?;
            }
            None => eprintln!("{}", "Nothing to perform: no script was produced.".yellow()),
        }
    }

    println!();
    Ok(())
}

async fn run_speak(
    args: SpeakArgs,
    mut config: Config,
    api_key: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let script = std::fs::read_to_string(&args.script)
        .map_err(|e| format!("Failed to read {}: {}", args.script.display(), e))?;

    if args.no_llm {
        config.speech.use_llm = false;
    }
    if args.no_fillers {
        config.speech.enable_fillers = false;
    }
    if let Some(seed) = args.seed {
        config.speech.fillers.seed = seed;
    }

    let handle = match (&api_key, config.speech.use_llm) {
        (Some(key), true) => {
            let model = Arc::new(OpenAiModel::new(&config.llm, key)?);
            Some(ModelHandle::new(model, config.llm.model.clone(), config.llm.max_tokens))
        }
        (None, true) => {
            eprintln!(
                "{}",
                "Warning: no API key set, using rule-based text processing.".yellow()
            );
            None
        }
        _ => None,
    };

    let output = args.output.unwrap_or_else(|| {
        let stem = args
            .script
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script".to_string());
        PathBuf::from(output_filename(&stem))
    });

    perform(
        &script,
        &config,
        args.voice,
        args.profile.as_deref(),
        handle,
        &output,
    )
    .await?;
    println!();
    Ok(())
}

async fn perform(
    script: &str,
    config: &Config,
    voice: Option<String>,
    profile: Option<&str>,
    model: Option<ModelHandle>,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let voice = voice.unwrap_or_else(|| config.speech.voice.clone());

    println!();
    println!("{}", "─".repeat(70).dimmed());
    println!("{}", "Loading TTS model (first run downloads it)...".dimmed());

    let backend = KokoroBackend::new(voice).await?;
    println!(
        "{} {}",
        "Performing with voice".bold(),
        backend.voice().bright_cyan()
    );
    if let Some(model) = &model {
        println!("{} {}", "Script processing with".dimmed(), model.name().dimmed());
    }
    let progress = Progress::new(Arc::new(|label: &str, fraction: f32| {
        eprintln!("  {} {:>3.0}%", label.dimmed(), fraction * 100.0);
    }));

    let mut pipeline = SpeechPipeline::new(config.speech.clone(), backend).with_progress(progress);
    if let Some(model) = model {
        pipeline = pipeline.with_model(model);
    }

    let rendered = pipeline.run(script, profile).await?;
    report_speech(&rendered);

    write_wav(output, &rendered.audio, rendered.sample_rate)?;
    println!(
        "{} {} ({:.1}s)",
        "Saved audio to".bright_green(),
        output.display(),
        rendered.duration_secs()
    );
    Ok(())
}

fn report_speech(output: &SpeechOutput) {
    println!(
        "{} {} segments",
        "Rendered".bold(),
        output.segments.len()
    );
    for fallback in &output.fallbacks {
        eprintln!(
            "{} {} used rule-based processing: {}",
            "Warning:".yellow(),
            fallback.step,
            fallback.reason
        );
    }
}

/// Create a callback that prints session events to the console.
fn create_console_callback() -> Box<dyn Fn(ComedyEvent) + Send + Sync> {
    Box::new(move |event| match event {
        ComedyEvent::StageStart { stage, agent } => {
            println!();
            println!(
                "{} {} {}",
                "▶".bright_cyan(),
                agent.bright_cyan().bold(),
                format!("({})", stage.display_name()).yellow()
            );
        }
        ComedyEvent::AgentMessage { agent: _, content } => {
            print_wrapped(&content);
        }
        ComedyEvent::RevisionRequested { cycle } => {
            println!();
            println!(
                "{}",
                format!("  ↺ Quality control requested revision {} of 3", cycle)
                    .bright_magenta()
                    .bold()
            );
        }
        ComedyEvent::SessionEnd { .. } => {
            // Handled in run_write
        }
    })
}

fn print_wrapped(text: &str) {
    for line in textwrap(text, 66).lines() {
        println!("  {}", line);
    }
}

/// Simple text wrapping that keeps existing line breaks.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();

    for (i, paragraph) in text.lines().enumerate() {
        if i > 0 {
            result.push('\n');
        }
        let mut current_line_len = 0;
        for word in paragraph.split_whitespace() {
            let word_len = word.chars().count();
            if current_line_len + word_len + 1 > width && current_line_len > 0 {
                result.push('\n');
                current_line_len = 0;
            }
            if current_line_len > 0 {
                result.push(' ');
                current_line_len += 1;
            }
            result.push_str(word);
            current_line_len += word_len;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_textwrap_keeps_paragraphs() {
        let wrapped = textwrap("one two three four\n\nfive", 9);
        assert_eq!(wrapped, "one two\nthree\nfour\n\nfive");
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "openmic", "write", "gyms", "--style", "roast", "-m", "gpt-4o", "--speak",
        ])
        .unwrap();
        match cli.command {
            Command::Write(args) => {
                assert_eq!(args.topic, "gyms");
                assert_eq!(args.model.as_deref(), Some("gpt-4o"));
                assert!(args.speak);
                assert_eq!(args.duration, 3);
            }
            Command::Speak(_) => panic!("expected write"),
        }

        let cli =
            Cli::try_parse_from(["openmic", "speak", "set.txt", "--no-llm", "--seed", "9", "-v"])
                .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Speak(args) => {
                assert!(args.no_llm);
                assert_eq!(args.seed, Some(9));
            }
            Command::Write(_) => panic!("expected speak"),
        }
    }
}
