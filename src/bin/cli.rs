// CLI binary: exiting on unrecoverable errors is standard for CLI tools.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use glass_card::animation::{AnimationEngine, SmoothingMode, DEFAULT_REFERENCE_FPS};
use glass_card::chat::{ChatEmitter, ConversationDriver, TurnOutcome};
use glass_card::error::AppError;
use glass_card::events;
use glass_card::llm::HttpTransport;
use glass_card::look::CardLook;
use glass_card::model::VisualParameters;
use glass_card::settings::{self, LlmConfigInfo, LlmProvider};
use glass_card::storage::JsonFileStorage;
use glass_card::store::{SceneStore, StoreChange, STATE_SLOT};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "glasscard", about = "AI glass namecard scene pipeline", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config directory override (settings, credentials, conversation state)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message to the assistant and apply its reply
    Chat {
        /// The message; multiple words are joined with spaces
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Print the conversation transcript
    Show,
    /// Print the current scene parameters
    Params {
        /// Print the derived material and lighting values instead
        #[arg(long)]
        look: bool,
    },
    /// Validate a parameter JSON file
    Validate { file: PathBuf },
    /// Extract parameters from assistant text read on stdin
    Extract,
    /// Simulate the animation loop and print one frame per line
    Animate {
        #[arg(long, default_value_t = 60)]
        frames: usize,
        #[arg(long, default_value_t = 60.0)]
        fps: f64,
    },
    /// Print the JSON schema of the scene parameters
    Schema,
    /// Show or change settings
    Config {
        #[arg(long, value_enum)]
        provider: Option<ProviderArg>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        /// Store the API key in the credentials file ("" clears it)
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long, value_enum)]
        smoothing: Option<SmoothingArg>,
        /// Fixed particle seed; negative clears it
        #[arg(long, allow_hyphen_values = true)]
        seed: Option<i64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Anthropic,
    Openai,
}

#[derive(Clone, Copy, ValueEnum)]
enum SmoothingArg {
    PerFrame,
    DeltaNormalized,
}

// ── Output ───────────────────────────────────────────────────────

fn print_json<T: Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap());
}

fn print_event<T: Serialize>(event: &str, data: &T) {
    println!(
        "{}",
        serde_json::json!({ "event": event, "data": data })
    );
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("Error: {e}");
    process::exit(1);
}

/// Streams tokens to stdout as they arrive. In JSON mode every emission is a
/// JSON line tagged with its event name.
struct StdoutEmitter {
    json: bool,
}

impl ChatEmitter for StdoutEmitter {
    fn emit_token(&self, text: &str) {
        if self.json {
            print_event(events::CHAT_TOKEN, &text);
        } else {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
    }
    fn emit_thinking(&self, thinking: bool) {
        if self.json {
            print_event(events::CHAT_THINKING, &thinking);
        }
    }
    fn emit_scene_updated(&self, params: &VisualParameters) {
        if self.json {
            print_event(events::SCENE_UPDATED, params);
        }
    }
    fn emit_error(&self, message: &str) {
        if self.json {
            print_event(events::CHAT_ERROR, &message);
        }
    }
    fn emit_complete(&self) {
        if self.json {
            print_event(events::CHAT_COMPLETE, &true);
        } else {
            println!();
        }
    }
}

// ── Commands ─────────────────────────────────────────────────────

fn open_store(config_dir: &Path) -> Arc<SceneStore> {
    let storage = JsonFileStorage::new(config_dir, STATE_SLOT);
    log::debug!("Conversation state at {}", storage.path().display());
    Arc::new(SceneStore::open(Box::new(storage)))
}

async fn run_chat(config_dir: &Path, text: &str, json: bool) {
    let loaded = settings::load_settings(config_dir);
    let transport = HttpTransport::new(&loaded.llm).unwrap_or_else(|e| fail(e));
    let store = open_store(config_dir);

    if json {
        store.subscribe(Arc::new(|change: &StoreChange| match change {
            StoreChange::MessageAppended(msg) => print_event(events::MESSAGE_APPENDED, msg),
            StoreChange::InProgressChanged(flag) => {
                print_event(events::IN_PROGRESS_CHANGED, flag);
            }
            StoreChange::ParametersReplaced(_) => {}
        }));
    }

    let driver = ConversationDriver::new(store, Arc::new(transport))
        .with_sampling(loaded.llm.temperature, loaded.llm.max_tokens);
    let emitter = StdoutEmitter { json };
    match driver.run_turn(text, &emitter).await {
        Ok(TurnOutcome::Applied(params)) => {
            if !json {
                eprintln!("Scene updated: {} / {}", params.text, params.subtitle);
            }
        }
        Ok(TurnOutcome::NoUpdate) => {
            if !json {
                eprintln!("No scene update in reply.");
            }
        }
        Ok(TurnOutcome::TransportFailed(e)) => fail(AppError::from(e)),
        Err(rejected) => fail(AppError::from(rejected)),
    }
}

fn run_show(config_dir: &Path, json: bool) {
    let snapshot = open_store(config_dir).snapshot();
    if json {
        print_json(&snapshot);
        return;
    }
    if snapshot.messages.is_empty() {
        println!("(no messages)");
    }
    for msg in &snapshot.messages {
        let when = chrono::DateTime::from_timestamp_millis(msg.timestamp)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!("[{when}] {}: {}", msg.sender.role(), msg.content);
    }
}

fn run_params(config_dir: &Path, look: bool) {
    let params = open_store(config_dir).parameters();
    if look {
        print_json(&CardLook::from_params(&params));
    } else {
        print_json(&*params);
    }
}

fn run_validate(file: &Path, json: bool) {
    let raw = std::fs::read_to_string(file).unwrap_or_else(|e| fail(AppError::from(e)));
    match glass_card::validate::validate_str(&raw) {
        Ok(params) => {
            if json {
                print_json(&params);
            } else {
                println!("OK: \"{}\"", params.text);
                if !params.text_within_advice() {
                    println!("note: text is longer than the suggested limits");
                }
            }
        }
        Err(e) => fail(AppError::from(e)),
    }
}

fn run_extract() {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .unwrap_or_else(|e| fail(AppError::from(e)));
    match glass_card::extract::extract(&raw) {
        Some(params) => print_json(&params),
        None => fail("no valid scene parameters found"),
    }
}

fn run_animate(config_dir: &Path, frames: usize, fps: f64) {
    if !fps.is_finite() || fps <= 0.0 {
        fail("--fps must be positive");
    }
    let loaded = settings::load_settings(config_dir);
    let params = open_store(config_dir).parameters();
    let mut engine = AnimationEngine::new(
        loaded.animation.smoothing,
        loaded.animation.particle_seed,
    );
    let dt = 1.0 / fps;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for _ in 0..frames {
        let frame = engine.tick(dt, &params);
        writeln!(out, "{}", serde_json::to_string(&frame).unwrap()).unwrap();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_config(
    config_dir: &Path,
    json: bool,
    provider: Option<ProviderArg>,
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    smoothing: Option<SmoothingArg>,
    seed: Option<i64>,
) {
    let mut current = settings::load_settings(config_dir);
    let mut changed = false;

    if let Some(p) = provider {
        current.llm.provider = match p {
            ProviderArg::Anthropic => LlmProvider::Anthropic,
            ProviderArg::Openai => LlmProvider::OpenAiCompatible,
        };
        changed = true;
    }
    if let Some(m) = model {
        current.llm.model = Some(m).filter(|m| !m.is_empty());
        changed = true;
    }
    if let Some(u) = base_url {
        current.llm.base_url = Some(u).filter(|u| !u.is_empty());
        changed = true;
    }
    if let Some(s) = smoothing {
        current.animation.smoothing = match s {
            SmoothingArg::PerFrame => SmoothingMode::PerFrame,
            SmoothingArg::DeltaNormalized => SmoothingMode::DeltaNormalized {
                reference_fps: DEFAULT_REFERENCE_FPS,
            },
        };
        changed = true;
    }
    if let Some(seed) = seed {
        current.animation.particle_seed = u64::try_from(seed).ok();
        changed = true;
    }
    if let Some(key) = api_key {
        settings::save_api_key(config_dir, &key).unwrap_or_else(|e| fail(AppError::from(e)));
        current.llm.api_key = Some(key).filter(|k| !k.is_empty());
    }
    if changed {
        settings::save_settings(config_dir, &current).unwrap_or_else(|e| {
            fail(AppError::SettingsSaveError {
                message: e.to_string(),
            })
        });
    }

    let info = LlmConfigInfo::from_config(&current.llm);
    if json {
        print_json(&serde_json::json!({ "llm": info, "animation": current.animation }));
    } else {
        println!("config dir:  {}", config_dir.display());
        println!("provider:    {:?}", info.provider);
        println!("model:       {}", info.model.as_deref().unwrap_or("(default)"));
        println!("base url:    {}", info.base_url.as_deref().unwrap_or("(default)"));
        println!("api key:     {}", if info.has_api_key { "set" } else { "not set" });
        println!("temperature: {}", info.temperature);
        println!("max tokens:  {}", info.max_tokens);
        println!("smoothing:   {:?}", current.animation.smoothing);
        match current.animation.particle_seed {
            Some(seed) => println!("seed:        {seed}"),
            None => println!("seed:        (random)"),
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(glass_card::paths::default_config_dir);
    let json = cli.json;

    match cli.command {
        Commands::Chat { text } => run_chat(&config_dir, &text.join(" "), json).await,
        Commands::Show => run_show(&config_dir, json),
        Commands::Params { look } => run_params(&config_dir, look),
        Commands::Validate { file } => run_validate(&file, json),
        Commands::Extract => run_extract(),
        Commands::Animate { frames, fps } => run_animate(&config_dir, frames, fps),
        Commands::Schema => print_json(&glass_card::model::params::json_schema()),
        Commands::Config {
            provider,
            model,
            base_url,
            api_key,
            smoothing,
            seed,
        } => run_config(
            &config_dir,
            json,
            provider,
            model,
            base_url,
            api_key,
            smoothing,
            seed,
        ),
    }
}
