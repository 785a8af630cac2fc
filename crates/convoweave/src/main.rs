use std::env;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use config::{Config, Environment, File, FileFormat};
use log::{LevelFilter, debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use convoweave::api::{self, AppState, ServerState};
use convoweave::db::Database;
use convoweave::llm::LlmClient;
use convoweave::store::SessionStore;
use convoweave::tts::TtsClient;
use convoweave::vision::FrameAnalyzer;

const APP_NAME: &str = "convoweave";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_main(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    handle_serve(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("resolved paths: {:#?}", ctx.paths);

    match cli.command {
        Command::Serve(cmd) => async_main(ctx, cmd),
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "ConvoWeave - live session coordination server.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP API server
    Serve(ServeCommand),
    /// Create config directories and default files
    Init(InitCommand),
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Host address to bind to (overrides config)
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Debug, Clone, Args)]
struct InitCommand {
    /// Overwrite an existing config file
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
}

struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let paths = AppPaths::discover(common.config.clone())?;
        let config = load_config(&paths)?;
        let paths = paths.apply_overrides(&config)?;
        Ok(Self {
            common,
            paths,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        // Determine filter level
        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("convoweave={level},tower_http={level}")));

        // Use JSON output if --json flag is set, otherwise pretty format
        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_ansi(!disable_color))
                .try_init()
                .ok();
        }

        // Also init env_logger for compatibility with log crate users
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        builder.filter_level(self.effective_log_level());
        builder.try_init().ok();

        Ok(())
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => self
                    .config
                    .logging
                    .level
                    .parse()
                    .unwrap_or(LevelFilter::Info),
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.paths.data_dir).with_context(|| {
            format!("creating data directory {}", self.paths.data_dir.display())
        })?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct AppPaths {
    config_file: PathBuf,
    data_dir: PathBuf,
}

impl AppPaths {
    fn discover(override_path: Option<PathBuf>) -> Result<Self> {
        let config_file = match override_path {
            Some(path) => {
                let expanded = expand_path(path)?;
                if expanded.is_dir() {
                    expanded.join("config.toml")
                } else {
                    expanded
                }
            }
            None => default_config_dir()?.join("config.toml"),
        };

        if config_file.parent().is_none() {
            return Err(anyhow!("invalid config file path: {config_file:?}"));
        }

        let data_dir = default_data_dir()?;

        Ok(Self {
            config_file,
            data_dir,
        })
    }

    fn apply_overrides(mut self, cfg: &AppConfig) -> Result<Self> {
        if let Some(ref data_override) = cfg.paths.data_dir {
            self.data_dir = expand_str_path(data_override)?;
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    server: ServerConfig,
    logging: LoggingConfig,
    paths: PathsConfig,
    storage: StorageConfig,
    llm: Option<LlmConfig>,
    tts: Option<TtsConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            paths: PathsConfig::default(),
            storage: StorageConfig::default(),
            llm: None,
            tts: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ServerConfig {
    /// Host address to bind to.
    host: String,
    /// Port to listen on.
    port: u16,
    /// Origins allowed by the CORS layer.
    allowed_origins: Vec<String>,
    /// Development mode relaxes CORS to localhost origins.
    dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: Vec::new(),
            dev_mode: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct LoggingConfig {
    level: String,
    file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct PathsConfig {
    data_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct StorageConfig {
    /// Whether best-effort persistence is enabled.
    enabled: bool,
    /// Database file path; defaults to <data_dir>/convoweave.db.
    path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// LLM collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LlmConfig {
    /// Whether the LLM integration is enabled.
    #[serde(default = "default_true")]
    enabled: bool,
    /// Base URL of the OpenAI-compatible service.
    #[serde(default = "default_llm_base_url")]
    base_url: String,
    /// API key for the service.
    api_key: Option<String>,
    /// Chat model identifier.
    model: Option<String>,
}

/// TTS collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TtsConfig {
    /// Whether speech synthesis is enabled.
    #[serde(default = "default_true")]
    enabled: bool,
    /// Base URL of the synthesis service.
    #[serde(default = "default_tts_base_url")]
    base_url: String,
    /// Voice identifier.
    #[serde(default = "default_tts_voice")]
    voice: String,
}

fn default_true() -> bool {
    true
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_tts_base_url() -> String {
    "http://localhost:8766".to_string()
}

fn default_tts_voice() -> String {
    "af_heart".to_string()
}

fn load_config(paths: &AppPaths) -> Result<AppConfig> {
    let config = Config::builder()
        .add_source(
            File::from(paths.config_file.clone())
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(Environment::with_prefix("CONVOWEAVE").separator("__"))
        .build()
        .context("loading configuration")?;

    config
        .try_deserialize::<AppConfig>()
        .context("parsing configuration")
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    let config_file = &ctx.paths.config_file;
    if config_file.exists() && !cmd.force {
        info!("Config file already exists: {}", config_file.display());
        return Ok(());
    }

    if let Some(parent) = config_file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }
    ctx.ensure_directories()?;

    let rendered =
        toml::to_string_pretty(&AppConfig::default()).context("serializing default config")?;
    fs::write(config_file, rendered)
        .with_context(|| format!("writing config file {}", config_file.display()))?;

    println!("Wrote default config to {}", config_file.display());
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&ctx.config).context("serializing config")?
                );
            } else {
                println!(
                    "{}",
                    toml::to_string_pretty(&ctx.config).context("serializing config")?
                );
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}

async fn handle_serve(ctx: &RuntimeContext, cmd: ServeCommand) -> Result<()> {
    info!("Starting ConvoWeave server...");
    ctx.ensure_directories()?;

    // Best-effort persistence store
    let store = if ctx.config.storage.enabled {
        let db_path = match &ctx.config.storage.path {
            Some(path) => expand_str_path(path)?,
            None => ctx.paths.data_dir.join("convoweave.db"),
        };
        info!("Database path: {}", db_path.display());
        let database = Database::new(&db_path).await?;
        Some(SessionStore::new(database.pool().clone()))
    } else {
        info!("Persistence disabled");
        None
    };

    // LLM collaborator (sentiment, tone, transcription, summaries)
    let llm = match &ctx.config.llm {
        Some(llm_cfg) if llm_cfg.enabled => match &llm_cfg.api_key {
            Some(api_key) => {
                info!("LLM service configured: {}", llm_cfg.base_url);
                LlmClient::new(llm_cfg.base_url.clone(), api_key.clone(), llm_cfg.model.clone())
            }
            None => {
                warn!("LLM enabled but no API key configured; AI features degraded");
                LlmClient::disabled()
            }
        },
        _ => {
            info!("LLM service not configured; AI features degraded to defaults");
            LlmClient::disabled()
        }
    };

    // TTS collaborator
    let tts = match &ctx.config.tts {
        Some(tts_cfg) if tts_cfg.enabled => {
            info!("TTS service configured: {}", tts_cfg.base_url);
            TtsClient::new(tts_cfg.base_url.clone(), tts_cfg.voice.clone())
        }
        _ => {
            info!("TTS service not configured; summaries are text-only");
            TtsClient::disabled()
        }
    };

    let server = ServerState {
        allowed_origins: ctx.config.server.allowed_origins.clone(),
        dev_mode: ctx.config.server.dev_mode,
    };
    if server.dev_mode {
        info!("Server mode: development");
    } else {
        info!("Server mode: production");
    }

    let state = AppState::new(llm, tts, FrameAnalyzer::new(), store, server);

    // Keep a handle for shutdown cleanup
    let controller = state.controller.clone();

    let app = api::create_router(state);

    // Bind and serve; CLI args override config file values
    let host = cmd.host.unwrap_or_else(|| ctx.config.server.host.clone());
    let port = cmd.port.unwrap_or(ctx.config.server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("invalid address")?;

    info!("Listening on http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .context("binding to address")?;

    // Set up graceful shutdown
    let shutdown_signal = async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        info!("Shutdown signal received, ending live sessions...");

        // End every live session so connected clients hear about it and
        // final snapshots get persisted.
        for session_id in controller.registry().session_ids() {
            if let Err(e) = controller.end_session(&session_id).await {
                warn!("Error ending session {} during shutdown: {}", session_id, e);
            }
        }

        info!("Shutdown complete");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("running server")?;

    Ok(())
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    let raw = path
        .to_str()
        .ok_or_else(|| anyhow!("non-UTF8 path: {path:?}"))?;
    expand_str_path(raw)
}

fn expand_str_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw).with_context(|| format!("expanding path {raw}"))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_NAME))
        .ok_or_else(|| anyhow!("could not determine config directory"))
}

fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_NAME))
        .ok_or_else(|| anyhow!("could not determine data directory"))
}
