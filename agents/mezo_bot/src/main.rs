use clap::{Parser, Subcommand};
use mezo_core::BoxError;
use mezo_engine::{
    engine::{Engine, EngineBuilder},
    extension::character::{Character, CharacterChatTool, DEFAULT_CHARACTER},
    model::{Model, openai},
};
use mezo_evm::{
    GraphClient, MezoLedger, RpcGateway, SafeTransferBtcTool, StdinConfirmer, SwapMusdBtcTool,
    TokenBalanceTool, TokenDirectory, TokenPriceTool, TransferBtcTool, TransferMusdTool,
    load_signer,
};
use std::{sync::Arc, time::Duration};
use structured_logger::{Builder, async_json::new_writer, get_env_level};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    signal,
};
use tokio_util::sync::CancellationToken;

mod config;
mod twitter;

use twitter::{CharacterCredentials, TwitterManager, twitter_poster_factory};

const APP_NAME: &str = env!("CARGO_PKG_NAME");
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

static LOG_TARGET: &str = "mezo_bot";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, env = "CONFIG_FILE_PATH", default_value = "./Config.toml")]
    config: String,

    /// Name of a built-in character
    #[arg(long, env = "MEZO_CHARACTER", default_value = DEFAULT_CHARACTER)]
    character: String,

    /// Path to a character TOML file, takes precedence over --character
    #[arg(long, env = "CHARACTER_FILE_PATH")]
    character_file: Option<String>,

    /// Routes BTC transfers through the confirmation-gated flow only
    #[arg(long, default_value_t = false)]
    safe_mode: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Chat with the agent on stdin, one request per line (default)
    Chat,

    /// Call one tool with a natural-language prompt.
    /// Example: `mezo_bot tool -n mezo_token_price -p "What is the price of BTC?"`
    Tool {
        /// Tool name, e.g. mezo_transfer_btc
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        prompt: String,
    },

    /// Register Twitter credentials for a character and start posting
    RegisterTwitter {
        #[arg(short, long)]
        name: String,

        #[arg(long, env = "TWITTER_API_KEY")]
        api_key: String,

        #[arg(long, env = "TWITTER_API_SECRET")]
        api_secret: String,

        #[arg(long, env = "TWITTER_ACCESS_TOKEN")]
        access_token: String,

        #[arg(long, env = "TWITTER_ACCESS_SECRET")]
        access_secret: String,

        /// Short personality line shown in every tweet
        #[arg(long, default_value = "curt, uninterested and snarky")]
        personality: String,
    },

    /// Post for every registered character until Ctrl-C
    Run,
}

// cargo run -p mezo_bot -- --config agents/mezo_bot/Config.toml chat
#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let cfg = config::Conf::from_file(&cli.config)?;

    let level = std::env::var("RUST_LOG")
        .map(|_| get_env_level().to_string())
        .unwrap_or_else(|_| cfg.log.level.clone());
    Builder::with_level(&level)
        .with_target_writer("*", new_writer(tokio::io::stderr()))
        .init();
    log::info!(target: LOG_TARGET, "bootstrap {}@{}", APP_NAME, APP_VERSION);

    let character = load_character(&cli)?;
    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let engine = build_engine(&cfg, &character, cli.safe_mode)?;
            chat_loop(engine).await
        }
        Commands::Tool { name, prompt } => {
            let engine = build_engine(&cfg, &character, cli.safe_mode)?;
            let args = serde_json::json!({ "prompt": prompt }).to_string();
            let (text, _) = engine.tool_call(&name, args).await?;
            println!("{}", text);
            Ok(())
        }
        Commands::RegisterTwitter {
            name,
            api_key,
            api_secret,
            access_token,
            access_secret,
            personality,
        } => {
            let cancel = CancellationToken::new();
            let mut manager = TwitterManager::load(
                &cfg.twitter.config_path,
                twitter_poster_factory(),
                cancel.clone(),
            )?;
            manager.register(
                name.clone(),
                CharacterCredentials {
                    api_key,
                    api_secret,
                    access_token,
                    access_secret,
                    personality,
                },
            )?;
            println!("✅ Character '{}' registered for Twitter with personality!", name);
            run_until_shutdown(manager, cancel).await
        }
        Commands::Run => {
            let cancel = CancellationToken::new();
            let mut manager = TwitterManager::load(
                &cfg.twitter.config_path,
                twitter_poster_factory(),
                cancel.clone(),
            )?;
            if manager.characters().is_empty() {
                return Err("no character registered for Twitter, run register-twitter first".into());
            }
            manager.start_all()?;
            run_until_shutdown(manager, cancel).await
        }
    }
}

fn load_character(cli: &Cli) -> Result<Character, BoxError> {
    match &cli.character_file {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            Character::from_toml(&content)
        }
        None => Ok(Character::builtin(&cli.character)),
    }
}

fn connect_model(cfg: &config::Llm) -> Result<Model, BoxError> {
    if cfg.api_key.is_empty() {
        log::warn!(target: LOG_TARGET, "OPENAI_API_KEY not set, model calls will fail");
        return Ok(Model::not_implemented());
    }
    let endpoint = Some(cfg.endpoint.clone()).filter(|e| !e.is_empty());
    let cli = openai::Client::new(&cfg.api_key, endpoint)?;
    Ok(Model::with_completer(Arc::new(
        cli.completion_model(&cfg.model),
    )))
}

fn build_engine(
    cfg: &config::Conf,
    character: &Character,
    safe_mode: bool,
) -> Result<Engine, BoxError> {
    let model = connect_model(&cfg.llm)?;

    let signer = load_signer(std::env::var("PRIVATE_KEY").ok().as_deref())?;
    let gateway = RpcGateway::new(&cfg.chain.gateway_config(), signer)?;
    let graph = GraphClient::new(
        Some(cfg.graph.url.clone()),
        Duration::from_secs(cfg.graph.timeout_secs),
    )?;
    let ledger = Arc::new(MezoLedger::new(
        Arc::new(gateway),
        TokenDirectory::new(Arc::new(graph)),
        Arc::new(StdinConfirmer),
        cfg.chain.addresses(),
    ));

    let mut engine = EngineBuilder::new()
        .with_name(character.name.clone())
        .with_model(model)
        .with_system(format!(
            "You are {}, an agent operating on the Mezo chain. {}\n\
            Use the tools for transfers, swaps, balances and prices; \
            use {} for anything else.",
            character.name,
            character.personality,
            CharacterChatTool::NAME
        ))
        .register_tool(CharacterChatTool::new(character.clone()))?
        .register_tool(SafeTransferBtcTool::new(ledger.clone()))?
        .register_tool(TransferMusdTool::new(ledger.clone()))?
        .register_tool(SwapMusdBtcTool::new(ledger.clone()))?
        .register_tool(TokenBalanceTool::new(ledger.clone()))?
        .register_tool(TokenPriceTool::new(ledger.clone()))?;
    if !safe_mode {
        engine = engine.register_tool(TransferBtcTool::new(ledger))?;
    }
    let engine = engine.build();
    log::info!(
        target: LOG_TARGET,
        engine = engine.name(),
        tools = engine.tool_names().join(",");
        "engine ready"
    );
    Ok(engine)
}

async fn chat_loop(engine: Engine) -> Result<(), BoxError> {
    println!(
        "{} is ready. Ask for a transfer, swap, balance or price; type 'exit' to quit.",
        engine.name()
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nYou: ");
        std::io::Write::flush(&mut std::io::stdout())?;
        let line = match lines.next_line().await? {
            Some(line) => line,
            None => return Ok(()),
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if prompt.eq_ignore_ascii_case("exit") || prompt.eq_ignore_ascii_case("quit") {
            return Ok(());
        }
        match engine.chat(prompt.to_string()).await {
            Ok(output) => println!("{}: {}", engine.name(), output.content),
            Err(err) => {
                log::error!(target: LOG_TARGET, "chat error: {}", err);
                println!("{}: ❌ {}", engine.name(), err);
            }
        }
    }
}

async fn run_until_shutdown(
    mut manager: TwitterManager,
    cancel: CancellationToken,
) -> Result<(), BoxError> {
    log::info!(
        target: LOG_TARGET,
        characters = manager.running().join(",");
        "tweet schedules running"
    );
    shutdown_signal(cancel).await?;
    manager.shutdown().await;
    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) -> Result<(), BoxError> {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!(target: LOG_TARGET, "failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!(target: LOG_TARGET, "failed to install signal handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel_token.cancelled() => {},
    }

    log::warn!(target: LOG_TARGET, "received termination signal, starting graceful shutdown");
    cancel_token.cancel();
    Ok(())
}
