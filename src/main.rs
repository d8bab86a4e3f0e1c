//! chatrelay - streams LLM chat replies from hosted providers to a browser
//!
//! A small server that forwards a conversation to a completion-style or
//! chat-style provider and relays the reply as a byte stream.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay::config::{Config, RelayMode};

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(about = "Streams LLM chat replies from hosted providers to a browser")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "chatrelay.toml")]
        config: String,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration and show which provider would be used
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "chatrelay.toml")]
        config: String,
    },
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chatrelay={},tower_http=info", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let (mut loaded, key_sources) = Config::from_file(&config)?;
            init_tracing(&loaded.logging.level);
            tracing::info!(config = %config, "Loaded configuration");

            let source = match loaded.relay.mode {
                RelayMode::Completion => &key_sources.completion,
                RelayMode::Chat => &key_sources.chat,
            };
            tracing::info!(mode = %loaded.relay.mode, key_source = %source, "Provider credential resolved");

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                loaded.server.listen = addr;
            }

            chatrelay::proxy::run_server(loaded).await
        }

        Commands::Check { config } => {
            let (loaded, key_sources) = Config::from_file(&config)?;

            println!("Configuration OK: {}", config);
            println!("  listen:        {}", loaded.server.listen);
            println!("  mode:          {}", loaded.relay.mode);
            println!("  relay timeout: {}s", loaded.server.relay_timeout_secs);
            match loaded.relay.mode {
                RelayMode::Completion => {
                    println!("  endpoint:      {}", loaded.completion.url);
                    println!("  model:         {}", loaded.completion.model);
                    println!("  api key:       {}", key_sources.completion);
                }
                RelayMode::Chat => {
                    println!("  endpoint:      {}", loaded.chat.base_url);
                    println!("  model:         {}", loaded.chat.model);
                    println!("  api key:       {}", key_sources.chat);
                    println!("  safety rules:  {}", loaded.chat.safety.len());
                }
            }
            Ok(())
        }
    }
}
