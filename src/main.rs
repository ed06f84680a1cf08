//! chat-friend CLI: a console companion that learns when to talk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;

use chat_friend::config::ChatConfig;
use chat_friend::fetch::{ContentFetcher, HttpContentFetcher, OfflineFetcher};
use chat_friend::learn::response::{ResponseCatalog, ResponseSelector};
use chat_friend::message::{JsonSink, MessageSink, StdoutSink};
use chat_friend::nlu::LexicalClassifier;
use chat_friend::paths::ChatPaths;
use chat_friend::preference::{AddOutcome, PreferenceStore};
use chat_friend::session::ConversationController;

#[derive(Parser)]
#[command(name = "chat-friend", version, about = "Console companion that learns when to talk")]
struct Cli {
    /// Configuration file (defaults to the XDG config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Preference file, overriding the configured one.
    #[arg(long, global = true)]
    preferences: Option<PathBuf>,

    /// Seed every random choice for a reproducible session.
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Never reach out to the network for searches.
    #[arg(long, global = true)]
    offline: bool,

    /// Disable inactivity nudges.
    #[arg(long, global = true)]
    no_monitor: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session (the default).
    Chat {
        /// Emit newline-delimited JSON messages instead of console text.
        #[arg(long)]
        json: bool,
    },

    /// Inspect or edit remembered preferences.
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },

    /// Run the offline bootstrap and print the learned reply per phrase.
    Train,

    /// Show or write the configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum PrefsAction {
    /// List remembered preferences.
    List,
    /// Remember a new preference.
    Add {
        /// The liked item, e.g. "pizza".
        item: String,
    },
    /// Forget every preference.
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Write the default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let paths = ChatPaths::resolve()?;
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let config = effective_config(&cli, &config_path)?;
    let preference_path = config
        .preferences
        .file
        .clone()
        .unwrap_or_else(|| paths.preference_file());

    match cli.command.unwrap_or(Commands::Chat { json: false }) {
        Commands::Chat { json } => {
            let sink: Arc<dyn MessageSink> = if json {
                Arc::new(JsonSink)
            } else {
                Arc::new(StdoutSink)
            };
            let fetcher: Box<dyn ContentFetcher> = if config.fetch.offline {
                Box::new(OfflineFetcher)
            } else {
                Box::new(
                    HttpContentFetcher::new(Duration::from_secs(config.fetch.timeout_secs))
                        .with_language(&config.fetch.language),
                )
            };
            let catalog = ResponseCatalog::default();
            let classifier = LexicalClassifier::new(catalog.phrases());

            let mut chat = ConversationController::new(
                &config,
                classifier,
                fetcher,
                PreferenceStore::open(preference_path),
                sink,
            )?;
            let report = chat.bootstrap();
            tracing::info!(
                episodes = report.episodes,
                mean_reward = report.mean_reward(),
                "bootstrap finished"
            );
            let summary = chat.run(std::io::stdin().lock())?;
            tracing::info!(?summary, "session summary");
        }

        Commands::Prefs { action } => {
            let mut store = PreferenceStore::open(&preference_path);
            match action {
                PrefsAction::List => {
                    if store.is_empty() {
                        println!("No preferences remembered yet.");
                    }
                    for item in store.items() {
                        println!("{item}");
                    }
                }
                PrefsAction::Add { item } => match store.add(&item)? {
                    AddOutcome::Added(item) => println!("Remembered \"{item}\"."),
                    AddOutcome::AlreadyKnown(item) => println!("\"{item}\" was already known."),
                },
                PrefsAction::Clear => {
                    let count = store.len();
                    store.clear()?;
                    println!("Forgot {count} preference(s).");
                }
            }
        }

        Commands::Train => {
            let mut selector = ResponseSelector::new(ResponseCatalog::default(), &config.response)?;
            let mut rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let report = selector.train(&mut rng);
            println!(
                "{} episodes, mean reward {:.3}",
                report.episodes,
                report.mean_reward()
            );
            for (state, phrase) in selector.catalog().phrases().iter().enumerate() {
                println!("  {phrase:<24} -> {}", selector.respond_with(state));
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => print!("{}", config.to_toml()?),
            ConfigAction::Init { force } => {
                if config_path.exists() && !force {
                    println!(
                        "{} already exists (use --force to overwrite).",
                        config_path.display()
                    );
                } else {
                    ChatConfig::default().save(&config_path)?;
                    println!("Wrote {}", config_path.display());
                }
            }
        },
    }

    Ok(())
}

/// Config file plus command-line overrides.
fn effective_config(cli: &Cli, path: &Path) -> Result<ChatConfig> {
    let mut config = ChatConfig::load_or_default(path)?;
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    if let Some(file) = &cli.preferences {
        config.preferences.file = Some(file.clone());
    }
    if cli.offline {
        config.fetch.offline = true;
    }
    if cli.no_monitor {
        config.monitor.enabled = false;
    }
    Ok(config)
}
