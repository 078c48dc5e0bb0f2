//! # singing
//!
//! Newsletter channels from the command line.
//!
//! Usage:
//!   singing run                                  # tick every channel until Ctrl-C
//!   singing publish news "Release 1.2"           # add a feed entry
//!   singing trigger news --item "Hello"          # send now
//!   singing subscribe news --email a@x.org       # add a subscriber
//!   singing confirm news <secret>                # activate a pending subscription
//!   singing unsubscribe news <secret>
//!   singing list news --search alice

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use singing_assembler::{Data, Item};
use singing_core::{config::DEFAULT_FORMAT, SingingConfig};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;

use app::App;

#[derive(Parser)]
#[command(name = "singing", version, about = "Newsletter channels: subscribe, schedule, send")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: $SINGING_CONFIG or ~/.singing/singing.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Tick every channel scheduler until Ctrl-C
    Run,

    /// Add an entry to a channel's feed; subscribers get it on the next fire
    Publish {
        channel: String,

        title: String,

        /// Only subscribers following this topic (or no topic filter) get it
        #[arg(short, long)]
        topic: Option<String>,
    },

    /// Fire a channel now, ignoring its schedule
    Trigger {
        channel: String,

        /// Extra text item to include (repeatable)
        #[arg(short, long = "item")]
        items: Vec<String>,
    },

    /// Add a subscriber
    Subscribe {
        channel: String,

        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long, default_value = DEFAULT_FORMAT)]
        format: String,
    },

    /// Activate a pending subscription
    Confirm { channel: String, secret: String },

    /// Remove a subscription
    Unsubscribe { channel: String, secret: String },

    /// List subscriptions of a channel
    List {
        channel: String,

        /// Case-insensitive substring filter
        #[arg(short, long)]
        search: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "singing_cli=info,singing_scheduler=info,singing_assembler=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // config: --config > SINGING_CONFIG env > ~/.singing/singing.toml
    let config_path = cli.config.or_else(|| std::env::var("SINGING_CONFIG").ok());
    let config = SingingConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        SingingConfig::default()
    });
    let app = App::open(config)?;

    match cli.command {
        Commands::Run => run(app).await,
        Commands::Publish {
            channel,
            title,
            topic,
        } => {
            app.channel_config(&channel)?;
            let seq = app
                .db
                .publish(&channel, Utc::now(), &title, topic.as_deref())?;
            println!("published #{seq} to '{channel}'");
            Ok(())
        }
        Commands::Trigger { channel, items } => trigger(&app, &channel, items),
        Commands::Subscribe {
            channel,
            email,
            name,
            format,
        } => subscribe(&app, &channel, email, name, &format),
        Commands::Confirm { channel, secret } => {
            let mut ch = app.load_channel(&channel)?;
            let sub = ch.confirm(&secret)?;
            app.db.save(&channel, sub)?;
            println!("confirmed {}", sub.key);
            Ok(())
        }
        Commands::Unsubscribe { channel, secret } => {
            let mut ch = app.load_channel(&channel)?;
            let removed = ch.unsubscribe(&secret)?;
            app.db.remove(&removed.id)?;
            println!("unsubscribed {}", removed.key);
            Ok(())
        }
        Commands::List { channel, search } => list(&app, &channel, search.as_deref()),
    }
}

async fn run(app: App) -> Result<()> {
    let engine = app.engine(&[])?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            let _ = shutdown_tx.send(true);
        }
    });

    let engine = engine.run(shutdown_rx).await;
    info!(channels = engine.channels().len(), "engine stopped");
    Ok(())
}

fn trigger(app: &App, channel: &str, items: Vec<String>) -> Result<()> {
    let mut engine = app.engine(&[channel])?;
    let items = items.into_iter().map(Item::new).collect();
    let count = engine.trigger_with_items(channel, items, Utc::now())?;
    println!("{count} message(s) assembled for '{channel}'");
    Ok(())
}

fn subscribe(
    app: &App,
    channel: &str,
    email: String,
    name: Option<String>,
    format: &str,
) -> Result<()> {
    let mut ch = app.load_channel(channel)?;
    let mut composer_data = Data::new();
    composer_data.insert("email".into(), Value::String(email));
    if let Some(name) = name {
        composer_data.insert("name".into(), Value::String(name));
    }

    let settings = &app.config.subscriptions;
    let sub = ch.subscribe(
        format,
        composer_data,
        Data::new(),
        &settings.secret_salt,
        settings.require_confirmation,
    )?;
    app.db.save(channel, sub)?;

    let state = if sub.metadata.pending { "pending" } else { "active" };
    println!("{} subscribed to '{channel}' ({state})", sub.key);
    println!("secret: {}", sub.secret);
    Ok(())
}

fn list(app: &App, channel: &str, search: Option<&str>) -> Result<()> {
    app.channel_config(channel)?;
    let subs = match search {
        Some(text) => app.db.search(channel, text)?,
        None => app.db.load_channel(channel)?,
    };
    for sub in &subs {
        let row = json!({
            "id": sub.id.as_str(),
            "key": sub.key,
            "format": sub.metadata.format,
            "pending": sub.metadata.pending,
            "cue": sub.metadata.cue,
        });
        println!("{row}");
    }
    info!(channel, count = subs.len(), "listed subscriptions");
    Ok(())
}
