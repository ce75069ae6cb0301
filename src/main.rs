// Music Streaming Bot
// Discord surface for the per-guild music streaming settings

mod commands;

use std::env;
use std::sync::Arc;

use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use musicstream_rs::api::firebase::FirebaseClient;
use musicstream_rs::features::audit::{AuditLogger, AuditSink, FirestoreAuditSink, LogAuditSink};
use musicstream_rs::features::flags::{FeatureFlagProjector, MemoryFlagCache};
use musicstream_rs::features::notifier::{ChangeNotifier, LocalBus};
use musicstream_rs::features::orchestrator::UpdateOrchestrator;
use musicstream_rs::store::{ConfigStore, FirestoreConfigStore, MemoryConfigStore};
use musicstream_rs::utils::config::{Settings, PLUGIN_ID, UPDATE_TOPIC};

/// User data shared across all commands
pub struct Data {
    pub settings: Settings,
    pub orchestrator: Arc<UpdateOrchestrator>,
    pub flags: Arc<MemoryFlagCache>,
}

// Manual Debug impl since the orchestrator holds trait objects
impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("orchestrator", &"UpdateOrchestrator")
            .field("flags", &self.flags)
            .finish()
    }
}

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

/// Register all slash commands
fn get_commands() -> Vec<poise::Command<Data, Error>> {
    vec![commands::streaming::streaming()]
}

/// Log change events; stands in for the workers that reload streaming state
fn spawn_change_listener(bus: &LocalBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) if event.topic == UPDATE_TOPIC => {
                    info!(guild_id = event.guild_id, "Music streaming settings changed");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Change listener lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "musicstream=info,musicstream_rs=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    info!("Starting Music Streaming Bot...");

    let http_client = reqwest::Client::builder()
        .user_agent("MusicStream-Bot/1.0")
        .build()
        .context("Failed to create HTTP client")?;

    let store: Arc<dyn ConfigStore>;
    let audit_sink: Arc<dyn AuditSink>;
    match FirebaseClient::from_file(http_client, &settings.firebase_key_path) {
        Ok(firebase) => {
            let firebase = Arc::new(firebase);
            info!("Firebase client initialized");
            store = Arc::new(FirestoreConfigStore::new(firebase.clone()));
            audit_sink = Arc::new(FirestoreAuditSink::new(firebase));
        }
        Err(e) => {
            warn!("Firebase unavailable ({:#}), settings will not survive a restart", e);
            store = Arc::new(MemoryConfigStore::new());
            audit_sink = Arc::new(LogAuditSink);
        }
    }

    let flags = Arc::new(MemoryFlagCache::new());
    let bus = LocalBus::new(64);
    spawn_change_listener(&bus);

    let orchestrator = Arc::new(UpdateOrchestrator::new(
        store,
        FeatureFlagProjector::new(flags.clone(), PLUGIN_ID),
        ChangeNotifier::new(Arc::new(bus)),
        AuditLogger::new(audit_sink, settings.audit_retry),
    ));

    let token = settings.discord_token.clone();

    // Setup framework
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: get_commands(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some("m!".into()),
                ..Default::default()
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!("Command error: {:?}", error);
                            let _ = ctx.say(format!("❌ Error: {}", error)).await;
                        }
                        err => {
                            error!("Framework error: {:?}", err);
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready! Registering commands...");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                info!("Commands registered successfully!");

                Ok(Data {
                    settings,
                    orchestrator,
                    flags,
                })
            })
        })
        .build();

    // Role/channel names come from the guild cache
    let intents = serenity::GatewayIntents::GUILDS | serenity::GatewayIntents::GUILD_MESSAGES;

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .context("Failed to create client")?;

    // Run with graceful shutdown
    let shard_manager = client.shard_manager.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to register Ctrl+C handler: {}", e);
            return;
        }
        info!("Shutting down...");
        shard_manager.shutdown_all().await;
    });

    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    info!("Goodbye!");
    Ok(())
}
