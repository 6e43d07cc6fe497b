mod ai;
mod avatar;
mod config;
mod confirm;
mod db;
mod eng;
mod error;
mod fun;
mod help;
mod logging;
mod moderation;
mod modping;
mod music;
mod ping;
mod power;
mod prefix;
mod purge;
mod sys;
mod utils;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use anyhow::Context as _;
use poise::serenity_prelude as serenity;

use crate::config::Config;
use crate::logging::{critical, database, module, success, system};
use crate::utils::{Command, Data, Error};

fn commands() -> Vec<Command> {
    vec![
        avatar::avatar(),
        fun::ball(),
        fun::love(),
        moderation::kick(),
        moderation::ban(),
        moderation::unban(),
        moderation::timeout(),
        moderation::untimeout(),
        moderation::warn(),
        moderation::case(),
        moderation::modlog(),
        music::play(),
        music::skip(),
        music::disconnect(),
        music::pause(),
        music::resume(),
        music::stop(),
        music::queue(),
        music::volume(),
        music::autoplay(),
        music::node(),
        help::help(),
        sys::stats(),
        sys::uptime(),
        prefix::prefix(),
        purge::purge(),
        purge::hardpurge(),
        eng::eng(),
        ping::ping(),
        power::restart(),
        power::shutdown(),
        modping::modping(),
        modping::helprequest(),
    ]
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            module!("Loaded {} commands", framework.options().commands.len());
            success!("{} is now online! ✅", data_about_bot.user.name);
            ctx.set_activity(Some(serenity::ActivityData::listening(format!(
                "{}help",
                config::DEFAULT_PREFIX
            ))));
        }
        serenity::FullEvent::GuildDelete { incomplete, .. } if !incomplete.unavailable => {
            let removed = data.prefixes.clear(incomplete.id).await?;
            if removed > 0 {
                database!("Dropped {} prefixes of departed guild {}", removed, incomplete.id);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Everything that can be opened before the gateway connects.
struct Stores {
    prefixes: prefix::PrefixStore,
    cases: moderation::CaseStore,
    vocab: eng::VocabStore,
    modping: modping::ModPingStore,
    words: Vec<eng::words::DailyWord>,
}

async fn open_stores(config: &Config) -> anyhow::Result<Stores> {
    let dir = &config.data_dir;
    Ok(Stores {
        prefixes: prefix::PrefixStore::connect(db::open(dir, "prefixes.db").await?).await?,
        cases: moderation::CaseStore::connect(db::open(dir, "moderation.db").await?).await?,
        vocab: eng::VocabStore::connect(db::open(dir, "vocabulary.db").await?).await?,
        modping: modping::ModPingStore::connect(db::open(dir, "help_requests.db").await?).await?,
        words: eng::words::load(dir).await?,
    })
}

async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    logging::header(concat!("lazybot v", env!("CARGO_PKG_VERSION")));

    let stores = open_stores(&config).await?;
    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()?;
    let ai = ai::AiClient::from_config(http.clone(), &config.ai);
    if ai.is_none() {
        tracing::warn!("GEMINI_API_KEY is not set, AI features are disabled");
    }
    if config.lavalink.is_none() {
        tracing::warn!("No [lavalink] section in the config, music is disabled");
    }

    let songbird = songbird::Songbird::serenity();
    let owners: HashSet<serenity::UserId> = config
        .owners
        .iter()
        .map(|&id| serenity::UserId::new(id))
        .collect();
    let token = config.token.clone();

    let setup_songbird = songbird.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: None,
                stripped_dynamic_prefix: Some(prefix::resolve),
                case_insensitive_commands: true,
                mention_as_prefix: true,
                ..Default::default()
            },
            on_error: |error| Box::pin(error::on_error(error)),
            pre_command: |ctx| {
                Box::pin(async move {
                    tracing::debug!(
                        "{} ran {}",
                        ctx.author().name,
                        ctx.command().qualified_name
                    );
                })
            },
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            owners,
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                module!("Registered slash commands");

                let music = match config.lavalink.clone() {
                    Some(node) => {
                        Some(music::Music::connect(node, ready.user.id, setup_songbird).await)
                    }
                    None => None,
                };
                Ok(Data {
                    config,
                    started: Instant::now(),
                    started_at: SystemTime::now(),
                    prefixes: stores.prefixes,
                    cases: stores.cases,
                    vocab: stores.vocab,
                    modping: stores.modping,
                    ai,
                    words: stores.words,
                    music,
                    http,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS
        | serenity::GatewayIntents::GUILD_VOICE_STATES
        | serenity::GatewayIntents::GUILD_WEBHOOKS
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::DIRECT_MESSAGE_REACTIONS
        | serenity::GatewayIntents::MESSAGE_CONTENT;
    let mut client = serenity::ClientBuilder::new(&token, intents)
        .voice_manager_arc(songbird)
        .framework(framework)
        .await
        .context("could not build the Discord client")?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            system!("Received Ctrl-C, shutting down");
            shard_manager.shutdown_all().await;
        }
    });

    client.start_autosharded().await?;
    system!("Disconnected from Discord");
    Ok(())
}

fn main() {
    // before the runtime spawns its workers, so the local offset can still be read
    logging::init();
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(anyhow::Error::from)
        .and_then(|runtime| runtime.block_on(run()));
    if let Err(e) = result {
        critical!("Fatal error: {:?}", e);
        std::process::exit(1);
    }
}
