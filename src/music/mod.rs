//! Music playback on a Lavalink node.
//!
//! Songbird only handles the voice gateway handshake; audio is streamed by Lavalink. Each guild
//! with an active player carries a [`MusicSession`] as the player's data, which is how the event
//! hooks find the queue again.

pub(crate) mod events;
pub(crate) mod queue;

use std::sync::Arc;

use lavalink_rs::model::events::Events;
use lavalink_rs::model::track::{TrackData, TrackLoadData};
use lavalink_rs::node::NodeBuilder;
use lavalink_rs::prelude::{LavalinkClient, NodeDistributionStrategy, PlayerContext};
use once_cell::sync::Lazy;
use poise::serenity_prelude as serenity;
use regex::Regex;
use serde::Deserialize;
use serenity::{ChannelId, CreateEmbed, CreateEmbedFooter, GuildId, UserId};
use songbird::Songbird;
use tokio::sync::Mutex;

use crate::config::{LavalinkConfig, EMBED_FIELD_LIMIT, QUEUE_PREVIEW};
use crate::error::{invalid, BotError};
use crate::logging::module;
use crate::sys::{human_bytes, human_duration};
use crate::utils::{
    fit_lines, info, plural, reply_embed, success, warning, Context, Error, BLURPLE,
};
use queue::GuildMusicState;

static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://\S+$").expect("valid regex"));

/// The Lavalink client plus the voice manager it rides on.
pub(crate) struct Music {
    pub(crate) lavalink: LavalinkClient,
    pub(crate) songbird: Arc<Songbird>,
    pub(crate) node: LavalinkConfig,
}

impl Music {
    pub(crate) async fn connect(node: LavalinkConfig, bot_id: UserId, songbird: Arc<Songbird>) -> Self {
        let hooks = Events {
            ready: Some(events::ready),
            track_start: Some(events::track_start),
            track_end: Some(events::track_end),
            track_exception: Some(events::track_exception),
            ..Default::default()
        };
        let builder = NodeBuilder {
            hostname: node.address(),
            is_ssl: node.ssl,
            events: Events::default(),
            password: node.password.clone(),
            user_id: bot_id.into(),
            session_id: None,
        };
        let lavalink =
            LavalinkClient::new(hooks, vec![builder], NodeDistributionStrategy::round_robin())
                .await;
        module!("Music connected to Lavalink at {}", node.address());
        Self {
            lavalink,
            songbird,
            node,
        }
    }
}

/// A guild's live playback session.
pub(crate) struct MusicSession {
    pub(crate) guild_id: GuildId,
    pub(crate) http: Arc<serenity::Http>,
    pub(crate) songbird: Arc<Songbird>,
    pub(crate) state: Mutex<GuildMusicState<TrackData>>,
}

/// `m:ss`, or `h:mm:ss` past an hour. Streams have no length.
pub(crate) fn format_length(ms: u64, is_stream: bool) -> String {
    if is_stream {
        return "🔴 Live".to_string();
    }
    let secs = ms / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

/// URLs go to Lavalink as-is, anything else is a YouTube search.
pub(crate) fn to_query(input: &str) -> String {
    let input = input.trim();
    if URL.is_match(input) {
        input.to_string()
    } else {
        format!("ytsearch:{}", input)
    }
}

/// The invoker must be in voice, and in the bot's channel if the bot is connected.
pub(crate) fn voice_rule(
    user: Option<ChannelId>,
    bot: Option<ChannelId>,
) -> Result<ChannelId, BotError> {
    match (user, bot) {
        (None, _) => Err(BotError::NotInVoice),
        (Some(u), Some(b)) if u != b => Err(BotError::WrongVoiceChannel),
        (Some(u), _) => Ok(u),
    }
}

/// (invoker's voice channel, bot's voice channel)
fn voice_channels(ctx: Context<'_>) -> Result<(Option<ChannelId>, Option<ChannelId>), Error> {
    let bot_id = ctx.cache().current_user().id;
    let guild = ctx
        .guild()
        .ok_or_else(|| BotError::External("This server isn't cached yet.".into()))?;
    let channel_of = |user: UserId| guild.voice_states.get(&user).and_then(|v| v.channel_id);
    Ok((channel_of(ctx.author().id), channel_of(bot_id)))
}

/// Check shared by the music commands.
async fn in_voice(ctx: Context<'_>) -> Result<bool, Error> {
    let (user, bot) = voice_channels(ctx)?;
    voice_rule(user, bot)?;
    Ok(true)
}

fn music(ctx: Context<'_>) -> Result<&Music, Error> {
    ctx.data()
        .music
        .as_ref()
        .ok_or_else(|| BotError::MusicDisabled.into())
}

/// The guild's active player and session.
fn session(ctx: Context<'_>) -> Result<(PlayerContext, Arc<MusicSession>), Error> {
    let guild_id = ctx.guild_id().ok_or_else(|| invalid("Server only."))?;
    let player = music(ctx)?
        .lavalink
        .get_player_context(guild_id)
        .ok_or(BotError::NotConnected)?;
    let session = player.data::<MusicSession>()?;
    Ok((player, session))
}

/// Joins `channel` and creates a player with a fresh session.
async fn join(ctx: Context<'_>, channel: ChannelId) -> Result<PlayerContext, Error> {
    let music = music(ctx)?;
    let guild_id = ctx.guild_id().ok_or_else(|| invalid("Server only."))?;
    let (connection, _call) = music.songbird.join_gateway(guild_id, channel).await?;

    let session = Arc::new(MusicSession {
        guild_id,
        http: ctx.serenity_context().http.clone(),
        songbird: music.songbird.clone(),
        state: Mutex::new(GuildMusicState::new(ctx.channel_id())),
    });
    let player = music
        .lavalink
        .create_player_context_with_data::<MusicSession>(guild_id, connection, session)
        .await?;
    player.set_volume(crate::config::DEFAULT_VOLUME).await?;
    crate::logging::event!("Joined voice channel {} in {}", channel, guild_id);
    Ok(player)
}

/// Plays a song or playlist, or adds it to the queue.
#[poise::command(
    prefix_command,
    guild_only,
    category = "Music",
    aliases("p"),
    check = "in_voice"
)]
pub(crate) async fn play(
    ctx: Context<'_>,
    #[description = "Song name or URL"]
    #[rest]
    query: String,
) -> Result<(), Error> {
    let music = music(ctx)?;
    let guild_id = ctx.guild_id().ok_or_else(|| invalid("Server only."))?;
    let (user_channel, _) = voice_channels(ctx)?;
    let user_channel = user_channel.ok_or(BotError::NotInVoice)?;
    ctx.defer_or_broadcast().await?;

    let player = match music.lavalink.get_player_context(guild_id) {
        Some(player) => player,
        None => join(ctx, user_channel).await?,
    };

    let loaded = music.lavalink.load_tracks(guild_id, &to_query(&query)).await?;
    let (tracks, label) = match loaded.data {
        Some(TrackLoadData::Track(track)) => {
            let label = track.info.title.clone();
            (vec![track], label)
        }
        Some(TrackLoadData::Search(mut results)) if !results.is_empty() => {
            let track = results.swap_remove(0);
            let label = track.info.title.clone();
            (vec![track], label)
        }
        Some(TrackLoadData::Playlist(playlist)) => {
            let label = format!(
                "{} from playlist **{}**",
                plural(playlist.tracks.len(), "track"),
                playlist.info.name
            );
            (playlist.tracks, label)
        }
        Some(TrackLoadData::Error(e)) => {
            return Err(BotError::External(format!("Couldn't load that: {}", e.message)).into())
        }
        _ => (Vec::new(), String::new()),
    };
    if tracks.is_empty() {
        reply_embed(ctx, warning("No Results", format!("Nothing found for `{}`.", query))).await?;
        return Ok(());
    }

    let session = player.data::<MusicSession>()?;
    let (idle, position) = {
        let mut state = session.state.lock().await;
        state.channel = ctx.channel_id();
        state.enqueue_all(tracks);
        (state.is_idle(), state.queue().len())
    };
    reply_embed(
        ctx,
        success(
            "Added to Queue",
            format!("{}\nPosition in queue: {}", label, position),
        ),
    )
    .await?;

    if idle {
        events::advance(&music.lavalink, &player, session).await?;
    }
    Ok(())
}

/// Skips the current song.
#[poise::command(
    prefix_command,
    guild_only,
    category = "Music",
    aliases("s"),
    check = "in_voice"
)]
pub(crate) async fn skip(ctx: Context<'_>) -> Result<(), Error> {
    let (player, session) = session(ctx)?;
    let current = session
        .state
        .lock()
        .await
        .current()
        .map(|t| t.info.title.clone());
    let Some(title) = current else {
        reply_embed(ctx, warning("Nothing Playing", "There's nothing to skip.")).await?;
        return Ok(());
    };
    // the track end hook starts the next one
    player.stop_now().await?;
    reply_embed(ctx, success("Skipped", format!("Skipped **{}**", title))).await?;
    Ok(())
}

/// Leaves the voice channel and clears the queue.
#[poise::command(
    prefix_command,
    guild_only,
    category = "Music",
    aliases("dc", "leave"),
    check = "in_voice"
)]
pub(crate) async fn disconnect(ctx: Context<'_>) -> Result<(), Error> {
    let (_player, session) = session(ctx)?;
    {
        let mut state = session.state.lock().await;
        state.cancel_disconnect();
        state.stop();
    }
    events::leave(&music(ctx)?.lavalink, &session).await;
    reply_embed(ctx, success("Disconnected", "Left the voice channel.")).await?;
    Ok(())
}

/// Pauses playback.
#[poise::command(prefix_command, guild_only, category = "Music", check = "in_voice")]
pub(crate) async fn pause(ctx: Context<'_>) -> Result<(), Error> {
    let (player, _) = session(ctx)?;
    if player.get_player().await?.paused {
        reply_embed(ctx, warning("Already Paused", "Playback is already paused.")).await?;
        return Ok(());
    }
    player.set_pause(true).await?;
    reply_embed(ctx, success("Paused", "Playback paused.")).await?;
    Ok(())
}

/// Resumes playback.
#[poise::command(prefix_command, guild_only, category = "Music", check = "in_voice")]
pub(crate) async fn resume(ctx: Context<'_>) -> Result<(), Error> {
    let (player, _) = session(ctx)?;
    if !player.get_player().await?.paused {
        reply_embed(ctx, warning("Not Paused", "Playback isn't paused.")).await?;
        return Ok(());
    }
    player.set_pause(false).await?;
    reply_embed(ctx, success("Resumed", "Playback resumed.")).await?;
    Ok(())
}

/// Stops playback and clears the queue.
#[poise::command(prefix_command, guild_only, category = "Music", check = "in_voice")]
pub(crate) async fn stop(ctx: Context<'_>) -> Result<(), Error> {
    let (player, session) = session(ctx)?;
    session.state.lock().await.stop();
    player.stop_now().await?;
    reply_embed(ctx, success("Stopped", "Stopped playback and cleared the queue.")).await?;
    Ok(())
}

/// Shows the queue.
#[poise::command(
    prefix_command,
    guild_only,
    category = "Music",
    aliases("q"),
    check = "in_voice"
)]
pub(crate) async fn queue(ctx: Context<'_>) -> Result<(), Error> {
    let (_player, session) = session(ctx)?;
    let state = session.state.lock().await;
    let Some(current) = state.current() else {
        drop(state);
        reply_embed(ctx, info("Queue", "Nothing is playing.")).await?;
        return Ok(());
    };

    let mut embed = CreateEmbed::new()
        .title("🎵 Queue")
        .colour(BLURPLE)
        .field(
            "Now Playing",
            format!(
                "{} `[{}]`",
                current.info.title,
                format_length(current.info.length, current.info.is_stream)
            ),
            false,
        );
    let upcoming: Vec<String> = state
        .queue()
        .iter()
        .take(QUEUE_PREVIEW)
        .enumerate()
        .map(|(i, t)| {
            format!(
                "`{}.` {} `[{}]`",
                i + 1,
                t.info.title,
                format_length(t.info.length, t.info.is_stream)
            )
        })
        .collect();
    if !upcoming.is_empty() {
        embed = embed.field("Up Next", fit_lines(&upcoming, EMBED_FIELD_LIMIT), false);
    }
    embed = embed.footer(CreateEmbedFooter::new(format!(
        "{} in queue | Volume {}% | Autoplay {}",
        plural(state.queue().len(), "track"),
        state.volume(),
        if state.autoplay() { "on" } else { "off" }
    )));
    drop(state);
    reply_embed(ctx, embed).await?;
    Ok(())
}

/// Shows or sets the volume (0 to 150).
#[poise::command(prefix_command, guild_only, category = "Music", check = "in_voice")]
pub(crate) async fn volume(
    ctx: Context<'_>,
    #[description = "New volume"] level: Option<u16>,
) -> Result<(), Error> {
    let (player, session) = session(ctx)?;
    let Some(level) = level else {
        let current = session.state.lock().await.volume();
        reply_embed(ctx, info("Volume", format!("Volume is {}%.", current))).await?;
        return Ok(());
    };
    session.state.lock().await.set_volume(level).map_err(invalid)?;
    player.set_volume(level).await?;
    reply_embed(ctx, success("Volume", format!("Volume set to {}%.", level))).await?;
    Ok(())
}

/// Toggles autoplay for when the queue runs out.
#[poise::command(prefix_command, guild_only, category = "Music", check = "in_voice")]
pub(crate) async fn autoplay(ctx: Context<'_>) -> Result<(), Error> {
    let (_player, session) = session(ctx)?;
    let on = session.state.lock().await.toggle_autoplay();
    reply_embed(
        ctx,
        success(
            "Autoplay",
            format!("Autoplay is now **{}**.", if on { "on" } else { "off" }),
        ),
    )
    .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NodeStats {
    pub(crate) players: u64,
    pub(crate) playing_players: u64,
    /// Milliseconds.
    pub(crate) uptime: u64,
    pub(crate) memory: NodeMemory,
    pub(crate) cpu: NodeCpu,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NodeMemory {
    pub(crate) used: u64,
    pub(crate) allocated: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NodeCpu {
    pub(crate) cores: u64,
    pub(crate) system_load: f64,
    pub(crate) lavalink_load: f64,
}

async fn node_stats(http: &reqwest::Client, node: &LavalinkConfig) -> Result<NodeStats, reqwest::Error> {
    http.get(format!("{}/v4/stats", node.rest_url()))
        .header("Authorization", &node.password)
        .send()
        .await?
        .error_for_status()?
        .json::<NodeStats>()
        .await
}

/// Shows Lavalink node statistics.
#[poise::command(prefix_command, category = "Music")]
pub(crate) async fn node(ctx: Context<'_>) -> Result<(), Error> {
    let music = music(ctx)?;
    let stats = node_stats(&ctx.data().http, &music.node)
        .await
        .map_err(|e| BotError::External(format!("Couldn't reach the Lavalink node: {}", e)))?;

    let embed = CreateEmbed::new()
        .title("🎛️ Lavalink Node")
        .colour(BLURPLE)
        .field("Players", format!("{} ({} playing)", stats.players, stats.playing_players), true)
        .field(
            "Uptime",
            human_duration(std::time::Duration::from_millis(stats.uptime)),
            true,
        )
        .field(
            "Memory",
            format!("{} / {}", human_bytes(stats.memory.used), human_bytes(stats.memory.allocated)),
            true,
        )
        .field(
            "CPU",
            format!(
                "{} cores | system {:.1}% | lavalink {:.1}%",
                stats.cpu.cores,
                stats.cpu.system_load * 100.0,
                stats.cpu.lavalink_load * 100.0
            ),
            false,
        );
    reply_embed(ctx, embed).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_length() {
        assert_eq!(format_length(65_000, false), "1:05");
        assert_eq!(format_length(3_725_000, false), "1:02:05");
        assert_eq!(format_length(0, true), "🔴 Live");
    }

    #[test]
    fn test_to_query() {
        assert_eq!(to_query("never gonna give you up"), "ytsearch:never gonna give you up");
        assert_eq!(
            to_query(" https://youtu.be/dQw4w9WgXcQ "),
            "https://youtu.be/dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_voice_rule() {
        let a = ChannelId::new(1);
        let b = ChannelId::new(2);
        assert!(matches!(voice_rule(None, Some(a)), Err(BotError::NotInVoice)));
        assert!(matches!(voice_rule(Some(a), Some(b)), Err(BotError::WrongVoiceChannel)));
        assert_eq!(voice_rule(Some(a), Some(a)).unwrap(), a);
        assert_eq!(voice_rule(Some(b), None).unwrap(), b);
    }

    #[test]
    fn test_node_stats_shape() {
        let raw = r#"{
            "players": 3, "playingPlayers": 1, "uptime": 123456,
            "memory": {"free": 1, "used": 2048, "allocated": 4096, "reservable": 8192},
            "cpu": {"cores": 4, "systemLoad": 0.25, "lavalinkLoad": 0.05},
            "frameStats": null
        }"#;
        let stats: NodeStats = serde_json::from_str(raw).unwrap();
        assert_eq!(stats.playing_players, 1);
        assert_eq!(stats.memory.allocated, 4096);
        assert_eq!(stats.cpu.cores, 4);
    }
}
