//! Lavalink event hooks and the logic that keeps a guild's queue moving.

use std::sync::Arc;

use lavalink_rs::hook;
use lavalink_rs::model::events;
use lavalink_rs::model::events::TrackEndReason;
use lavalink_rs::model::track::{TrackData, TrackLoadData};
use lavalink_rs::prelude::{LavalinkClient, PlayerContext};
use poise::serenity_prelude as serenity;
use rand::seq::SliceRandom;
use serenity::{CreateEmbed, CreateMessage};

use super::queue::Next;
use super::{format_length, MusicSession};
use crate::config::IDLE_DISCONNECT;
use crate::logging::{event, success};
use crate::utils::{log_err, BLURPLE, INFO};

/// Fallback when no radio can be built from the last track.
const AUTOPLAY_FALLBACK: &str = "ytsearch:lofi hip hop radio";

/// YouTube Music's endless mix for a video.
pub(crate) fn radio_url(identifier: &str) -> String {
    format!(
        "https://music.youtube.com/watch?v={}&list=RDAMVM{}",
        identifier, identifier
    )
}

/// The first entry of a radio mix is the seed itself; take the one after it.
pub(crate) fn radio_pick<T>(tracks: &[T]) -> Option<&T> {
    tracks.get(1)
}

#[hook]
pub(crate) async fn ready(_client: LavalinkClient, session_id: String, event: &events::Ready) {
    success!("Lavalink node ready (session {}, resumed: {})", session_id, event.resumed);
}

#[hook]
pub(crate) async fn track_start(client: LavalinkClient, _session_id: String, event: &events::TrackStart) {
    let Some(player) = client.get_player_context(event.guild_id) else {
        return;
    };
    let Ok(session) = player.data::<MusicSession>() else {
        return;
    };
    let channel = {
        let mut state = session.state.lock().await;
        state.cancel_disconnect();
        state.channel
    };
    event!(
        "Now playing in {}: {}",
        session.guild_id,
        event.track.info.title
    );

    let info = &event.track.info;
    let mut embed = CreateEmbed::new()
        .title("🎶 Now Playing")
        .colour(BLURPLE)
        .description(match &info.uri {
            Some(uri) => format!("[{}]({})", info.title, uri),
            None => info.title.clone(),
        })
        .field("Author", &info.author, true)
        .field("Length", format_length(info.length, info.is_stream), true);
    if let Some(artwork) = &info.artwork_url {
        embed = embed.thumbnail(artwork);
    }
    log_err(
        channel
            .send_message(&*session.http, CreateMessage::new().embed(embed))
            .await,
    );
}

#[hook]
pub(crate) async fn track_end(client: LavalinkClient, _session_id: String, event: &events::TrackEnd) {
    // play_now replaced it; whoever replaced it already moved the queue along
    if matches!(event.reason, TrackEndReason::Replaced) {
        return;
    }
    let Some(player) = client.get_player_context(event.guild_id) else {
        return;
    };
    let Ok(session) = player.data::<MusicSession>() else {
        return;
    };
    if let Err(e) = advance(&client, &player, session).await {
        tracing::warn!("Couldn't continue playback: {:?}", e);
    }
}

#[hook]
pub(crate) async fn track_exception(
    _client: LavalinkClient,
    _session_id: String,
    event: &events::TrackException,
) {
    tracing::warn!(
        "Track {} failed in guild {}: {:?}",
        event.track.info.title,
        event.guild_id.0,
        event.exception
    );
}

/// Starts the next track, an autoplay pick, or the idle timer.
pub(crate) async fn advance(
    client: &LavalinkClient,
    player: &PlayerContext,
    session: Arc<MusicSession>,
) -> anyhow::Result<()> {
    let next = session.state.lock().await.advance();
    match next {
        Next::Play(track) => {
            player.play_now(&track).await?;
        }
        Next::Autoplay { seed } => match autoplay_pick(client, &session, &seed).await {
            Some(track) => {
                session.state.lock().await.start(track.clone());
                player.play_now(&track).await?;
                announce(
                    &session,
                    CreateEmbed::new()
                        .title("📻 Autoplay")
                        .colour(INFO)
                        .description(format!("Queue is empty, playing **{}**", track.info.title)),
                )
                .await;
            }
            None => go_idle(client.clone(), session).await,
        },
        Next::Idle => go_idle(client.clone(), session).await,
    }
    Ok(())
}

async fn autoplay_pick(
    client: &LavalinkClient,
    session: &MusicSession,
    seed: &TrackData,
) -> Option<TrackData> {
    if seed.info.source_name == "youtube" {
        match client
            .load_tracks(session.guild_id, &radio_url(&seed.info.identifier))
            .await
        {
            Ok(loaded) => {
                if let Some(TrackLoadData::Playlist(mix)) = loaded.data {
                    if let Some(track) = radio_pick(&mix.tracks) {
                        return Some(track.clone());
                    }
                }
            }
            Err(e) => tracing::debug!("Radio lookup failed: {:?}", e),
        }
    }

    match client.load_tracks(session.guild_id, AUTOPLAY_FALLBACK).await {
        Ok(loaded) => match loaded.data {
            Some(TrackLoadData::Search(results)) => results.choose(&mut rand::thread_rng()).cloned(),
            _ => None,
        },
        Err(e) => {
            tracing::debug!("Autoplay fallback search failed: {:?}", e);
            None
        }
    }
}

async fn go_idle(client: LavalinkClient, session: Arc<MusicSession>) {
    let timer_session = session.clone();
    session
        .state
        .lock()
        .await
        .schedule_disconnect(IDLE_DISCONNECT, async move {
            timer_session.state.lock().await.detach_disconnect();
            leave(&client, &timer_session).await;
            announce(
                &timer_session,
                CreateEmbed::new()
                    .title("👋 Disconnected")
                    .colour(INFO)
                    .description("Left the voice channel due to inactivity."),
            )
            .await;
        });
}

/// Tears the session down: drops the Lavalink player and leaves the voice channel.
pub(crate) async fn leave(client: &LavalinkClient, session: &MusicSession) {
    if let Err(e) = client.delete_player(session.guild_id).await {
        tracing::warn!("Couldn't delete player for {}: {:?}", session.guild_id, e);
    }
    if let Err(e) = session.songbird.remove(session.guild_id).await {
        tracing::debug!("Couldn't leave voice in {}: {:?}", session.guild_id, e);
    }
    event!("Left voice in {}", session.guild_id);
}

async fn announce(session: &MusicSession, embed: CreateEmbed) {
    let channel = session.state.lock().await.channel;
    log_err(
        channel
            .send_message(&*session.http, CreateMessage::new().embed(embed))
            .await,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_url() {
        assert_eq!(
            radio_url("dQw4w9WgXcQ"),
            "https://music.youtube.com/watch?v=dQw4w9WgXcQ&list=RDAMVMdQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_radio_pick_skips_seed() {
        assert_eq!(radio_pick(&["seed", "next", "later"]), Some(&"next"));
        assert_eq!(radio_pick(&["seed"]), None);
        assert_eq!(radio_pick::<&str>(&[]), None);
    }
}
