//! Per-guild playback state: the queue, volume, autoplay, and the idle-disconnect timer.
//!
//! Generic over the track type so the queue logic doesn't need a Lavalink node to exercise.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use poise::serenity_prelude::ChannelId;
use tokio::task::JoinHandle;

use crate::config::{DEFAULT_VOLUME, MAX_VOLUME};

/// What to do once the current track is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Next<T> {
    Play(T),
    /// Queue is dry and autoplay is on; find something like `seed`.
    Autoplay { seed: T },
    Idle,
}

#[derive(Debug)]
pub(crate) struct GuildMusicState<T> {
    queue: VecDeque<T>,
    current: Option<T>,
    /// Most recently started track, kept after it ends to seed autoplay.
    last: Option<T>,
    volume: u16,
    autoplay: bool,
    /// Where announcements go.
    pub(crate) channel: ChannelId,
    disconnect: Option<JoinHandle<()>>,
}

impl<T: Clone> GuildMusicState<T> {
    pub(crate) fn new(channel: ChannelId) -> Self {
        Self {
            queue: VecDeque::new(),
            current: None,
            last: None,
            volume: DEFAULT_VOLUME,
            autoplay: false,
            channel,
            disconnect: None,
        }
    }

    pub(crate) fn enqueue_all(&mut self, tracks: impl IntoIterator<Item = T>) -> usize {
        let before = self.queue.len();
        self.queue.extend(tracks);
        self.queue.len() - before
    }

    pub(crate) fn queue(&self) -> &VecDeque<T> {
        &self.queue
    }

    pub(crate) fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    /// Nothing is playing, so a new track should start right away.
    pub(crate) fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    /// Moves on to the next queued track.
    pub(crate) fn advance(&mut self) -> Next<T> {
        if let Some(next) = self.queue.pop_front() {
            self.start(next.clone());
            return Next::Play(next);
        }
        self.current = None;
        match (&self.last, self.autoplay) {
            (Some(seed), true) => Next::Autoplay { seed: seed.clone() },
            _ => Next::Idle,
        }
    }

    /// Marks `track` as playing. Used for tracks that didn't come off the queue.
    pub(crate) fn start(&mut self, track: T) {
        self.last = Some(track.clone());
        self.current = Some(track);
    }

    /// Drops the queue and forgets the current track.
    pub(crate) fn stop(&mut self) {
        self.queue.clear();
        self.current = None;
    }

    pub(crate) fn volume(&self) -> u16 {
        self.volume
    }

    pub(crate) fn set_volume(&mut self, volume: u16) -> Result<(), String> {
        if volume > MAX_VOLUME {
            return Err(format!("Volume must be between 0 and {}.", MAX_VOLUME));
        }
        self.volume = volume;
        Ok(())
    }

    pub(crate) fn autoplay(&self) -> bool {
        self.autoplay
    }

    pub(crate) fn toggle_autoplay(&mut self) -> bool {
        self.autoplay = !self.autoplay;
        self.autoplay
    }

    /// Runs `leave` after `after` unless cancelled first. Replaces any pending timer.
    pub(crate) fn schedule_disconnect<F>(&mut self, after: Duration, leave: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel_disconnect();
        self.disconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            leave.await;
        }));
    }

    /// Returns whether a timer was pending.
    pub(crate) fn cancel_disconnect(&mut self) -> bool {
        match self.disconnect.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn disconnect_pending(&self) -> bool {
        self.disconnect.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Hands the timer over without aborting it; the timer calls this on itself before tearing
    /// the session down.
    pub(crate) fn detach_disconnect(&mut self) {
        self.disconnect = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn state() -> GuildMusicState<&'static str> {
        GuildMusicState::new(ChannelId::new(1))
    }

    fn flag() -> (Arc<AtomicBool>, impl Future<Output = ()> + Send + 'static) {
        let fired = Arc::new(AtomicBool::new(false));
        let setter = fired.clone();
        (fired, async move { setter.store(true, Ordering::SeqCst) })
    }

    #[test]
    fn test_plays_in_order() {
        let mut s = state();
        assert!(s.is_idle());
        s.enqueue_all(["a", "b"]);
        assert_eq!(s.advance(), Next::Play("a"));
        assert_eq!(s.current(), Some(&"a"));
        assert_eq!(s.advance(), Next::Play("b"));
        assert!(s.queue().is_empty());
    }

    #[tokio::test]
    async fn test_drained_queue_goes_idle_and_schedules_disconnect() {
        tokio::time::pause();
        let mut s = state();
        let n = s.enqueue_all(["a", "b", "c"]);
        let mut last = Next::Idle;
        for _ in 0..=n {
            last = s.advance();
        }
        assert_eq!(last, Next::Idle);
        assert!(s.queue().is_empty());
        assert!(s.is_idle());

        let (fired, leave) = flag();
        s.schedule_disconnect(Duration::from_secs(30), leave);
        assert!(s.disconnect_pending());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(!s.disconnect_pending());
    }

    #[tokio::test]
    async fn test_new_track_cancels_disconnect() {
        tokio::time::pause();
        let mut s = state();
        let (fired, leave) = flag();
        s.schedule_disconnect(Duration::from_secs(30), leave);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(s.cancel_disconnect());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!fired.load(Ordering::SeqCst));
        assert!(!s.cancel_disconnect());
    }

    #[test]
    fn test_autoplay_uses_last_track_as_seed() {
        let mut s = state();
        assert!(s.toggle_autoplay());
        // nothing has played yet, so there's nothing to seed from
        assert_eq!(s.advance(), Next::Idle);
        s.enqueue_all(["a"]);
        s.advance();
        assert_eq!(s.advance(), Next::Autoplay { seed: "a" });
        assert!(s.is_idle());
        s.start("radio");
        assert_eq!(s.advance(), Next::Autoplay { seed: "radio" });
    }

    #[test]
    fn test_stop_clears() {
        let mut s = state();
        s.enqueue_all(["a", "b", "c"]);
        s.advance();
        s.stop();
        assert!(s.queue().is_empty());
        assert!(s.is_idle());
    }

    #[test]
    fn test_volume_bounds() {
        let mut s = state();
        assert_eq!(s.volume(), 50);
        assert!(s.set_volume(150).is_ok());
        assert!(s.set_volume(0).is_ok());
        assert!(s.set_volume(151).is_err());
        assert_eq!(s.volume(), 0);
    }
}
