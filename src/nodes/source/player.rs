//! One-shot player for decoded audio.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::decode::DecodedAudio;
use crate::node::{AudioNode, Buffer, Input, ProcessContext};
use crate::session::SessionId;

/// Messages to control a [`SamplePlayer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerMessage {
    /// Begin playback from the start. Ignored once the player has started.
    Start,
    /// Stop for good. No end notification is delivered afterwards.
    Stop,
}

/// Reports the natural end of a playback session, at most once.
pub struct EndNotifier {
    session: SessionId,
    tx: UnboundedSender<SessionId>,
}

impl EndNotifier {
    pub fn new(session: SessionId, tx: UnboundedSender<SessionId>) -> Self {
        Self { session, tx }
    }

    fn notify(self) {
        // the receiver is gone only when the session manager is; nothing to tell
        let _ = self.tx.send(self.session);
    }
}

/// Plays a shared, read-only [`DecodedAudio`] once from start to end.
///
/// The player starts silent and waits for [`PlayerMessage::Start`]. It reports
/// its native sample rate, so the context resamples it when the device runs
/// at a different rate. When the last frame has been written it fires its
/// [`EndNotifier`] and outputs silence from then on.
pub struct SamplePlayer {
    audio: Arc<DecodedAudio>,
    position: usize,
    playing: bool,
    started: bool,
    on_end: Option<EndNotifier>,
}

impl SamplePlayer {
    pub fn new(audio: Arc<DecodedAudio>) -> Self {
        Self {
            audio,
            position: 0,
            playing: false,
            started: false,
            on_end: None,
        }
    }

    /// Deliver the end of playback to `notifier`.
    pub fn with_end_notifier(mut self, notifier: EndNotifier) -> Self {
        self.on_end = Some(notifier);
        self
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.audio.channels()
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    fn finish(&mut self) {
        self.playing = false;
        if let Some(notifier) = self.on_end.take() {
            notifier.notify();
        }
    }
}

impl AudioNode for SamplePlayer {
    type Message = PlayerMessage;

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        messages: impl Iterator<Item = PlayerMessage>,
        _inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                PlayerMessage::Start if !self.started => {
                    self.started = true;
                    self.playing = true;
                }
                PlayerMessage::Start => {}
                PlayerMessage::Stop => {
                    self.on_end = None;
                    self.playing = false;
                }
            }
        }

        if !self.playing {
            outputs.iter_mut().for_each(Buffer::silence);
            return;
        }

        let samples = self.audio.samples();
        let channels = self.audio.channels();

        for i in 0..outputs.first().map_or(0, |b| b.len()) {
            if self.position >= samples.len() {
                for buffer in outputs.iter_mut() {
                    buffer[i..].iter_mut().for_each(|s| *s = 0.0);
                }
                self.finish();
                return;
            }

            for (ch, buffer) in outputs.iter_mut().enumerate() {
                buffer[i] = samples.get(self.position + ch % channels).copied().unwrap_or(0.0);
            }
            self.position += channels;
        }

        if self.position >= samples.len() {
            self.finish();
        }
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        self.audio.channels()
    }

    #[inline]
    fn native_sample_rate(&self) -> Option<u32> {
        Some(self.audio.sample_rate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BLOCK_SIZE;
    use tokio::sync::mpsc;

    fn ctx() -> ProcessContext {
        ProcessContext { sample_rate: 48000, buffer_size: BLOCK_SIZE }
    }

    fn run(player: &mut SamplePlayer, msgs: Vec<PlayerMessage>) -> Buffer {
        let mut out = [Buffer::SILENT];
        player.process(&ctx(), msgs.into_iter(), &[], &mut out);
        let [out] = out;
        out
    }

    #[test]
    fn silent_until_started_then_notifies_once() {
        let audio = Arc::new(DecodedAudio::new(vec![0.5; 100], 1, 48000));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = SamplePlayer::new(audio).with_end_notifier(EndNotifier::new(SessionId(7), tx));

        assert_eq!(run(&mut player, vec![])[0], 0.0);

        let first = run(&mut player, vec![PlayerMessage::Start]);
        assert!(first.iter().all(|&s| s == 0.5));
        assert!(rx.try_recv().is_err());

        let second = run(&mut player, vec![]);
        assert_eq!(second[100 - BLOCK_SIZE - 1], 0.5);
        assert_eq!(second[100 - BLOCK_SIZE], 0.0);
        assert_eq!(rx.try_recv().ok(), Some(SessionId(7)));

        run(&mut player, vec![PlayerMessage::Start]);
        assert!(rx.try_recv().is_err());
        assert!(!player.is_playing());
    }

    #[test]
    fn stop_suppresses_notification() {
        let audio = Arc::new(DecodedAudio::new(vec![0.5; 1000], 1, 48000));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = SamplePlayer::new(audio).with_end_notifier(EndNotifier::new(SessionId(1), tx));

        run(&mut player, vec![PlayerMessage::Start]);
        let out = run(&mut player, vec![PlayerMessage::Stop]);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn exact_block_length_ends_in_that_block() {
        let audio = Arc::new(DecodedAudio::new(vec![0.25; BLOCK_SIZE * 2], 2, 44100));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = SamplePlayer::new(audio).with_end_notifier(EndNotifier::new(SessionId(2), tx));
        assert_eq!(player.native_sample_rate(), Some(44100));

        let mut out = [Buffer::SILENT, Buffer::SILENT];
        player.process(&ctx(), core::iter::once(PlayerMessage::Start), &[], &mut out);
        assert!(out[1].iter().all(|&s| s == 0.25));
        assert_eq!(rx.try_recv().ok(), Some(SessionId(2)));
    }
}
