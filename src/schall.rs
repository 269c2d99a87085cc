//! High-level sampler API

use std::rc::Rc;

use delegate::delegate;
use tracing::{debug, warn};

use crate::cache::{BufferCache, LoadReport, LoadStatus};
use crate::config::{Config, Sound};
use crate::context::{AudioRoot, ContextState};
use crate::decode::{Decode, SymphoniaDecoder};
use crate::device::OutputDevice;
use crate::error::{Error, Result};
use crate::fetch::{Fetch, Fetcher};
use crate::session::{SessionId, Sessions};

/// A sample player: a bank of sounds, the cache they are decoded into, the
/// audio context they play through, and the sessions currently playing.
///
/// # Example
///
/// ```no_run
/// # async fn run() -> schall::Result<()> {
/// use schall::{OfflineDevice, Schall};
///
/// let mut schall = Schall::new(OfflineDevice::new(48000, 2));
/// schall.load(["sounds/kick.wav"]).await;
///
/// schall.ensure_context()?;
/// schall.play("sounds/kick.wav").await?;
///
/// // once per frame
/// schall.tick();
/// # Ok(())
/// # }
/// ```
///
/// The cache is shared through an `Rc` so a load can run alongside the
/// render loop on the same task:
///
/// ```no_run
/// # async fn run(mut schall: schall::Schall) {
/// let cache = schall.cache();
/// let load = cache.load(["sounds/snare.ogg"]);
/// let render = async {
///     loop {
///         schall.tick();
///         tokio::time::sleep(std::time::Duration::from_millis(10)).await;
///     }
/// };
/// tokio::select! {
///     _ = load => {}
///     _ = render => {}
/// }
/// # }
/// ```
pub struct Schall<F = Fetcher, D = SymphoniaDecoder> {
    cache: Rc<BufferCache<F, D>>,
    root: AudioRoot,
    sessions: Sessions,
    bank: Vec<Sound>,
    /// Applied to the first context created.
    initial_volume: Option<f32>,
}

impl Schall {
    /// A sampler with an empty bank, fetching over HTTP or from disk.
    pub fn new(device: impl OutputDevice + 'static) -> Self {
        Self::with_cache(BufferCache::default(), device)
    }

    /// A sampler set up from a configuration file's bank, volume and output
    /// settings. The device itself is chosen by the caller.
    pub fn from_config(config: &Config, device: impl OutputDevice + 'static) -> Self {
        Self {
            cache: Rc::new(BufferCache::default()),
            root: AudioRoot::new(device).with_lead_blocks(config.output.lead_blocks),
            sessions: Sessions::new(),
            bank: config.sounds.clone(),
            initial_volume: config.volume,
        }
    }
}

impl<F: Fetch, D: Decode> Schall<F, D> {
    pub fn with_cache(cache: BufferCache<F, D>, device: impl OutputDevice + 'static) -> Self {
        Self {
            cache: Rc::new(cache),
            root: AudioRoot::new(device),
            sessions: Sessions::new(),
            bank: Vec::new(),
            initial_volume: None,
        }
    }

    pub fn with_bank(mut self, bank: Vec<Sound>) -> Self {
        self.bank = bank;
        self
    }

    pub fn bank(&self) -> &[Sound] {
        &self.bank
    }

    pub fn cache(&self) -> Rc<BufferCache<F, D>> {
        Rc::clone(&self.cache)
    }

    pub fn root(&self) -> &AudioRoot {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut AudioRoot {
        &mut self.root
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    delegate! {
        to self.root {
            /// Set the shared gain, clamped to `[0, 1]`. No-op without a context.
            pub fn set_volume(&mut self, volume: f32);
            pub fn volume(&self) -> Option<f32>;
            pub fn state(&self) -> Option<ContextState>;
        }
        to self.cache {
            /// True while any load is still running.
            pub fn is_loading(&self) -> bool;
        }
    }

    /// Create the audio context if there is none.
    pub fn ensure_context(&mut self) -> Result<()> {
        self.root.ensure_context()?;
        if let Some(volume) = self.initial_volume.take() {
            self.root.set_volume(volume);
        }
        Ok(())
    }

    /// Stop everything and close the context.
    pub async fn close(&mut self) {
        self.sessions.stop_all(&mut self.root);
        self.root.close_context().await;
    }

    pub async fn resume(&mut self) -> Result<()> {
        self.root.resume_context().await
    }

    pub async fn suspend(&mut self) -> Result<()> {
        self.root.suspend_context().await
    }

    /// Fetch and decode sounds into the cache. See [`BufferCache::load`].
    pub async fn load<I, S>(&self, urls: I) -> LoadReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.cache.load(urls).await
    }

    /// Load the first `count` sounds of the bank, or all of them.
    pub async fn preload(&self, count: Option<usize>) -> LoadReport {
        let count = count.unwrap_or(self.bank.len());
        let report = self.cache.load(self.bank.iter().take(count).map(|s| s.url.as_str())).await;
        debug!(loaded = report.loaded.len(), failed = report.failed.len(), "preload finished");
        report
    }

    /// Play a loaded sound from its beginning.
    pub async fn play(&mut self, url: &str) -> Result<SessionId> {
        let Some(audio) = self.cache.get(url) else {
            warn!(url, "sound not loaded, not playing");
            return Err(Error::NotLoaded(url.to_owned()));
        };
        self.sessions.play(&mut self.root, &audio).await
    }

    /// Play several sounds at once. Sounds that are not loaded are skipped;
    /// returns how many started.
    pub async fn play_many<I, S>(&mut self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut audios = Vec::new();
        for url in urls {
            match self.cache.get(url.as_ref()) {
                Some(audio) => audios.push(audio),
                None => warn!(url = url.as_ref(), "sound not loaded, skipping"),
            }
        }
        self.sessions.play_many(&mut self.root, audios.iter()).await
    }

    pub fn stop_all(&mut self) {
        self.sessions.stop_all(&mut self.root);
    }

    /// Render what the wall clock says is due and retire finished sessions.
    /// Call regularly, e.g. once per display frame. Returns the number of
    /// sessions that ended.
    pub fn tick(&mut self) -> usize {
        if let Some(context) = self.root.context_mut() {
            context.pump();
        }
        self.sessions.reap(&mut self.root)
    }

    /// Load status of every sound in the bank, in bank order.
    pub fn status(&self) -> Vec<(&Sound, LoadStatus)> {
        self.bank.iter().map(|s| (s, self.cache.status(&s.url))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodedAudio;
    use crate::device::OfflineDevice;

    /// Serves the url itself; "missing" urls fail.
    struct Echo;

    impl Fetch for Echo {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            if url.contains("missing") {
                return Err(Error::Fetch { url: url.to_owned(), reason: "404".into() });
            }
            Ok(url.as_bytes().to_vec())
        }
    }

    /// One 48kHz mono frame per byte.
    struct Frames;

    impl Decode for Frames {
        async fn decode(&self, bytes: Vec<u8>, _hint: Option<&str>) -> Result<DecodedAudio> {
            Ok(DecodedAudio::new(vec![0.25; bytes.len() * 64], 1, 48000))
        }
    }

    fn bank() -> Vec<Sound> {
        ["kick.wav", "snare.wav", "missing.wav"]
            .into_iter()
            .map(|url| Sound { title: url.trim_end_matches(".wav").to_owned(), url: url.to_owned() })
            .collect()
    }

    fn schall() -> Schall<Echo, Frames> {
        Schall::with_cache(BufferCache::new(Echo, Frames), OfflineDevice::new(48000, 2)).with_bank(bank())
    }

    #[tokio::test]
    async fn preload_reports_status_per_sound() {
        let schall = schall();
        assert!(schall.status().iter().all(|(_, s)| *s == LoadStatus::Absent));

        schall.preload(Some(1)).await;
        let status = schall.status();
        assert!(matches!(status[0].1, LoadStatus::Loaded(_)));
        assert_eq!(status[1].1, LoadStatus::Absent);

        schall.preload(None).await;
        let status = schall.status();
        assert!(matches!(status[1].1, LoadStatus::Loaded(_)));
        assert_eq!(status[2].1, LoadStatus::Failed);
        assert!(!schall.is_loading());
    }

    #[tokio::test]
    async fn playing_requires_a_loaded_sound() {
        let mut schall = schall();
        schall.ensure_context().unwrap();

        assert!(matches!(schall.play("kick.wav").await, Err(Error::NotLoaded(_))));
        schall.load(["kick.wav"]).await;
        schall.play("kick.wav").await.unwrap();
        assert_eq!(schall.sessions().len(), 1);

        assert_eq!(schall.play_many(["kick.wav", "snare.wav", "kick.wav"]).await, 2);
        assert_eq!(schall.sessions().len(), 3);

        schall.stop_all();
        assert!(schall.sessions().is_empty());
    }

    #[tokio::test]
    async fn sessions_end_through_tick() {
        let mut schall = schall();
        schall.ensure_context().unwrap();
        schall.load(["kick.wav"]).await;
        schall.play("kick.wav").await.unwrap();

        // 8 bytes of url, 64 frames each
        schall.root_mut().context_mut().unwrap().render(9);
        assert_eq!(schall.tick(), 1);
        assert!(schall.sessions().is_empty());
    }

    #[tokio::test]
    async fn close_stops_playback() {
        let mut schall = schall();
        schall.ensure_context().unwrap();
        schall.load(["snare.wav"]).await;
        schall.play("snare.wav").await.unwrap();

        schall.close().await;
        assert!(schall.sessions().is_empty());
        assert_eq!(schall.state(), None);
        assert!(matches!(schall.play("snare.wav").await, Err(Error::NoContext)));
    }

    #[test]
    fn configured_volume_applies_to_the_first_context() {
        let config = Config::from_toml("volume = 0.25\n[output]\nlead_blocks = 2").unwrap();
        let mut schall = Schall::from_config(&config, OfflineDevice::new(48000, 2));
        assert_eq!(schall.volume(), None);

        schall.ensure_context().unwrap();
        assert_eq!(schall.volume(), Some(0.25));
        schall.set_volume(0.5);
        schall.ensure_context().unwrap();
        assert_eq!(schall.volume(), Some(0.5));
    }
}
