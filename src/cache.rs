//! Decoded-buffer cache.
//!
//! Maps sound identifiers to decoded audio, fetching and decoding each one
//! at most once. All methods take `&self`, so a [`load`](BufferCache::load)
//! can be in flight while the same task keeps rendering and looking sounds
//! up (`tokio::join!`, a `LocalSet`). State lives in `RefCell`s that are
//! never borrowed across an await.

use std::cell::{Cell, RefCell};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::decode::{Decode, DecodedAudio, SymphoniaDecoder};
use crate::error::Result;
use crate::fetch::{self, Fetch, Fetcher};

enum Slot {
    /// Fetch or decode in flight. The ticket tells this load apart from an
    /// earlier one whose slot was removed in the meantime; `settled` closes
    /// when the owning load is done with it, settled or dropped.
    Pending { ticket: u64, settled: watch::Receiver<()> },
    Loaded(Arc<DecodedAudio>),
}

/// Shape of a loaded sound.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AudioInfo {
    pub duration: Duration,
    pub sample_rate: u32,
    pub channels: usize,
    pub frames: usize,
}

impl From<&DecodedAudio> for AudioInfo {
    fn from(audio: &DecodedAudio) -> Self {
        Self {
            duration: audio.duration(),
            sample_rate: audio.sample_rate(),
            channels: audio.channels(),
            frames: audio.frames(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadStatus {
    Absent,
    Pending,
    Loaded(AudioInfo),
    /// The last load attempt failed; a new `load` retries it.
    Failed,
}

/// What one [`BufferCache::load`] call did with each identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<String>,
    /// Already loaded, or pending in another `load` (which this one waited
    /// for), when requested.
    pub skipped: Vec<String>,
    /// Finished after being removed from the cache; the result was dropped.
    pub discarded: Vec<String>,
}

enum Outcome {
    Loaded,
    Failed,
    Discarded,
}

/// Decrements the in-flight counter however the load future ends.
struct LoadingGuard<'a>(&'a Cell<usize>);

impl<'a> LoadingGuard<'a> {
    fn enter(counter: &'a Cell<usize>) -> Self {
        counter.set(counter.get() + 1);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// Clears the pending slots a load still owns if its future is dropped
/// before settling them.
struct PendingGuard<'a> {
    slots: &'a RefCell<HashMap<String, Slot>>,
    owned: Vec<(String, u64)>,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.slots.borrow_mut();
        for (url, ticket) in self.owned.drain(..) {
            if matches!(slots.get(&url), Some(Slot::Pending { ticket: t, .. }) if *t == ticket) {
                debug!(url, "load dropped before settling");
                slots.remove(&url);
            }
        }
    }
}

pub struct BufferCache<F = Fetcher, D = SymphoniaDecoder> {
    fetcher: F,
    decoder: D,
    slots: RefCell<HashMap<String, Slot>>,
    failed: RefCell<HashSet<String>>,
    in_flight: Cell<usize>,
    next_ticket: Cell<u64>,
}

impl Default for BufferCache {
    fn default() -> Self {
        Self::new(Fetcher::new(), SymphoniaDecoder)
    }
}

impl<F: Fetch, D: Decode> BufferCache<F, D> {
    pub fn new(fetcher: F, decoder: D) -> Self {
        Self {
            fetcher,
            decoder,
            slots: RefCell::new(HashMap::new()),
            failed: RefCell::new(HashSet::new()),
            in_flight: Cell::new(0),
            next_ticket: Cell::new(0),
        }
    }

    /// Fetch and decode every identifier not already loaded or pending.
    ///
    /// Duplicates in the request are collapsed. All fetches and decodes run
    /// concurrently and this resolves once every one of them has settled,
    /// including those another `load` already had in flight (those are
    /// reported as skipped and are not fetched again). Each sound becomes
    /// available through [`get`](Self::get) as soon as its own decode
    /// finishes. Failures are logged and leave the identifier absent; they
    /// never affect the other identifiers.
    ///
    /// Dropping the future before it resolves leaves the identifiers it was
    /// loading absent, so a later `load` fetches them again.
    pub async fn load<I, S>(&self, sources: I) -> LoadReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = LoadReport::default();
        let mut batch = Vec::new();
        let mut waiting = Vec::new();

        {
            let mut slots = self.slots.borrow_mut();
            let mut failed = self.failed.borrow_mut();
            for url in sources.into_iter().map(|s| s.as_ref().to_owned()).unique() {
                match slots.get(&url) {
                    Some(Slot::Loaded(_)) => report.skipped.push(url),
                    Some(Slot::Pending { settled, .. }) => {
                        waiting.push(settled.clone());
                        report.skipped.push(url);
                    }
                    None => {
                        let ticket = self.next_ticket.get();
                        self.next_ticket.set(ticket + 1);
                        let (done, settled) = watch::channel(());
                        slots.insert(url.clone(), Slot::Pending { ticket, settled });
                        failed.remove(&url);
                        batch.push((url, ticket, done));
                    }
                }
            }
        }

        if batch.is_empty() && waiting.is_empty() {
            return report;
        }

        let _loading = LoadingGuard::enter(&self.in_flight);
        let _pending = PendingGuard {
            slots: &self.slots,
            owned: batch.iter().map(|(url, ticket, _)| (url.clone(), *ticket)).collect(),
        };
        if !batch.is_empty() {
            debug!(sounds = %batch.iter().map(|(url, _, _)| url).join(", "), "loading");
        }

        let own = join_all(batch.into_iter().map(|(url, ticket, done)| async move {
            let result = self.fetch_and_decode(&url).await;
            let outcome = self.settle(&url, ticket, result);
            drop(done);
            (url, outcome)
        }));
        let others = join_all(waiting.into_iter().map(|mut settled| async move {
            // only ever closes, never changes
            let _ = settled.changed().await;
        }));
        let (outcomes, _) = futures::join!(own, others);

        for (url, outcome) in outcomes {
            match outcome {
                Outcome::Loaded => report.loaded.push(url),
                Outcome::Failed => report.failed.push(url),
                Outcome::Discarded => report.discarded.push(url),
            }
        }
        report
    }

    async fn fetch_and_decode(&self, url: &str) -> Result<DecodedAudio> {
        let bytes = self.fetcher.fetch(url).await?;
        self.decoder.decode(bytes, fetch::extension(url)).await
    }

    fn settle(&self, url: &str, ticket: u64, result: Result<DecodedAudio>) -> Outcome {
        let mut slots = self.slots.borrow_mut();
        let current = matches!(slots.get(url), Some(Slot::Pending { ticket: t, .. }) if *t == ticket);

        if !current {
            debug!(url, "sound removed while loading, dropping result");
            return Outcome::Discarded;
        }

        match result {
            Ok(audio) => {
                debug!(url, duration = ?audio.duration(), "sound loaded");
                slots.insert(url.to_owned(), Slot::Loaded(Arc::new(audio)));
                Outcome::Loaded
            }
            Err(err) => {
                warn!(url, %err, "failed to load sound");
                slots.remove(url);
                self.failed.borrow_mut().insert(url.to_owned());
                Outcome::Failed
            }
        }
    }

    /// The decoded sound, if it has finished loading.
    pub fn get(&self, url: &str) -> Option<Arc<DecodedAudio>> {
        match self.slots.borrow().get(url) {
            Some(Slot::Loaded(audio)) => Some(Arc::clone(audio)),
            _ => None,
        }
    }

    /// Drop the given identifiers. For each, whether it was loaded or pending.
    ///
    /// A load still in flight for a removed identifier finishes, but its
    /// result is discarded.
    pub fn remove<I, S>(&self, urls: I) -> Vec<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut slots = self.slots.borrow_mut();
        let mut failed = self.failed.borrow_mut();
        urls.into_iter()
            .map(|url| {
                failed.remove(url.as_ref());
                slots.remove(url.as_ref()).is_some()
            })
            .collect()
    }

    /// Drop everything, including loads in flight (their results are discarded).
    pub fn clear(&self) {
        self.slots.borrow_mut().clear();
        self.failed.borrow_mut().clear();
    }

    /// True while any `load` call is still running.
    pub fn is_loading(&self) -> bool {
        self.in_flight.get() > 0
    }

    pub fn status(&self, url: &str) -> LoadStatus {
        match self.slots.borrow().get(url) {
            Some(Slot::Loaded(audio)) => LoadStatus::Loaded(AudioInfo::from(audio.as_ref())),
            Some(Slot::Pending { .. }) => LoadStatus::Pending,
            None if self.failed.borrow().contains(url) => LoadStatus::Failed,
            None => LoadStatus::Absent,
        }
    }

    /// Number of loaded or pending sounds.
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }
}
