//! Fire-and-forget playback sessions.

use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::context::{AudioRoot, ContextId, ContextState, SourceHandle};
use crate::decode::DecodedAudio;
use crate::error::{Error, Result};
use crate::nodes::{EndNotifier, PlayerMessage, SamplePlayer};

/// Identifies one playback session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SessionId(pub(crate) u64);

struct Session {
    source: SourceHandle,
    context: ContextId,
}

/// Tracks every sound currently playing.
///
/// A session enters the active set once its player has been told to start
/// and leaves it exactly once: when the player reports its natural end
/// (picked up by [`reap`](Self::reap)) or when [`stop_all`](Self::stop_all)
/// tears everything down.
pub struct Sessions {
    active: HashMap<SessionId, Session>,
    next_id: u64,
    ended_tx: UnboundedSender<SessionId>,
    ended: UnboundedReceiver<SessionId>,
}

impl Default for Sessions {
    fn default() -> Self {
        Self::new()
    }
}

impl Sessions {
    pub fn new() -> Self {
        let (ended_tx, ended) = mpsc::unbounded_channel();
        Self {
            active: HashMap::new(),
            next_id: 0,
            ended_tx,
            ended,
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.active.contains_key(&id)
    }

    /// Start playing `audio` from its beginning through the shared gain.
    ///
    /// A suspended context is resumed first. Failures are logged and
    /// returned; nothing is left behind in the graph.
    pub async fn play(&mut self, root: &mut AudioRoot, audio: &Arc<DecodedAudio>) -> Result<SessionId> {
        let result = self.start(root, audio).await;
        if let Err(err) = &result {
            warn!(%err, "playback did not start");
        }
        result
    }

    async fn start(&mut self, root: &mut AudioRoot, audio: &Arc<DecodedAudio>) -> Result<SessionId> {
        match root.state() {
            None => return Err(Error::NoContext),
            Some(ContextState::Closed) => return Err(Error::ContextClosed),
            Some(ContextState::Suspended) => root
                .resume_context()
                .await
                .map_err(|e| Error::PlaybackStart(format!("could not resume audio context: {e}")))?,
            Some(ContextState::Running) => {}
        }

        let context = root.context_mut().ok_or(Error::NoContext)?;
        let id = SessionId(self.next_id);
        self.next_id += 1;

        let player = SamplePlayer::new(Arc::clone(audio)).with_end_notifier(EndNotifier::new(id, self.ended_tx.clone()));
        let mut source = context.add_source(player)?;

        if source.send(PlayerMessage::Start).is_err() {
            context.remove_source(&source);
            return Err(Error::PlaybackStart("player message queue unavailable".into()));
        }

        self.active.insert(id, Session { source, context: context.id() });
        debug!(?id, duration = ?audio.duration(), "playback started");
        Ok(id)
    }

    /// Play each entry independently, in order. One failure does not stop
    /// the rest. Returns how many started.
    pub async fn play_many<'a>(
        &mut self,
        root: &mut AudioRoot,
        audios: impl IntoIterator<Item = &'a Arc<DecodedAudio>>,
    ) -> usize {
        let mut started = 0;
        for audio in audios {
            if self.play(root, audio).await.is_ok() {
                started += 1;
            }
        }
        started
    }

    /// Retire sessions whose playback ended on its own. Returns how many.
    ///
    /// Also forgets sessions that belonged to a context which no longer exists.
    pub fn reap(&mut self, root: &mut AudioRoot) -> usize {
        let mut ended = 0;
        while let Ok(id) = self.ended.try_recv() {
            let Some(session) = self.active.remove(&id) else { continue };
            if let Some(context) = root.context_mut().filter(|c| c.id() == session.context) {
                context.remove_source(&session.source);
            }
            debug!(?id, "playback ended");
            ended += 1;
        }

        let live = root.context().map(|c| c.id());
        self.active.retain(|_, session| Some(session.context) == live);
        ended
    }

    /// Stop every active session immediately. No end notifications follow.
    pub fn stop_all(&mut self, root: &mut AudioRoot) {
        let mut context = root.context_mut();
        let count = self.active.len();

        for (_, mut session) in self.active.drain() {
            let _ = session.source.send(PlayerMessage::Stop);
            if let Some(context) = context.as_deref_mut().filter(|c| c.id() == session.context) {
                context.remove_source(&session.source);
            }
        }

        if count > 0 {
            debug!(count, "stopped all playback");
        }
    }
}
