//! One running context of the control room.
//!
//! A context bundles everything one instance owns: its state hub, its wheel
//! machine, its audio router, the photo store, and the background tasks that
//! keep it in sync with the other contexts on the machine.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::audio::{AudioRouter, AudioSink};
use crate::config::AppConfig;
use crate::error::ServiceError;
use crate::state::{PhotoId, SharedHub, SpinPlan, StateHub, WheelMachine};
use crate::store::{FileSlot, GAME_DOCUMENT_KEY, photos::PhotoStore};
use crate::sync::{ContextId, SharedSlot};

/// Context handle shared across its tasks.
pub type SharedContext = Arc<Context>;

/// Snapshot feed capacity per context.
const FEED_CAPACITY: usize = 16;
/// Write-announcement bus capacity shared by same-process contexts.
const BUS_CAPACITY: usize = 32;

/// Handle to a countdown loop this context started.
pub(crate) struct RunningTimer {
    /// Flipped to `true` to make the loop exit before its next tick.
    pub stop: watch::Sender<bool>,
    /// The loop task itself.
    pub task: JoinHandle<()>,
}

/// Central bundle for one running control-room instance.
pub struct Context {
    config: AppConfig,
    hub: SharedHub,
    wheel: Mutex<WheelMachine>,
    spin_plan: Mutex<Option<SpinPlan>>,
    timer: Mutex<Option<RunningTimer>>,
    audio: AudioRouter,
    photos: PhotoStore,
    photo_cache: DashMap<PhotoId, Bytes>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Context {
    /// Open a context against the machine-wide slot under the configured
    /// data directory, with audio cues logged rather than played.
    pub async fn open(config: AppConfig) -> Result<SharedContext, ServiceError> {
        let slot = FileSlot::open(config.data_dir(), GAME_DOCUMENT_KEY)?;
        let shared = SharedSlot::new(Arc::new(slot), BUS_CAPACITY);
        let sink = Box::new(crate::audio::NullSink);
        Self::open_with(config, shared, sink).await
    }

    /// Open a context on an existing shared slot with a custom audio sink.
    ///
    /// Tests and demos use this to run several contexts against one
    /// in-memory slot inside a single process.
    pub async fn open_with(
        config: AppConfig,
        shared: SharedSlot,
        sink: Box<dyn AudioSink>,
    ) -> Result<SharedContext, ServiceError> {
        let context_id = ContextId::new();
        let photos = PhotoStore::open(config.data_dir().join("photos")).await?;
        let hub = StateHub::new(context_id, shared, FEED_CAPACITY);

        let context = Arc::new(Self {
            wheel: Mutex::new(WheelMachine::new(config.spin_cooldown())),
            spin_plan: Mutex::new(None),
            timer: Mutex::new(None),
            audio: AudioRouter::new(config.tracks(), sink),
            photos,
            photo_cache: DashMap::new(),
            tasks: Mutex::new(Vec::new()),
            hub,
            config,
        });

        let watcher = context.hub.spawn_watcher(context.config.poll_interval());
        let presenter = crate::services::wheel_service::spawn_presenter(&context);
        context.push_task(watcher);
        context.push_task(presenter);

        info!(context = %context_id, "context opened");
        Ok(context)
    }

    /// Identity of this context.
    pub fn id(&self) -> ContextId {
        self.hub.context()
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The state hub owning this context's view of the shared document.
    pub fn hub(&self) -> &SharedHub {
        &self.hub
    }

    /// Audio cue router.
    pub fn audio(&self) -> &AudioRouter {
        &self.audio
    }

    /// Photo store shared by all contexts on the machine.
    pub fn photos(&self) -> &PhotoStore {
        &self.photos
    }

    /// The local wheel machine.
    pub(crate) fn wheel(&self) -> std::sync::MutexGuard<'_, WheelMachine> {
        self.wheel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The animation plan of the spin currently playing or displayed.
    pub fn spin_plan(&self) -> Option<SpinPlan> {
        self.lock_plan().clone()
    }

    pub(crate) fn set_spin_plan(&self, plan: Option<SpinPlan>) {
        *self.lock_plan() = plan;
    }

    /// Countdown loop handle owned by this context, if any.
    pub(crate) fn timer_slot(&self) -> std::sync::MutexGuard<'_, Option<RunningTimer>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Photo bytes prefetched for display, if present.
    pub fn cached_photo(&self, id: PhotoId) -> Option<Bytes> {
        self.photo_cache.get(&id).map(|entry| entry.clone())
    }

    pub(crate) fn cache_photo(&self, id: PhotoId, bytes: Bytes) {
        self.photo_cache.insert(id, bytes);
    }

    /// Tear the context down: stop background tasks, cancel an owned
    /// countdown, and drop the display cache. The shared document is left
    /// as-is for the remaining contexts.
    pub fn close(&self) {
        for task in self.lock_tasks().drain(..) {
            task.abort();
        }
        if let Some(timer) = self.timer_slot().take() {
            let _ = timer.stop.send(true);
            timer.task.abort();
        }
        self.photo_cache.clear();
        self.audio.stop();
        info!(context = %self.id(), "context closed");
    }

    fn push_task(&self, task: JoinHandle<()>) {
        self.lock_tasks().push(task);
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_plan(&self) -> std::sync::MutexGuard<'_, Option<SpinPlan>> {
        self.spin_plan.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        for task in self.lock_tasks().drain(..) {
            task.abort();
        }
    }
}
