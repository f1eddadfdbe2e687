//! Registry owning all trackables and the per-frame engine query.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::{debug, warn};

use crate::error::TrackError;
use crate::integration::{AssetStore, EngineEvent, StagingPoll, StagingTask, TrackingEngine};
use crate::scene::matrix::pose_from_engine;
use crate::scene::trackable::{
    LoadState, PatternDescriptor, Trackable, TrackableConfig, TrackableId, TrackableOption,
};

/// Stable handle to a trackable in the registry. Unlike the engine id, it
/// never changes across load/unload cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackableHandle(u64);

/// Owns trackable configuration, load state and per-frame visibility.
///
/// The registry is the sole owner of trackable state; nothing is shared
/// across ticks except through it. It is constructed once and passed by
/// reference to the pipeline rather than accessed through globals.
#[derive(Default)]
pub struct TrackableRegistry {
    slots: BTreeMap<TrackableHandle, Trackable>,
    /// Incremental tag lookup, rebuilt only on add/remove.
    tags: HashMap<String, TrackableHandle>,
    /// At most one staging task per trackable.
    staging: HashMap<TrackableHandle, StagingTask>,
    next_handle: u64,
    /// Bumped on add/remove so cached tag resolutions can be invalidated.
    epoch: u64,
}

impl TrackableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a trackable. Loading happens lazily on the next tick.
    pub fn add(&mut self, trackable: Trackable) -> TrackableHandle {
        let handle = TrackableHandle(self.next_handle);
        self.next_handle += 1;
        if let Some(old) = self.tags.insert(trackable.tag.clone(), handle) {
            warn!("tag '{}' reassigned from {:?} to {:?}", trackable.tag, old, handle);
        }
        self.slots.insert(handle, trackable);
        self.epoch += 1;
        handle
    }

    /// Adopt a trackable the engine created on its own (autocreation). The
    /// engine id is already live, so the entry starts out loaded.
    pub fn adopt(&mut self, id: TrackableId) -> TrackableHandle {
        let mut trackable = Trackable::new(format!("unknown-{id}"), TrackableConfig::Unknown);
        trackable.mark_loaded(id, Vec::new());
        self.add(trackable)
    }

    /// Unload and remove a trackable. Returns false for an unknown handle.
    pub fn remove<E: TrackingEngine>(&mut self, engine: &mut E, handle: TrackableHandle) -> bool {
        if !self.slots.contains_key(&handle) {
            return false;
        }
        self.unload(engine, handle);
        self.forget(handle);
        true
    }

    /// Drop a trackable without touching the engine (the engine already
    /// purged it, or has been shut down).
    fn forget(&mut self, handle: TrackableHandle) {
        if let Some(t) = self.slots.remove(&handle) {
            self.tags.remove(&t.tag);
            self.staging.remove(&handle);
            self.epoch += 1;
        }
    }

    pub fn get(&self, handle: TrackableHandle) -> Option<&Trackable> {
        self.slots.get(&handle)
    }

    pub fn get_mut(&mut self, handle: TrackableHandle) -> Option<&mut Trackable> {
        self.slots.get_mut(&handle)
    }

    /// Resolve a tag to its handle. O(1); the map is maintained
    /// incrementally, never re-scanned.
    pub fn find_by_tag(&self, tag: &str) -> Option<TrackableHandle> {
        self.tags.get(tag).copied()
    }

    pub fn handles(&self) -> impl Iterator<Item = TrackableHandle> + '_ {
        self.slots.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TrackableHandle, &Trackable)> {
        self.slots.iter().map(|(h, t)| (*h, t))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current add/remove epoch, for invalidating cached tag resolutions.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Replace a trackable's configuration: the engine resource is
    /// released, prior error state cleared, and a fresh load issued.
    pub fn configure<E: TrackingEngine>(
        &mut self,
        engine: &mut E,
        store: &Arc<dyn AssetStore>,
        handle: TrackableHandle,
        config: TrackableConfig,
    ) -> Result<(), TrackError> {
        self.unload(engine, handle);
        let Some(t) = self.slots.get_mut(&handle) else {
            return Ok(());
        };
        t.replace_config(config);
        self.load(engine, store, handle)
    }

    /// Load a trackable's engine resource.
    ///
    /// Idempotent: already loaded or staging is a no-op. An explicit call
    /// also retries a previously failed load; the lazy per-tick retry does
    /// not.
    pub fn load<E: TrackingEngine>(
        &mut self,
        engine: &mut E,
        store: &Arc<dyn AssetStore>,
        handle: TrackableHandle,
    ) -> Result<(), TrackError> {
        let Some(t) = self.slots.get_mut(&handle) else {
            return Ok(());
        };
        match t.load_state() {
            LoadState::Loaded | LoadState::Staging => return Ok(()),
            LoadState::Unloaded | LoadState::Failed(_) => {}
        }
        if !engine.started() {
            // retried silently next tick
            return Err(TrackError::EngineNotStarted);
        }
        if let Err(e) = t.config().validate() {
            warn!("trackable '{}' configuration rejected: {e}", t.tag);
            t.mark_failed(e.to_string());
            return Err(e);
        }

        let refs = t.config().asset_refs();
        if !refs.is_empty() && refs.iter().any(|r| !store.resident(r)) {
            debug!("trackable '{}' staging {} asset(s)", t.tag, refs.len());
            let task = StagingTask::spawn(Arc::clone(store), refs, t.generation());
            t.mark_staging();
            self.staging.insert(handle, task);
            return Ok(());
        }

        self.finish_load(engine, handle)
    }

    /// Create the engine resource, push queued options and populate the
    /// sub-pattern descriptors. Assets are resident by the time this runs.
    fn finish_load<E: TrackingEngine>(
        &mut self,
        engine: &mut E,
        handle: TrackableHandle,
    ) -> Result<(), TrackError> {
        let Some(t) = self.slots.get_mut(&handle) else {
            return Ok(());
        };
        let Some(config_string) = t.config().engine_config_string() else {
            let e = TrackError::Configuration("trackable kind cannot be loaded".into());
            t.mark_failed(e.to_string());
            return Err(e);
        };

        let id = match engine.add_trackable(&config_string) {
            Ok(id) => id,
            Err(e) => {
                warn!("engine rejected trackable '{}': {e}", t.tag);
                let e = TrackError::Engine(e.to_string());
                t.mark_failed(e.to_string());
                return Err(e);
            }
        };

        for opt in t.queued_options() {
            if let Err(e) = engine.set_option(id, opt) {
                warn!("option {opt:?} not applied to trackable '{}': {e}", t.tag);
            }
        }

        let count = engine.pattern_count(id);
        let mut patterns = Vec::with_capacity(count);
        for index in 0..count {
            match engine.pattern_info(id, index) {
                Ok(info) => patterns.push(PatternDescriptor {
                    index,
                    local_pose: pose_from_engine(&info.matrix),
                    size: info.width_mm * 0.001,
                    image: info.image,
                }),
                Err(e) => warn!("pattern {index} of trackable '{}' unavailable: {e}", t.tag),
            }
        }

        debug!("trackable '{}' loaded as engine id {id}", t.tag);
        t.mark_loaded(id, patterns);
        Ok(())
    }

    /// Release a trackable's engine resource. No-op when unloaded. An
    /// in-flight staging task is dropped and its eventual result discarded.
    pub fn unload<E: TrackingEngine>(&mut self, engine: &mut E, handle: TrackableHandle) {
        self.staging.remove(&handle);
        let Some(t) = self.slots.get_mut(&handle) else {
            return;
        };
        if t.is_loaded() && engine.started() && !engine.remove_trackable(t.id()) {
            warn!("engine did not recognize id {} for trackable '{}'", t.id(), t.tag);
        }
        t.reset();
    }

    /// Reset every trackable without engine calls, for use after the engine
    /// has been globally shut down.
    pub fn detach_all(&mut self) {
        self.staging.clear();
        for t in self.slots.values_mut() {
            t.reset();
        }
    }

    /// Set a per-trackable option. The value is cached locally (surviving
    /// reloads) and pushed to the engine immediately only when the
    /// trackable is loaded and not mid-staging.
    pub fn set_option<E: TrackingEngine>(
        &mut self,
        engine: &mut E,
        handle: TrackableHandle,
        option: TrackableOption,
    ) {
        let Some(t) = self.slots.get_mut(&handle) else {
            return;
        };
        if t.set_option(option) {
            if let Err(e) = engine.set_option(t.id(), option) {
                warn!("option {option:?} not applied to trackable '{}': {e}", t.tag);
            }
        }
    }

    /// Apply autocreate/autoremove notifications drained from the engine.
    pub fn apply_engine_events(&mut self, events: &[EngineEvent]) {
        for event in events {
            match *event {
                EngineEvent::Autocreated(id) => {
                    if self.handle_for_engine_id(id).is_none() {
                        let handle = self.adopt(id);
                        debug!("autocreated trackable {id} adopted as {handle:?}");
                    }
                }
                EngineEvent::Autoremoved(id) => {
                    if let Some(handle) = self.handle_for_engine_id(id) {
                        debug!("autoremoved trackable {id} purged ({handle:?})");
                        self.forget(handle);
                    }
                }
            }
        }
    }

    fn handle_for_engine_id(&self, id: TrackableId) -> Option<TrackableHandle> {
        self.slots
            .iter()
            .find(|(_, t)| t.is_loaded() && t.id() == id)
            .map(|(h, _)| *h)
    }

    /// Per-tick update of every trackable: poll staging completions, retry
    /// lazy loads, query visibility and pose. Returns the handles visible
    /// this tick.
    ///
    /// Failures are isolated per trackable: an engine error on one marks it
    /// not visible and leaves the rest of the tick untouched.
    pub fn update_all<E: TrackingEngine>(
        &mut self,
        engine: &mut E,
        store: &Arc<dyn AssetStore>,
        stereo: bool,
    ) -> Vec<TrackableHandle> {
        let handles: Vec<TrackableHandle> = self.slots.keys().copied().collect();
        let mut visible = Vec::new();
        for handle in handles {
            if self.update_one(engine, store, handle, stereo) {
                visible.push(handle);
            }
        }
        visible
    }

    fn update_one<E: TrackingEngine>(
        &mut self,
        engine: &mut E,
        store: &Arc<dyn AssetStore>,
        handle: TrackableHandle,
        stereo: bool,
    ) -> bool {
        // Resolve any finished staging first.
        let finished = match self.staging.get(&handle) {
            Some(task) => match task.poll() {
                StagingPoll::Pending => return false, // query skipped while staging
                StagingPoll::Ready(result) => Some((task.generation(), result)),
            },
            None => None,
        };
        if let Some((generation, result)) = finished {
            self.staging.remove(&handle);
            let Some(t) = self.slots.get_mut(&handle) else {
                return false;
            };
            if t.generation() != generation {
                debug!("stale staging result for trackable '{}' discarded", t.tag);
            } else {
                match result {
                    Ok(_) => {
                        let _ = self.finish_load(engine, handle);
                    }
                    Err(e) => {
                        warn!("asset staging failed for trackable '{}': {e}", t.tag);
                        t.mark_failed(TrackError::AssetUnavailable(e).to_string());
                    }
                }
            }
        }

        let Some(t) = self.slots.get(&handle) else {
            return false;
        };

        // Lazy load retry: only for trackables with no sticky error.
        if matches!(t.load_state(), LoadState::Unloaded) {
            match self.load(engine, store, handle) {
                Ok(()) | Err(TrackError::EngineNotStarted) => {}
                Err(e) => debug!("load attempt failed: {e}"),
            }
        }

        let Some(t) = self.slots.get_mut(&handle) else {
            return false;
        };
        if !t.is_loaded() {
            t.clear_visible();
            return false;
        }

        if stereo {
            match engine.query_pose_stereo(t.id()) {
                Ok(Some((left, right))) => {
                    t.set_visible(pose_from_engine(&left), Some(pose_from_engine(&right)));
                }
                Ok(None) => t.clear_visible(),
                Err(e) => {
                    warn!("pose query failed for trackable '{}': {e}", t.tag);
                    t.clear_visible();
                }
            }
        } else {
            match engine.query_pose(t.id()) {
                Ok(Some(raw)) => t.set_visible(pose_from_engine(&raw), None),
                Ok(None) => t.clear_visible(),
                Err(e) => {
                    warn!("pose query failed for trackable '{}': {e}", t.tag);
                    t.clear_visible();
                }
            }
        }
        t.visible()
    }
}
