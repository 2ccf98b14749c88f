//! Registered sound definitions.

use std::path::PathBuf;

use cadence_common::InstanceHandle;

/// Load status of a sound's audio data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Not loaded and not requested.
    #[default]
    Unloaded,
    /// Submitted to the loader.
    Loading,
    /// Ready to play.
    Loaded,
}

/// Static config and runtime state of one registered alias.
#[derive(Debug, Clone)]
pub struct SoundDefinition {
    /// Alias.
    pub id: String,
    /// Resolved source path, extension included.
    pub source_path: PathBuf,
    /// Volume used when `play` gives none.
    pub default_volume: f32,
    /// Loop forever when `play` gives no loop setting.
    pub default_loop: bool,
    /// Owning context.
    pub context: Option<String>,
    pub(crate) load_state: LoadState,
    /// Playing instances, oldest first.
    pub(crate) active: Vec<InstanceHandle>,
    /// Instances waiting for the load to finish.
    pub(crate) pending: Vec<InstanceHandle>,
    /// Someone asked to play while the sound was not loaded.
    pub(crate) play_after_load: bool,
    pub(crate) cached_duration_ms: Option<u64>,
}

impl SoundDefinition {
    /// Create an unloaded definition.
    #[must_use]
    pub fn new(id: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            source_path: source_path.into(),
            default_volume: 1.0,
            default_loop: false,
            context: None,
            load_state: LoadState::Unloaded,
            active: Vec::new(),
            pending: Vec::new(),
            play_after_load: false,
            cached_duration_ms: None,
        }
    }

    /// Current load state.
    #[must_use]
    pub const fn load_state(&self) -> LoadState {
        self.load_state
    }

    /// Playing instances, oldest first.
    #[must_use]
    pub fn active_instances(&self) -> &[InstanceHandle] {
        &self.active
    }

    /// Instances waiting for the load.
    #[must_use]
    pub fn pending_instances(&self) -> &[InstanceHandle] {
        &self.pending
    }

    /// Whether deferred playback will start when the load completes.
    #[must_use]
    pub const fn plays_after_load(&self) -> bool {
        self.play_after_load
    }

    /// Length recorded on first play or first duration query.
    #[must_use]
    pub const fn cached_duration_ms(&self) -> Option<u64> {
        self.cached_duration_ms
    }

    /// Whether anything is playing or waiting to play.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        !self.active.is_empty() || !self.pending.is_empty()
    }

    /// Most recently started active instance.
    #[must_use]
    pub fn latest_active(&self) -> Option<InstanceHandle> {
        self.active.last().copied()
    }

    /// Every active and pending instance.
    pub(crate) fn all_instances(&self) -> Vec<InstanceHandle> {
        self.active.iter().chain(self.pending.iter()).copied().collect()
    }

    pub(crate) fn forget(&mut self, handle: InstanceHandle) {
        if let Some(idx) = self.active.iter().position(|h| *h == handle) {
            self.active.remove(idx);
        }
        if let Some(idx) = self.pending.iter().position(|h| *h == handle) {
            self.pending.remove(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_definition_is_unloaded() {
        let def = SoundDefinition::new("click", "sfx/click.ogg");
        assert_eq!(def.load_state(), LoadState::Unloaded);
        assert!(!def.is_playing());
        assert!(!def.plays_after_load());
        assert!((def.default_volume - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_forget_removes_from_either_list() {
        let mut def = SoundDefinition::new("a", "a.ogg");
        let active = InstanceHandle::new(0, 0);
        let pending = InstanceHandle::new(1, 0);
        def.active.push(active);
        def.pending.push(pending);

        def.forget(pending);
        assert!(def.pending_instances().is_empty());
        assert_eq!(def.latest_active(), Some(active));

        def.forget(active);
        assert!(!def.is_playing());
    }
}
