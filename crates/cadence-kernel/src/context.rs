//! Sound contexts: named groups sharing volume and mute control.
//!
//! Contexts form a graph through [`ContextGraph::link`]. A context may be
//! linked under more than one parent, so propagation walks a DAG; links that
//! would close a cycle are rejected.

use ahash::{AHashMap, AHashSet};
use cadence_common::{SoundError, SoundResult};
use tracing::{debug, warn};

/// A named group of sounds and sub-contexts.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundContext {
    name: String,
    /// Multiplier applied to every member's volume (0.0-1.0).
    volume: f32,
    muted: bool,
    /// Aliases of member sounds.
    members: Vec<String>,
    /// Names of linked sub-contexts.
    children: Vec<String>,
}

impl SoundContext {
    /// Create an empty, unmuted context at full volume.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            volume: 1.0,
            muted: false,
            members: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Context name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Volume multiplier.
    #[must_use]
    pub const fn volume(&self) -> f32 {
        self.volume
    }

    /// Whether the context is muted.
    #[must_use]
    pub const fn is_muted(&self) -> bool {
        self.muted
    }

    /// Factor applied to member volumes: 0 when muted, else the multiplier.
    #[must_use]
    pub fn factor(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    /// Aliases of member sounds.
    #[must_use]
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Names of linked sub-contexts.
    #[must_use]
    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub(crate) fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub(crate) fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub(crate) fn add_member(&mut self, alias: &str) {
        if !self.members.iter().any(|m| m == alias) {
            self.members.push(alias.to_string());
        }
    }

    pub(crate) fn remove_member(&mut self, alias: &str) {
        self.members.retain(|m| m != alias);
    }

    fn add_child(&mut self, child: &str) -> bool {
        if self.children.iter().any(|c| c == child) {
            return false;
        }
        self.children.push(child.to_string());
        true
    }
}

/// All contexts, keyed by name.
#[derive(Debug, Default)]
pub struct ContextGraph {
    contexts: AHashMap<String, SoundContext>,
}

impl ContextGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether no context exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Whether a context exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.contexts.contains_key(name)
    }

    /// Look up a context.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SoundContext> {
        self.contexts.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut SoundContext> {
        self.contexts.get_mut(name)
    }

    /// Look up a context, creating it on first reference.
    pub(crate) fn get_or_create(&mut self, name: &str) -> &mut SoundContext {
        self.contexts.entry(name.to_string()).or_insert_with(|| {
            debug!("Created sound context '{}'", name);
            SoundContext::new(name)
        })
    }

    /// Volume factor for a sound in `context`; 1 for no or unknown context.
    #[must_use]
    pub fn factor_for(&self, context: Option<&str>) -> f32 {
        context
            .and_then(|name| self.contexts.get(name))
            .map_or(1.0, SoundContext::factor)
    }

    /// Link `children` under `parent`, creating `parent` if needed.
    ///
    /// Children are deduplicated. A child that would make `parent` its own
    /// descendant is rejected; the remaining children are still linked.
    pub fn link<S: AsRef<str>>(&mut self, parent: &str, children: &[S]) -> SoundResult<()> {
        self.get_or_create(parent);

        let mut result = Ok(());
        for child in children {
            let child = child.as_ref();
            if child == parent || self.walk(child).iter().any(|name| name == parent) {
                warn!("Refusing to link context '{}' under '{}': cycle", child, parent);
                result = Err(SoundError::ContextCycle {
                    parent: parent.to_string(),
                    child: child.to_string(),
                });
                continue;
            }
            if self.get_or_create(parent).add_child(child) {
                debug!("Linked context '{}' under '{}'", child, parent);
            }
        }
        result
    }

    /// `root` followed by every context reachable through child links,
    /// depth first, each listed once. Unknown names are skipped.
    #[must_use]
    pub fn walk(&self, root: &str) -> Vec<String> {
        let mut order = Vec::new();
        let mut visited = AHashSet::new();
        self.walk_into(root, &mut visited, &mut order);
        order
    }

    fn walk_into(&self, name: &str, visited: &mut AHashSet<String>, order: &mut Vec<String>) {
        let Some(context) = self.contexts.get(name) else {
            return;
        };
        if !visited.insert(name.to_string()) {
            return;
        }
        order.push(name.to_string());
        for child in &context.children {
            self.walk_into(child, visited, order);
        }
    }
}
