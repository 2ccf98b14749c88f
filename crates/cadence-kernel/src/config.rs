//! Registry settings and sound registration configs.
//!
//! Registration configs are plain serde types so hosts can keep them in JSON
//! or TOML manifests:
//!
//! ```json
//! {
//!   "context": "sfx",
//!   "path": "assets/sounds/",
//!   "preload": false,
//!   "sounds": ["click", { "id": "theme", "src": "music/theme", "loop": true, "context": "music" }]
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Default file type preference, best first.
pub const DEFAULT_PREFERRED_TYPES: [&str; 2] = ["ogg", "mp3"];

/// Idle time after which a stale-prone engine context is rebuilt.
pub const DEFAULT_STALE_CONTEXT_THRESHOLD_MS: u64 = 30_000;

/// Default fade duration, also used when a fade asks for a non-positive one.
pub const DEFAULT_FADE_DURATION_MS: u64 = 500;

/// Registry-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// File types in order of preference; the first one the backend supports
    /// becomes the extension of every source path.
    pub preferred_types: Vec<String>,
    /// Whether the gesture that unlocks audio should have its default action
    /// suppressed by the host.
    pub prevent_default_on_unmute: bool,
    /// Idle time before a stale-prone context is recreated.
    pub stale_context_threshold_ms: u64,
    /// Number of playback instances allocated up front.
    pub pool_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            preferred_types: DEFAULT_PREFERRED_TYPES.iter().map(|t| (*t).to_string()).collect(),
            prevent_default_on_unmute: true,
            stale_context_threshold_ms: DEFAULT_STALE_CONTEXT_THRESHOLD_MS,
            pool_capacity: 0,
        }
    }
}

impl RegistryConfig {
    /// Config with a file type preference list.
    #[must_use]
    pub fn with_preferred_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Config with a stale-context threshold.
    #[must_use]
    pub fn with_stale_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.stale_context_threshold_ms = threshold_ms;
        self
    }

    /// Config with an initial pool size.
    #[must_use]
    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }
}

/// A batch of sounds registered together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Context every sound joins unless it names its own.
    #[serde(alias = "contextName")]
    pub context: Option<String>,
    /// Prefix prepended to every source.
    #[serde(alias = "basePath")]
    pub path: Option<String>,
    /// Preload every sound in this config right away.
    #[serde(alias = "preloadAll")]
    pub preload: bool,
    /// The sounds.
    #[serde(alias = "soundManifest")]
    pub sounds: Vec<SoundEntry>,
}

impl ContextConfig {
    /// Config whose sounds join `context`.
    #[must_use]
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: Some(context.into()),
            ..Self::default()
        }
    }

    /// Set the source path prefix.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Preload all sounds on registration.
    #[must_use]
    pub fn with_preload(mut self, preload: bool) -> Self {
        self.preload = preload;
        self
    }

    /// Add a sound.
    #[must_use]
    pub fn with_sound(mut self, entry: impl Into<SoundEntry>) -> Self {
        self.sounds.push(entry.into());
        self
    }
}

/// One sound in a [`ContextConfig`]: either a bare id or full settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SoundEntry {
    /// Shorthand for a sound whose source is its id.
    Id(String),
    /// Full settings.
    Detailed(SoundSettings),
}

impl SoundEntry {
    /// Expand to full settings.
    #[must_use]
    pub fn into_settings(self) -> SoundSettings {
        match self {
            Self::Id(id) => SoundSettings::new(id),
            Self::Detailed(settings) => settings,
        }
    }
}

impl From<&str> for SoundEntry {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<String> for SoundEntry {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

impl From<SoundSettings> for SoundEntry {
    fn from(settings: SoundSettings) -> Self {
        Self::Detailed(settings)
    }
}

/// Settings for one registered sound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundSettings {
    /// Alias the sound is played by.
    pub id: String,
    /// Source path without extension; defaults to the id.
    #[serde(default)]
    pub src: Option<String>,
    /// Default volume (0.0-1.0); defaults to 1.
    #[serde(default)]
    pub volume: Option<f32>,
    /// Loop forever when `play` does not say otherwise.
    #[serde(default, rename = "loop")]
    pub looping: Option<bool>,
    /// Context overriding the config-level one.
    #[serde(default)]
    pub context: Option<String>,
    /// Preload on registration.
    #[serde(default)]
    pub preload: Option<bool>,
}

impl SoundSettings {
    /// Settings with only an id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            src: None,
            volume: None,
            looping: None,
            context: None,
            preload: None,
        }
    }

    /// Set the source path.
    #[must_use]
    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }

    /// Set the default volume.
    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Set default looping.
    #[must_use]
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = Some(looping);
        self
    }

    /// Put the sound in a specific context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Preload on registration.
    #[must_use]
    pub fn with_preload(mut self, preload: bool) -> Self {
        self.preload = Some(preload);
        self
    }
}
