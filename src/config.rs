//! Transition parameters and the mapping from presentation time to progress.

use crate::error::{TransitionError, TransitionResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default transition length in seconds.
pub const DEFAULT_DURATION: f64 = 1.0;
/// Default delay before the transition starts, in seconds.
pub const DEFAULT_OFFSET: f64 = 0.0;

/// Where the transition snippet comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TransitionSource {
    /// The built-in pass-through transition.
    #[default]
    Builtin,
    /// Snippet text supplied directly.
    Inline(String),
    /// Snippet read from a file when the renderer is configured.
    File(PathBuf),
}

impl TransitionSource {
    /// Returns the snippet text, or `None` for the built-in transition.
    pub fn load(&self) -> TransitionResult<Option<String>> {
        match self {
            TransitionSource::Builtin => Ok(None),
            TransitionSource::Inline(code) => Ok(Some(code.clone())),
            TransitionSource::File(path) => {
                info!("Loading transition from {:?}", path);
                fs::read_to_string(path)
                    .map(Some)
                    .map_err(|source| TransitionError::SourceUnavailable {
                        path: path.clone(),
                        source,
                    })
            }
        }
    }
}

/// Immutable transition parameters, validated on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionConfig {
    duration: f64,
    offset: f64,
    source: TransitionSource,
}

impl TransitionConfig {
    /// Creates a config using the built-in transition.
    pub fn new(duration: f64, offset: f64) -> TransitionResult<Self> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(TransitionError::config(format!(
                "duration must be a positive number of seconds, got {duration}"
            )));
        }
        if !offset.is_finite() || offset < 0.0 {
            return Err(TransitionError::config(format!(
                "offset must be a non-negative number of seconds, got {offset}"
            )));
        }
        Ok(Self {
            duration,
            offset,
            source: TransitionSource::Builtin,
        })
    }

    pub fn with_source(mut self, source: TransitionSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_source_path(self, path: impl Into<PathBuf>) -> Self {
        self.with_source(TransitionSource::File(path.into()))
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn source(&self) -> &TransitionSource {
        &self.source
    }

    /// Maps a presentation time in seconds to transition progress.
    ///
    /// Exactly `0.0` until `offset` has elapsed, exactly `1.0` from `offset + duration`
    /// on, linear in between. A NaN timestamp counts as "not started".
    pub fn progress_at(&self, presentation_seconds: f64) -> f32 {
        let elapsed = presentation_seconds - self.offset;
        let ratio = elapsed / self.duration;
        if ratio.is_nan() {
            return 0.0;
        }
        ratio.clamp(0.0, 1.0) as f32
    }
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION,
            offset: DEFAULT_OFFSET,
            source: TransitionSource::Builtin,
        }
    }
}

/// On-disk form of the transition parameters.
///
/// ```yaml
/// duration: 2.5
/// offset: 1.0
/// source: transitions/fade.glsl
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub duration: Option<f64>,
    pub offset: Option<f64>,
    pub source: Option<PathBuf>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies overrides on top of the file values and validates the result.
    ///
    /// A relative `source` path in the file is resolved against `base_dir`.
    pub fn resolve(
        &self,
        base_dir: Option<&Path>,
        duration: Option<f64>,
        offset: Option<f64>,
        source: Option<PathBuf>,
    ) -> TransitionResult<TransitionConfig> {
        let config = TransitionConfig::new(
            duration.or(self.duration).unwrap_or(DEFAULT_DURATION),
            offset.or(self.offset).unwrap_or(DEFAULT_OFFSET),
        )?;

        let file_source = self.source.as_ref().map(|path| match base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.clone(),
        });

        Ok(match source.or(file_source) {
            Some(path) => config.with_source_path(path),
            None => config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_duration() {
        for duration in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                TransitionConfig::new(duration, 0.0),
                Err(TransitionError::ConfigInvalid(_))
            ));
        }
    }

    #[test]
    fn rejects_negative_offset() {
        assert!(matches!(
            TransitionConfig::new(1.0, -0.5),
            Err(TransitionError::ConfigInvalid(_))
        ));
        assert!(TransitionConfig::new(1.0, 0.0).is_ok());
    }

    #[test]
    fn progress_is_exact_at_the_ends() {
        let config = TransitionConfig::new(2.0, 1.0).unwrap();
        for pts in [-10.0, 0.0, 0.5, 1.0] {
            assert_eq!(config.progress_at(pts), 0.0);
        }
        for pts in [3.0, 3.5, 100.0] {
            assert_eq!(config.progress_at(pts), 1.0);
        }
        assert!((config.progress_at(2.0) - 0.5).abs() < 1e-6);
        assert!((config.progress_at(1.5) - 0.25).abs() < 1e-6);
        assert_eq!(config.progress_at(f64::NAN), 0.0);
    }

    #[test]
    fn progress_is_monotonic() {
        let config = TransitionConfig::new(0.7, 0.3).unwrap();
        let mut last = 0.0f32;
        for i in 0..200 {
            let p = config.progress_at(i as f64 * 0.01);
            assert!(p >= last, "progress went backwards at frame {i}");
            last = p;
        }
        assert_eq!(last, 1.0);
    }

    #[test]
    fn default_sequence_matches_timestamps() {
        let config = TransitionConfig::default();
        let seq: Vec<f32> = [0.0, 0.5, 1.0, 2.0]
            .iter()
            .map(|&t| config.progress_at(t))
            .collect();
        assert_eq!(seq, vec![0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn builtin_source_loads_nothing() {
        assert_eq!(TransitionSource::Builtin.load().unwrap(), None);
        let inline = TransitionSource::Inline("vec4 transition(vec2 uv) { return vec4(uv, 0.0, 1.0); }".into());
        assert!(inline.load().unwrap().unwrap().contains("transition"));
    }

    #[test]
    fn missing_source_file_is_unavailable() {
        let source = TransitionSource::File(PathBuf::from("/nonexistent/segue/fade.glsl"));
        assert!(matches!(
            source.load(),
            Err(TransitionError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn config_file_values_and_overrides() {
        let file = ConfigFile::parse("duration: 2.5\noffset: 1.0\nsource: fade.glsl\n").unwrap();
        assert_eq!(file.duration, Some(2.5));

        let config = file.resolve(Some(Path::new("/shaders")), None, None, None).unwrap();
        assert_eq!(config.duration(), 2.5);
        assert_eq!(config.offset(), 1.0);
        assert_eq!(
            config.source(),
            &TransitionSource::File(PathBuf::from("/shaders/fade.glsl"))
        );

        let config = file
            .resolve(None, Some(4.0), Some(0.0), Some(PathBuf::from("/tmp/wipe.glsl")))
            .unwrap();
        assert_eq!(config.duration(), 4.0);
        assert_eq!(config.offset(), 0.0);
        assert_eq!(config.source(), &TransitionSource::File(PathBuf::from("/tmp/wipe.glsl")));
    }

    #[test]
    fn config_file_rejects_unknown_keys_and_bad_values() {
        assert!(ConfigFile::parse("duraton: 2.0\n").is_err());
        let file = ConfigFile::parse("duration: 0\n").unwrap();
        assert!(matches!(
            file.resolve(None, None, None, None),
            Err(TransitionError::ConfigInvalid(_))
        ));
    }
}
