//! Demuxer and input configuration.

use crate::ebml::MAX_RECURSION_DEPTH;
use crate::tag_locator::DEFAULT_SCAN_WINDOW;

/// Structural parse options.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DemuxerConfig {
    /// Bytes at the end of the file searched for tags when no seek head
    /// points at them. 0 disables the search.
    pub tag_scan_window: u64,
    /// Metadata-only open: stop indexing clusters after the first one.
    pub info_only: bool,
    /// Stop the structural parse at the first cluster.
    pub break_at_clusters: bool,
    /// Maximum element nesting.
    pub max_recursion_depth: u32,
}

impl Default for DemuxerConfig {
    fn default() -> Self {
        Self {
            tag_scan_window: DEFAULT_SCAN_WINDOW,
            info_only: false,
            break_at_clusters: true,
            max_recursion_depth: MAX_RECURSION_DEPTH,
        }
    }
}

impl DemuxerConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tail window searched for tags.
    pub fn with_tag_scan_window(mut self, bytes: u64) -> Self {
        self.tag_scan_window = bytes;
        self
    }

    /// Open for metadata only.
    pub fn with_info_only(mut self, info_only: bool) -> Self {
        self.info_only = info_only;
        self
    }

    /// Keep walking past the first cluster.
    pub fn with_break_at_clusters(mut self, enabled: bool) -> Self {
        self.break_at_clusters = enabled;
        self
    }

    /// Set the maximum element nesting.
    pub fn with_max_recursion_depth(mut self, depth: u32) -> Self {
        self.max_recursion_depth = depth;
        self
    }
}

/// Which inputs the host layer accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputConfig {
    /// File extensions, compared without case.
    pub extensions: Vec<String>,
    /// MIME content types, compared without case.
    pub content_types: Vec<String>,
    /// URL prefixes that are never opened.
    pub rejected_schemes: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["mka".into(), "mkv".into()],
            content_types: vec![
                "audio/x-matroska".into(),
                "video/x-matroska".into(),
                "audio/matroska".into(),
                "video/matroska".into(),
            ],
            rejected_schemes: vec!["http://".into()],
        }
    }
}

impl InputConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an additional extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extensions.push(extension.into());
        self
    }

    /// Accept an additional content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_types.push(content_type.into());
        self
    }

    /// Whether a content type is accepted.
    pub fn accepts_content_type(&self, content_type: &str) -> bool {
        self.content_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(content_type))
    }

    /// Whether a path is accepted, judged by scheme and extension.
    ///
    /// `extension` overrides the one taken from `path` when given.
    pub fn accepts_path(&self, path: &str, extension: Option<&str>) -> bool {
        let rejected = self.rejected_schemes.iter().any(|scheme| {
            path.get(..scheme.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
        });
        if rejected {
            return false;
        }
        let extension = extension.or_else(|| {
            std::path::Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
        });
        extension.is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demuxer_config_builder() {
        let config = DemuxerConfig::new()
            .with_tag_scan_window(0)
            .with_info_only(true)
            .with_break_at_clusters(false)
            .with_max_recursion_depth(8);
        assert_eq!(config.tag_scan_window, 0);
        assert!(config.info_only);
        assert!(!config.break_at_clusters);
        assert_eq!(config.max_recursion_depth, 8);

        let default = DemuxerConfig::default();
        assert_eq!(default.tag_scan_window, 65_536);
        assert!(default.break_at_clusters);
    }

    #[test]
    fn test_input_config_paths() {
        let config = InputConfig::default();
        assert!(config.accepts_path("/music/song.mka", None));
        assert!(config.accepts_path("/music/SONG.MKV", None));
        assert!(!config.accepts_path("/music/song.flac", None));
        assert!(!config.accepts_path("HTTP://host/song.mka", None));
        assert!(config.accepts_path("stream", Some("MKA")));
        assert!(config.with_extension("webm").accepts_path("a.webm", None));
    }

    #[test]
    fn test_input_config_content_types() {
        let config = InputConfig::default();
        assert!(config.accepts_content_type("Audio/X-Matroska"));
        assert!(config.accepts_content_type("video/matroska"));
        assert!(!config.accepts_content_type("audio/flac"));
    }
}
