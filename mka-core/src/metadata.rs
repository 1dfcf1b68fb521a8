//! Flat generic metadata model.
//!
//! [`FileInfo`] is what the host sees: a list of multi-valued, case-insensitive
//! meta fields (`ARTIST`, `TITLE`, ...), a list of technical info fields, the
//! ReplayGain values and the playable length.

/// Significant digits used when ReplayGain values are written back as text.
pub const REPLAYGAIN_DIGITS: usize = 7;

/// Frames per second in cuesheet index times (`mm:ss:ff`).
pub const CUESHEET_FRAMES_PER_SECOND: u64 = 75;

/// One meta field with all of its values.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetaField {
    /// Field name as first added.
    pub name: String,
    /// Values in insertion order.
    pub values: Vec<String>,
}

/// ReplayGain values; `None` means absent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReplayGain {
    pub album_gain: Option<f32>,
    pub album_peak: Option<f32>,
    pub track_gain: Option<f32>,
    pub track_peak: Option<f32>,
}

impl ReplayGain {
    /// Parse a gain or peak string such as `-6.48 dB` or `0.98`.
    pub fn parse_value(text: &str) -> Option<f32> {
        let text = text.trim();
        let text = match text.len().checked_sub(2).and_then(|at| text.get(at..)) {
            Some(unit) if unit.eq_ignore_ascii_case("db") => text[..text.len() - 2].trim_end(),
            _ => text,
        };
        text.parse::<f32>().ok().filter(|v| v.is_finite())
    }

    /// Set a field by its host name (`replaygain_album_gain`, ...).
    ///
    /// Returns false when the name is unknown or the value does not parse.
    pub fn set_field(&mut self, field: &str, text: &str) -> bool {
        let Some(value) = Self::parse_value(text) else {
            return false;
        };
        let slot = match field.to_ascii_lowercase().as_str() {
            "replaygain_album_gain" => &mut self.album_gain,
            "replaygain_album_peak" => &mut self.album_peak,
            "replaygain_track_gain" => &mut self.track_gain,
            "replaygain_track_peak" => &mut self.track_peak,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    /// Check if no value is present.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Format a value with [`REPLAYGAIN_DIGITS`] significant digits.
pub fn format_significant(value: f32) -> String {
    let value = value as f64;
    if value == 0.0 {
        return format!("{:.*}", REPLAYGAIN_DIGITS - 1, 0.0);
    }
    let magnitude = value.abs().log10().floor() as i32 + 1;
    let decimals = (REPLAYGAIN_DIGITS as i32 - magnitude).max(0) as usize;
    format!("{:.*}", decimals, value)
}

/// Format seconds as a cuesheet index time `mm:ss:ff`.
pub fn format_index_time(seconds: f64) -> String {
    let frames = (seconds.max(0.0) * CUESHEET_FRAMES_PER_SECOND as f64).round() as u64;
    let minutes = frames / (CUESHEET_FRAMES_PER_SECOND * 60);
    let secs = (frames / CUESHEET_FRAMES_PER_SECOND) % 60;
    let ff = frames % CUESHEET_FRAMES_PER_SECOND;
    format!("{:02}:{:02}:{:02}", minutes, secs, ff)
}

/// Generic metadata for one playable item.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileInfo {
    meta: Vec<MetaField>,
    info: Vec<(String, String)>,
    replay_gain: ReplayGain,
    length: f64,
}

impl FileInfo {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    fn meta_index(&self, name: &str) -> Option<usize> {
        self.meta
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Get the `index`-th value of a field.
    pub fn meta_get(&self, name: &str, index: usize) -> Option<&str> {
        self.meta_index(name)
            .and_then(|i| self.meta[i].values.get(index))
            .map(String::as_str)
    }

    /// Whether a field has a non-empty first value.
    pub fn meta_has_value(&self, name: &str) -> bool {
        self.meta_get(name, 0).is_some_and(|v| !v.is_empty())
    }

    /// Number of values of a field.
    pub fn meta_value_count(&self, name: &str) -> usize {
        self.meta_index(name)
            .map(|i| self.meta[i].values.len())
            .unwrap_or(0)
    }

    /// Append a value to a field, creating the field if needed.
    pub fn meta_add(&mut self, name: &str, value: &str) {
        match self.meta_index(name) {
            Some(i) => self.meta[i].values.push(value.to_string()),
            None => self.meta.push(MetaField {
                name: name.to_string(),
                values: vec![value.to_string()],
            }),
        }
    }

    /// Replace all values of a field with a single value.
    pub fn meta_set(&mut self, name: &str, value: &str) {
        match self.meta_index(name) {
            Some(i) => self.meta[i].values = vec![value.to_string()],
            None => self.meta_add(name, value),
        }
    }

    /// Remove a field entirely.
    pub fn meta_remove(&mut self, name: &str) {
        self.meta.retain(|f| !f.name.eq_ignore_ascii_case(name));
    }

    /// Number of distinct fields.
    pub fn meta_count(&self) -> usize {
        self.meta.len()
    }

    /// Iterate over all fields.
    pub fn meta_fields(&self) -> impl Iterator<Item = &MetaField> {
        self.meta.iter()
    }

    /// Set a technical info field.
    pub fn info_set(&mut self, name: &str, value: &str) {
        match self
            .info
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value.to_string(),
            None => self.info.push((name.to_string(), value.to_string())),
        }
    }

    /// Get a technical info field.
    pub fn info_get(&self, name: &str) -> Option<&str> {
        self.info
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over all info fields.
    pub fn info_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.info.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// ReplayGain values.
    pub fn replay_gain(&self) -> &ReplayGain {
        &self.replay_gain
    }

    /// Mutable ReplayGain values.
    pub fn replay_gain_mut(&mut self) -> &mut ReplayGain {
        &mut self.replay_gain
    }

    /// Set a ReplayGain field from text; invalid values are ignored.
    pub fn set_replaygain_field(&mut self, field: &str, text: &str) -> bool {
        self.replay_gain.set_field(field, text)
    }

    /// Playable length in seconds.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Set the playable length in seconds.
    pub fn set_length(&mut self, seconds: f64) {
        self.length = seconds;
    }
}
