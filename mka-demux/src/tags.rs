//! Tag records and the in-memory tag store.
//!
//! A [`TagRecord`] is one `Tag` element: a set of target UIDs plus its simple
//! tags. Editing follows a mark/repopulate/purge cycle: every simple tag of a
//! record is marked removal-pending, the new values are written with
//! [`TagRecord::set_tag_value`] (which clears the mark on reuse), and whatever
//! is still marked is dropped by [`TagRecord::remove_marked`].

/// `TargetTypeValue` of track-level tags.
pub const TARGET_TYPE_TRACK: u32 = 30;

/// `TargetTypeValue` of album/edition-level tags.
pub const TARGET_TYPE_ALBUM: u32 = 50;

/// Default language of a simple tag.
pub const DEFAULT_TAG_LANGUAGE: &str = "und";

/// One `SimpleTag`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimpleTag {
    /// Upper-cased tag name.
    pub name: String,
    /// String value.
    pub value: String,
    /// Language code.
    pub language: String,
    /// `TagDefault` flag.
    pub default_flag: bool,
    /// Suppressed from the generic view but kept for re-serialization.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub hidden: bool,
    /// Dropped by the next [`TagRecord::remove_marked`].
    #[cfg_attr(feature = "serde", serde(skip))]
    pub removal_pending: bool,
}

impl SimpleTag {
    /// Create a tag with default language and flag.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    /// Case-insensitive name comparison.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl Default for SimpleTag {
    fn default() -> Self {
        Self {
            name: String::new(),
            value: String::new(),
            language: DEFAULT_TAG_LANGUAGE.to_string(),
            default_flag: true,
            hidden: false,
            removal_pending: false,
        }
    }
}

/// Scope of a tag record, derived from its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagScope {
    /// Edition or album level (`TargetTypeValue` 50).
    Album,
    /// Whole-track level (`TargetTypeValue` 30).
    Track,
    /// Chapter level, optionally narrowed to one track UID.
    Chapter(u64),
    /// Attached to an attachment.
    Attachment(u64),
}

/// Record filter used by the identical-value checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagLevel {
    /// Every record.
    All,
    /// Records without a chapter target.
    Edition,
    /// Records with a chapter target.
    Chapter,
}

impl TagLevel {
    fn includes(self, record: &TagRecord) -> bool {
        match self {
            TagLevel::All => true,
            TagLevel::Edition => record.chapter_uid == 0,
            TagLevel::Chapter => record.chapter_uid != 0,
        }
    }
}

/// One `Tag` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TagRecord {
    /// `TagTrackUID`, 0 when absent.
    pub track_uid: u64,
    /// `TagEditionUID`, 0 when absent.
    pub edition_uid: u64,
    /// `TagChapterUID`, 0 when absent.
    pub chapter_uid: u64,
    /// `TagAttachmentUID`, 0 when absent.
    pub attachment_uid: u64,
    /// `TargetTypeValue`, 0 when unset.
    pub target_type_value: u32,
    /// `TargetType`.
    pub target_type: String,
    /// Simple tags in file order.
    pub simple_tags: Vec<SimpleTag>,
}

impl TagRecord {
    /// Create an empty record targeting nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty record targeting a track.
    pub fn for_track(track_uid: u64) -> Self {
        Self {
            track_uid,
            ..Default::default()
        }
    }

    /// Create an empty record targeting a chapter of a track.
    pub fn for_chapter(chapter_uid: u64, track_uid: u64) -> Self {
        Self {
            track_uid,
            chapter_uid,
            ..Default::default()
        }
    }

    /// Scope of this record, `None` when the targets do not pin one down.
    pub fn scope(&self) -> Option<TagScope> {
        if self.attachment_uid != 0 {
            Some(TagScope::Attachment(self.attachment_uid))
        } else if self.chapter_uid != 0 {
            Some(TagScope::Chapter(self.track_uid))
        } else {
            match self.target_type_value {
                TARGET_TYPE_ALBUM => Some(TagScope::Album),
                TARGET_TYPE_TRACK => Some(TagScope::Track),
                _ => None,
            }
        }
    }

    /// First simple tag with `name`.
    pub fn find(&self, name: &str) -> Option<&SimpleTag> {
        self.simple_tags.iter().find(|t| t.is_named(name))
    }

    /// Value of the first simple tag with `name`.
    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.find(name).map(|t| t.value.as_str())
    }

    /// Whether a simple tag named `name` exists.
    pub fn has(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Set the `index`-th value of `name`.
    ///
    /// An existing tag is reused and its removal mark cleared; otherwise a
    /// new tag is appended.
    pub fn set_tag_value(&mut self, name: &str, value: &str, index: usize) {
        let existing = self
            .simple_tags
            .iter_mut()
            .filter(|t| t.is_named(name))
            .nth(index);
        match existing {
            Some(tag) => {
                tag.value = value.to_string();
                tag.removal_pending = false;
            }
            None => self.simple_tags.push(SimpleTag::new(name, value)),
        }
    }

    /// Mark every visible simple tag for removal.
    ///
    /// Hidden tags have no generic counterpart to be rewritten from, so they
    /// are left alone.
    pub fn mark_all_removal_pending(&mut self) {
        for tag in self.simple_tags.iter_mut().filter(|t| !t.hidden) {
            tag.removal_pending = true;
        }
    }

    /// Drop the simple tags still marked for removal.
    pub fn remove_marked(&mut self) {
        self.simple_tags.retain(|t| !t.removal_pending);
    }
}

/// All tag records of a segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TagStore {
    records: Vec<TagRecord>,
}

impl TagStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn push(&mut self, record: TagRecord) {
        self.records.push(record);
    }

    /// All records.
    pub fn records(&self) -> &[TagRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at `index`.
    pub fn get(&self, index: usize) -> Option<&TagRecord> {
        self.records.get(index)
    }

    /// Mutable record at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut TagRecord> {
        self.records.get_mut(index)
    }

    /// Index of the tag targeting only `track_uid`.
    pub fn track_tag_index(&self, track_uid: u64) -> Option<usize> {
        self.records.iter().position(|r| {
            r.track_uid == track_uid
                && r.edition_uid == 0
                && r.chapter_uid == 0
                && r.attachment_uid == 0
        })
    }

    /// Index of the tag of an edition; `track_uid` 0 matches any track.
    pub fn edition_tag_index(&self, edition_uid: u64, track_uid: u64) -> Option<usize> {
        self.records.iter().position(|r| {
            r.edition_uid == edition_uid && (track_uid == 0 || r.track_uid == track_uid)
        })
    }

    /// Index of the tag of a chapter; `track_uid` 0 matches any track.
    pub fn chapter_tag_index(&self, chapter_uid: u64, track_uid: u64) -> Option<usize> {
        self.records.iter().position(|r| {
            r.chapter_uid == chapter_uid && (track_uid == 0 || r.track_uid == track_uid)
        })
    }

    /// Tag targeting only `track_uid`.
    pub fn find_track_tag(&self, track_uid: u64) -> Option<&TagRecord> {
        self.track_tag_index(track_uid).map(|i| &self.records[i])
    }

    /// Tag of an edition.
    pub fn find_edition_tag(&self, edition_uid: u64, track_uid: u64) -> Option<&TagRecord> {
        self.edition_tag_index(edition_uid, track_uid)
            .map(|i| &self.records[i])
    }

    /// Tag of a chapter.
    pub fn find_chapter_tag(&self, chapter_uid: u64, track_uid: u64) -> Option<&TagRecord> {
        self.chapter_tag_index(chapter_uid, track_uid)
            .map(|i| &self.records[i])
    }

    /// Tag targeting only `track_uid`, created if missing.
    pub fn track_tag_or_insert(&mut self, track_uid: u64) -> &mut TagRecord {
        let index = match self.track_tag_index(track_uid) {
            Some(i) => i,
            None => {
                self.records.push(TagRecord::for_track(track_uid));
                self.records.len() - 1
            }
        };
        &mut self.records[index]
    }

    /// Tag of a chapter of a track, created if missing.
    pub fn chapter_tag_or_insert(&mut self, chapter_uid: u64, track_uid: u64) -> &mut TagRecord {
        let index = match self.chapter_tag_index(chapter_uid, track_uid) {
            Some(i) => i,
            None => {
                self.records
                    .push(TagRecord::for_chapter(chapter_uid, track_uid));
                self.records.len() - 1
            }
        };
        &mut self.records[index]
    }

    /// Check whether the records at `level` agree on the value of `name`.
    ///
    /// The first record at that level carrying `name` sets the reference;
    /// later records either omit the name or must match it exactly. A single
    /// carrier is enough.
    pub fn tags_identical(&self, level: TagLevel, name: &str) -> bool {
        let mut reference: Option<&str> = None;
        for record in self.records.iter().filter(|r| level.includes(r)) {
            match (reference, record.value_of(name)) {
                (None, value) => reference = value,
                (Some(expected), Some(value)) if value != expected => return false,
                _ => {}
            }
        }
        reference.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(chapter_uid: u64, tags: &[(&str, &str)]) -> TagRecord {
        TagRecord {
            track_uid: 1,
            chapter_uid,
            target_type_value: TARGET_TYPE_ALBUM,
            simple_tags: tags.iter().map(|(n, v)| SimpleTag::new(*n, *v)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_simple_tag_defaults() {
        let tag = SimpleTag::new("ARTIST", "x");
        assert_eq!(tag.language, "und");
        assert!(tag.default_flag);
        assert!(tag.is_named("artist"));
    }

    #[test]
    fn test_set_tag_value_reuses_nth_match() {
        let mut rec = record(0, &[("ARTIST", "a"), ("TITLE", "t"), ("ARTIST", "b")]);
        rec.mark_all_removal_pending();
        rec.set_tag_value("artist", "B", 1);
        rec.set_tag_value("ARTIST", "C", 2);
        rec.remove_marked();

        let values: Vec<_> = rec.simple_tags.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["B", "C"]);
    }

    #[test]
    fn test_hidden_tags_survive_purge() {
        let mut rec = record(0, &[("CDAUDIO_TRACK_FLAGS", "0"), ("TITLE", "t")]);
        rec.simple_tags[0].hidden = true;
        rec.mark_all_removal_pending();
        rec.remove_marked();
        assert_eq!(rec.simple_tags.len(), 1);
        assert!(rec.has("CDAUDIO_TRACK_FLAGS"));
    }

    #[test]
    fn test_scope() {
        let mut rec = TagRecord::new();
        assert_eq!(rec.scope(), None);
        rec.target_type_value = TARGET_TYPE_TRACK;
        assert_eq!(rec.scope(), Some(TagScope::Track));
        rec.target_type_value = TARGET_TYPE_ALBUM;
        assert_eq!(rec.scope(), Some(TagScope::Album));
        rec.chapter_uid = 9;
        rec.track_uid = 4;
        assert_eq!(rec.scope(), Some(TagScope::Chapter(4)));
        rec.attachment_uid = 2;
        assert_eq!(rec.scope(), Some(TagScope::Attachment(2)));
    }

    #[test]
    fn test_lookups_first_match_wins() {
        let mut store = TagStore::new();
        store.push(TagRecord {
            track_uid: 1,
            edition_uid: 5,
            ..Default::default()
        });
        store.push(TagRecord::for_track(1));
        store.push(TagRecord::for_chapter(7, 1));
        store.push(TagRecord::for_chapter(7, 2));

        assert_eq!(store.track_tag_index(1), Some(1));
        assert_eq!(store.track_tag_index(2), None);
        assert_eq!(store.edition_tag_index(5, 0), Some(0));
        assert_eq!(store.edition_tag_index(5, 3), None);
        assert_eq!(store.chapter_tag_index(7, 0), Some(2));
        assert_eq!(store.chapter_tag_index(7, 2), Some(3));
    }

    #[test]
    fn test_or_insert() {
        let mut store = TagStore::new();
        store.track_tag_or_insert(3).target_type_value = TARGET_TYPE_TRACK;
        store.track_tag_or_insert(3).set_tag_value("TITLE", "x", 0);
        assert_eq!(store.len(), 1);
        assert_eq!(store.find_track_tag(3).and_then(|r| r.value_of("title")), Some("x"));

        store.chapter_tag_or_insert(8, 3);
        assert_eq!(store.len(), 2);
        assert!(store.find_chapter_tag(8, 3).is_some());
    }

    #[test]
    fn test_tags_identical() {
        let mut store = TagStore::new();
        store.push(record(0, &[("ARTIST", "x")]));
        store.push(record(1, &[("ARTIST", "x"), ("ALBUM", "a")]));
        store.push(record(2, &[("ALBUM", "b")]));

        assert!(store.tags_identical(TagLevel::All, "ARTIST"));
        assert!(!store.tags_identical(TagLevel::All, "ALBUM"));
        assert!(!store.tags_identical(TagLevel::Chapter, "ALBUM"));
        assert!(store.tags_identical(TagLevel::Edition, "ARTIST"));
        assert!(!store.tags_identical(TagLevel::Edition, "ALBUM"));
        assert!(!store.tags_identical(TagLevel::All, "GENRE"));
    }

    #[test]
    fn test_tags_identical_single_carrier() {
        let mut store = TagStore::new();
        store.push(record(1, &[("GENRE", "rock")]));
        store.push(record(2, &[]));
        assert!(store.tags_identical(TagLevel::Chapter, "GENRE"));
        // values compare exactly
        store.push(record(3, &[("GENRE", "Rock")]));
        assert!(!store.tags_identical(TagLevel::Chapter, "GENRE"));
    }
}
