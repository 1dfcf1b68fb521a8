//! Mapping between container tags and the flat generic metadata model.
//!
//! Reading walks up to three tag records for the selected track and chapter
//! (edition, track, chapter) and folds them into one [`FileInfo`]; writing
//! splits a [`FileInfo`] back into the track or the album and chapter
//! records. Field renames live in one bidirectional table per scope.

use mka_core::metadata::format_significant;
use mka_core::FileInfo;

use crate::catalog::{timecode_to_seconds, Chapter, SegmentInfo};
use crate::tags::{TagLevel, TagRecord, TagStore, TARGET_TYPE_ALBUM, TARGET_TYPE_TRACK};

/// A container field name paired with its generic name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    /// Name inside a `SimpleTag`.
    pub container: &'static str,
    /// Name in [`FileInfo`].
    pub generic: &'static str,
}

const fn map(container: &'static str, generic: &'static str) -> FieldMapping {
    FieldMapping { container, generic }
}

/// Renames applied to chapter and track records.
pub const CHAPTER_FIELDS: &[FieldMapping] = &[
    map("PART_NUMBER", "TRACKNUMBER"),
    map("DATE_RELEASED", "DATE"),
];

/// Renames applied to edition and album records.
pub const EDITION_FIELDS: &[FieldMapping] = &[
    map("TITLE", "ALBUM"),
    map("CATALOG_NUMBER", "CATALOG"),
    map("TOTAL_PARTS", "TOTALTRACKS"),
];

/// Chapter fields with no generic counterpart.
pub const HIDDEN_CHAPTER_FIELDS: &[&str] = &["CDAUDIO_TRACK_FLAGS"];

/// Edition fields with no generic counterpart.
pub const HIDDEN_EDITION_FIELDS: &[&str] = &["___DUMMY___"];

/// Container name of the gain field.
pub const REPLAYGAIN_GAIN: &str = "REPLAYGAIN_GAIN";

/// Container name of the peak field.
pub const REPLAYGAIN_PEAK: &str = "REPLAYGAIN_PEAK";

/// Generic names written to the album record when chapters exist.
const EDITION_FIELD_PREFIXES: &[&str] = &["ALBUM", "SUBALBUM", "DISCID", "CATALOG"];

/// Album fields that bypass the `ALBUM ` prefix.
const ALBUM_PASSTHROUGH_FIELDS: &[&str] = &[
    "DISCID",
    "CATALOG_NUMBER",
    "TOTAL_PARTS",
    "PART_NUMBER",
    "TOTAL_DISCS",
];

const ALBUM_PREFIX: &str = "ALBUM ";

fn contains(list: &[&str], name: &str) -> bool {
    list.iter().any(|n| n.eq_ignore_ascii_case(name))
}

fn to_generic<'a>(table: &[FieldMapping], name: &'a str) -> &'a str {
    table
        .iter()
        .find(|m| m.container.eq_ignore_ascii_case(name))
        .map_or(name, |m| m.generic)
}

fn to_container<'a>(table: &[FieldMapping], name: &'a str) -> &'a str {
    table
        .iter()
        .find(|m| m.generic.eq_ignore_ascii_case(name))
        .map_or(name, |m| m.container)
}

/// Generic name of a chapter-level container field.
pub fn chapter_to_generic(name: &str) -> &str {
    to_generic(CHAPTER_FIELDS, name)
}

/// Chapter-level container name of a generic field.
pub fn generic_to_chapter(name: &str) -> &str {
    to_container(CHAPTER_FIELDS, name)
}

/// Generic name of an edition-level container field.
pub fn edition_to_generic(name: &str) -> &str {
    to_generic(EDITION_FIELDS, name)
}

/// Edition-level container name of a generic field.
pub fn generic_to_edition(name: &str) -> &str {
    if name.eq_ignore_ascii_case("ALBUM") {
        return "TITLE";
    }
    if name.eq_ignore_ascii_case("SUBALBUM") {
        return "SUBTITLE";
    }
    let stripped = match name.get(..ALBUM_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(ALBUM_PREFIX) => &name[ALBUM_PREFIX.len()..],
        _ => name,
    };
    to_container(EDITION_FIELDS, stripped)
}

/// Whether a generic field belongs on the album record.
pub fn is_edition_field(name: &str) -> bool {
    EDITION_FIELD_PREFIXES.iter().any(|prefix| {
        name.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

fn is_replaygain_field(name: &str) -> bool {
    name.eq_ignore_ascii_case(REPLAYGAIN_GAIN) || name.eq_ignore_ascii_case(REPLAYGAIN_PEAK)
}

/// What one simple tag turns into on the generic side.
#[derive(Debug, Clone, PartialEq)]
enum FieldOutcome {
    Meta(String, String),
    ReplayGain(Vec<&'static str>, String),
    Hidden,
}

fn album_field(
    store: &TagStore,
    chapter: Option<&TagRecord>,
    name: &str,
    value: &str,
) -> FieldOutcome {
    let chapter_has = |n: &str| chapter.is_some_and(|r| r.has(n));

    if is_replaygain_field(name) {
        let (album, track) = if name.eq_ignore_ascii_case(REPLAYGAIN_GAIN) {
            ("replaygain_album_gain", "replaygain_track_gain")
        } else {
            ("replaygain_album_peak", "replaygain_track_peak")
        };
        let mut fields = vec![album];
        if chapter.is_none() {
            fields.push(track);
        }
        FieldOutcome::ReplayGain(fields, value.to_string())
    } else if contains(HIDDEN_EDITION_FIELDS, name) {
        FieldOutcome::Hidden
    } else if name.eq_ignore_ascii_case("TITLE") {
        let target = if chapter_has("ALBUM") { "ALBUM TITLE" } else { "ALBUM" };
        FieldOutcome::Meta(target.to_string(), value.to_string())
    } else if contains(ALBUM_PASSTHROUGH_FIELDS, name) {
        FieldOutcome::Meta(edition_to_generic(name).to_string(), value.to_string())
    } else if !store.tags_identical(TagLevel::All, name) || !chapter_has(name) {
        FieldOutcome::Meta(
            format!("{}{}", ALBUM_PREFIX, edition_to_generic(name)),
            value.to_string(),
        )
    } else {
        FieldOutcome::Hidden
    }
}

fn track_field(store: &TagStore, record: &TagRecord, name: &str, value: &str) -> FieldOutcome {
    if is_replaygain_field(name) {
        let field = if name.eq_ignore_ascii_case(REPLAYGAIN_GAIN) {
            "replaygain_track_gain"
        } else {
            "replaygain_track_peak"
        };
        FieldOutcome::ReplayGain(vec![field], value.to_string())
    } else if contains(HIDDEN_CHAPTER_FIELDS, name) {
        FieldOutcome::Hidden
    } else if name.eq_ignore_ascii_case("ALBUM") {
        let target = if !record.has("TITLE") && store.tags_identical(TagLevel::Chapter, "ALBUM") {
            "ALBUM"
        } else {
            "ORIGINAL ALBUM"
        };
        FieldOutcome::Meta(target.to_string(), value.to_string())
    } else {
        FieldOutcome::Meta(chapter_to_generic(name).to_string(), value.to_string())
    }
}

fn apply_outcomes(
    store: &mut TagStore,
    record: usize,
    outcomes: Vec<FieldOutcome>,
    out: &mut FileInfo,
) {
    for (i, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            FieldOutcome::Meta(name, value) => out.meta_add(&name, &value),
            FieldOutcome::ReplayGain(fields, value) => {
                for field in fields {
                    if !out.set_replaygain_field(field, &value) {
                        tracing::debug!(field, value = %value, "ignoring unparsable replay gain");
                    }
                }
            }
            FieldOutcome::Hidden => {
                if let Some(tag) = store
                    .get_mut(record)
                    .and_then(|r| r.simple_tags.get_mut(i))
                {
                    tag.hidden = true;
                }
            }
        }
    }
}

/// Fold an album-level record into `out`.
///
/// `chapter` is the chapter-level record of the same selection, if any; it
/// decides between `ALBUM` and `ALBUM TITLE` and whether a field needs the
/// `ALBUM ` prefix to stay distinct.
pub fn apply_album_tags(
    store: &mut TagStore,
    album: usize,
    chapter: Option<usize>,
    out: &mut FileInfo,
) {
    let outcomes: Vec<FieldOutcome> = {
        let Some(record) = store.get(album) else {
            return;
        };
        let chapter = chapter.and_then(|c| store.get(c));
        record
            .simple_tags
            .iter()
            .map(|t| album_field(store, chapter, &t.name, &t.value))
            .collect()
    };
    apply_outcomes(store, album, outcomes, out);
}

/// Fold a track- or chapter-level record into `out`.
pub fn apply_track_tags(store: &mut TagStore, record: usize, out: &mut FileInfo) {
    let outcomes: Vec<FieldOutcome> = {
        let Some(rec) = store.get(record) else {
            return;
        };
        rec.simple_tags
            .iter()
            .map(|t| track_field(store, rec, &t.name, &t.value))
            .collect()
    };
    apply_outcomes(store, record, outcomes, out);
}

/// What the metadata is being resolved for.
#[derive(Debug, Clone, Copy)]
pub struct InfoTarget<'a> {
    /// UID of the selected track.
    pub track_uid: u64,
    /// UID of the selected edition.
    pub edition_uid: Option<u64>,
    /// Selected chapter.
    pub chapter: Option<&'a Chapter>,
    /// One-based position of the chapter, used for `TRACKNUMBER`.
    pub chapter_number: usize,
}

/// Build the generic metadata of one selection.
///
/// Tags that have no generic counterpart are marked hidden in `store` as a
/// side effect.
pub fn resolve_info(
    segment: &SegmentInfo,
    store: &mut TagStore,
    target: &InfoTarget<'_>,
    out: &mut FileInfo,
) {
    if !segment.muxing_app.is_empty() {
        out.info_set("MUXING_APP", &segment.muxing_app);
    }
    if !segment.writing_app.is_empty() {
        out.info_set("WRITING_APP", &segment.writing_app);
    }
    if !segment.title.is_empty() {
        out.info_set("TITLE", &segment.title);
    }
    if let Some(pregap) = target.chapter.and_then(Chapter::pregap) {
        out.info_set(
            "pregap",
            &mka_core::metadata::format_index_time(timecode_to_seconds(pregap)),
        );
    }

    let track_tag = store.track_tag_index(target.track_uid);
    let chapter_tag = target
        .chapter
        .and_then(|c| store.chapter_tag_index(c.uid, target.track_uid));
    let edition_tag = target
        .edition_uid
        .and_then(|uid| store.edition_tag_index(uid, target.track_uid));

    if let Some(edition) = edition_tag {
        if store.get(edition).map(|r| r.target_type_value) == Some(TARGET_TYPE_ALBUM) {
            apply_album_tags(store, edition, chapter_tag, out);
        }
    }

    if let Some(track) = track_tag {
        match store.get(track).map(|r| r.target_type_value) {
            Some(TARGET_TYPE_ALBUM) => {
                apply_album_tags(store, track, chapter_tag, out);
                if let Some(chapter) = chapter_tag {
                    apply_track_tags(store, chapter, out);
                }
            }
            Some(TARGET_TYPE_TRACK) => apply_track_tags(store, track, out),
            _ => {}
        }
    }

    if let Some(chapter) = target.chapter {
        if !out.meta_has_value("TITLE") {
            if let Some(title) = chapter.title() {
                out.meta_set("TITLE", title);
            }
        }
        if !out.meta_has_value("TRACKNUMBER") {
            out.meta_set("TRACKNUMBER", &target.chapter_number.to_string());
        }
        if !out.meta_has_value("ALBUM") && !segment.title.is_empty() {
            out.meta_set("ALBUM", &segment.title);
        }
    }
}

/// Which records a metadata write replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    /// A file without chapters: everything goes to the track record.
    Track {
        /// UID of the track.
        track_uid: u64,
    },
    /// A chaptered file: album fields to the track record, the rest to the
    /// chapter record.
    Chapter {
        /// UID of the track.
        track_uid: u64,
        /// UID of the chapter.
        chapter_uid: u64,
    },
}

fn set_replaygain(record: &mut TagRecord, gain: Option<f32>, peak: Option<f32>) {
    if let Some(gain) = gain {
        record.set_tag_value(REPLAYGAIN_GAIN, &format_significant(gain), 0);
    }
    if let Some(peak) = peak {
        record.set_tag_value(REPLAYGAIN_PEAK, &format_significant(peak), 0);
    }
}

fn repopulate<F>(record: &mut TagRecord, info: &FileInfo, rename: F)
where
    F: Fn(&str) -> Option<String>,
{
    for field in info.meta_fields() {
        let Some(name) = rename(&field.name) else {
            continue;
        };
        for (index, value) in field.values.iter().enumerate() {
            record.set_tag_value(&name, value, index);
        }
    }
}

/// Replace the tags of `target` with the contents of `info`.
///
/// Each touched record goes through mark, repopulate and purge, so fields
/// removed from `info` disappear while hidden tags and other records stay.
pub fn write_info(store: &mut TagStore, target: WriteTarget, info: &FileInfo) {
    let rg = *info.replay_gain();
    match target {
        WriteTarget::Track { track_uid } => {
            let record = store.track_tag_or_insert(track_uid);
            record.target_type_value = TARGET_TYPE_TRACK;
            record.mark_all_removal_pending();
            repopulate(record, info, |name| {
                Some(generic_to_chapter(&name.to_ascii_uppercase()).to_string())
            });
            set_replaygain(record, rg.track_gain, rg.track_peak);
            record.remove_marked();
        }
        WriteTarget::Chapter {
            track_uid,
            chapter_uid,
        } => {
            let album = store.track_tag_or_insert(track_uid);
            if album.target_type_value == 0 {
                album.target_type_value = TARGET_TYPE_ALBUM;
            }
            album.mark_all_removal_pending();
            repopulate(album, info, |name| {
                is_edition_field(name)
                    .then(|| generic_to_edition(&name.to_ascii_uppercase()).to_string())
            });
            set_replaygain(album, rg.album_gain, rg.album_peak);
            album.remove_marked();

            let chapter = store.chapter_tag_or_insert(chapter_uid, track_uid);
            if chapter.target_type_value == 0 {
                chapter.target_type_value = TARGET_TYPE_TRACK;
            }
            chapter.mark_all_removal_pending();
            repopulate(chapter, info, |name| {
                (!is_edition_field(name))
                    .then(|| generic_to_chapter(&name.to_ascii_uppercase()).to_string())
            });
            set_replaygain(chapter, rg.track_gain, rg.track_peak);
            chapter.remove_marked();
        }
    }
}
