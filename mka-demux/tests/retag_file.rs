//! Tag rewrites against real files.

mod common;

use std::fs::File;
use std::io::Write;
use std::path::Path;

use common::AudioFile;
use mka_core::{AbortSignal, FileInfo};
use mka_demux::{DemuxerConfig, InputConfig, MkaDemuxer, MkaInput, OpenMode};
use tempfile::NamedTempFile;

fn temp_file(bytes: &[u8]) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".mka").tempfile().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

fn open(path: &Path, mode: OpenMode) -> MkaInput<mka_demux::Abortable<File>> {
    MkaInput::open_path(path, mode, &InputConfig::default(), &AbortSignal::new()).unwrap()
}

fn frame_count(path: &Path) -> usize {
    let mut demuxer = MkaDemuxer::open(File::open(path).unwrap(), DemuxerConfig::default()).unwrap();
    let mut count = 0;
    while demuxer.read_frame().unwrap().is_some() {
        count += 1;
    }
    count
}

#[test]
fn test_retag_untagged_file() {
    let file = temp_file(&AudioFile::default().build());

    let mut input = open(file.path(), OpenMode::Retag);
    let mut info = input.file_info(0).unwrap();
    assert_eq!(info.meta_get("TITLE", 0), None);
    info.meta_set("TITLE", "Opening");
    info.meta_set("ARTIST", "Quartet");
    info.meta_set("DATE", "1999");
    input.set_info(0, &info).unwrap();
    input.commit().unwrap();
    drop(input);

    let bytes = std::fs::read(file.path()).unwrap();
    assert!(bytes.windows(13).any(|w| w == b"DATE_RELEASED"));

    let mut reopened = open(file.path(), OpenMode::Info);
    let info = reopened.file_info(0).unwrap();
    assert_eq!(info.meta_get("TITLE", 0), Some("Opening"));
    assert_eq!(info.meta_get("ARTIST", 0), Some("Quartet"));
    assert_eq!(info.meta_get("DATE", 0), Some("1999"));
    assert_eq!(info.info_get("codec"), Some("A_TEST"));

    assert_eq!(frame_count(file.path()), 20);
}

#[test]
fn test_retag_twice_replaces_fields() {
    let file = temp_file(&AudioFile::default().build());

    let mut input = open(file.path(), OpenMode::Retag);
    let mut info = FileInfo::new();
    info.meta_set("TITLE", "Opening");
    info.meta_set("ARTIST", "Quartet");
    input.set_info(0, &info).unwrap();
    input.commit().unwrap();
    drop(input);

    let mut input = open(file.path(), OpenMode::Retag);
    let mut info = input.file_info(0).unwrap();
    info.meta_remove("ARTIST");
    info.meta_set("TITLE", "Encore");
    input.set_info(0, &info).unwrap();
    input.commit().unwrap();
    drop(input);

    let mut reopened = open(file.path(), OpenMode::Info);
    let info = reopened.file_info(0).unwrap();
    assert_eq!(info.meta_get("TITLE", 0), Some("Encore"));
    assert!(!info.meta_has_value("ARTIST"));
    assert_eq!(reopened.demuxer().tags().len(), 1);

    assert_eq!(frame_count(file.path()), 20);
}

#[test]
fn test_info_mode_cannot_commit() {
    let file = temp_file(&AudioFile::default().build());
    let before = std::fs::read(file.path()).unwrap();

    let mut input = open(file.path(), OpenMode::Info);
    let mut info = FileInfo::new();
    info.meta_set("TITLE", "Opening");
    input.set_info(0, &info).unwrap();
    assert!(input.commit().is_err());

    assert_eq!(std::fs::read(file.path()).unwrap(), before);
}

#[test]
fn test_rejected_paths() {
    let file = tempfile::Builder::new().suffix(".flac").tempfile().unwrap();
    let err = MkaInput::open_path(
        file.path(),
        OpenMode::Info,
        &InputConfig::default(),
        &AbortSignal::new(),
    )
    .unwrap_err();
    assert!(matches!(err, mka_core::Error::UnsupportedFormat(_)));

    let config = InputConfig::default().with_extension("flac");
    let err = MkaInput::open_path(file.path(), OpenMode::Info, &config, &AbortSignal::new())
        .unwrap_err();
    assert!(!matches!(err, mka_core::Error::UnsupportedFormat(_)));
}
