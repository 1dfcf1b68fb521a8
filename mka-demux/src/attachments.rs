//! Attached files.
//!
//! Attachments are located during the structural parse but their payload is
//! only read on request. An attachment can also be addressed through a
//! virtual path of the form `matroska://<container>|<name>`.

use std::fmt;

use crate::elements::{
    ATTACHED_FILE, FILE_DATA, FILE_DESCRIPTION, FILE_MEDIA_TYPE, FILE_NAME, FILE_UID,
};
use crate::error::Result;
use crate::io::ByteStream;
use crate::reader::{Element, ElementReader};

/// Scheme prefix of attachment paths.
pub const PATH_SCHEME: &str = "matroska://";

/// Separator between the container path and the attachment name.
pub const PATH_SEPARATOR: char = '|';

/// Container extensions that can carry attachments.
const CONTAINER_EXTENSIONS: &[&str] = &["mka", "mkv"];

/// One `AttachedFile`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attachment {
    /// File name.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Human-readable description.
    pub description: String,
    /// File UID.
    pub uid: u64,
    /// Absolute offset of the payload.
    pub data_start: u64,
    /// Payload length in bytes.
    pub data_size: u64,
}

/// Parse the children of an `Attachments` element the reader has entered.
pub(crate) fn parse_attachments<S: ByteStream>(
    reader: &mut ElementReader<S>,
    depth: usize,
) -> Result<Vec<Attachment>> {
    let mut attachments = Vec::new();
    while let Some(child) = reader.next_child(depth)? {
        if child.id != ATTACHED_FILE {
            reader.skip(&child)?;
            continue;
        }
        let inner = reader.enter(&child)?;
        if let Some(attachment) = parse_attached_file(reader, inner)? {
            attachments.push(attachment);
        }
    }
    Ok(attachments)
}

fn parse_attached_file<S: ByteStream>(
    reader: &mut ElementReader<S>,
    depth: usize,
) -> Result<Option<Attachment>> {
    let mut attachment = Attachment::default();
    let mut data: Option<Element> = None;

    while let Some(child) = reader.next_child(depth)? {
        match child.id {
            FILE_NAME => attachment.name = reader.read_string(&child)?,
            FILE_MEDIA_TYPE => attachment.mime_type = reader.read_string(&child)?,
            FILE_DESCRIPTION => attachment.description = reader.read_string(&child)?,
            FILE_UID => attachment.uid = reader.read_uint(&child)?,
            FILE_DATA => {
                // located only, never copied at parse time
                data = Some(child);
                reader.skip(&child)?;
            }
            _ => reader.skip(&child)?,
        }
    }

    let Some(size) = data.and_then(|d| d.size) else {
        tracing::debug!(name = %attachment.name, "attached file without data, ignored");
        return Ok(None);
    };
    if let Some(data) = data {
        attachment.data_start = data.data_start();
    }
    attachment.data_size = size;
    Ok(Some(attachment))
}

/// Read an attachment's payload.
pub fn read_attachment<S: ByteStream>(
    reader: &mut ElementReader<S>,
    attachment: &Attachment,
) -> Result<Vec<u8>> {
    let element = Element {
        id: FILE_DATA,
        position: attachment.data_start,
        header_size: 0,
        size: Some(attachment.data_size),
    };
    reader.read_bytes(&element)
}

/// Find an attachment by name, ignoring case.
pub fn find_attachment<'a>(attachments: &'a [Attachment], name: &str) -> Option<&'a Attachment> {
    attachments
        .iter()
        .find(|a| a.name.to_lowercase() == name.to_lowercase())
}

/// A virtual path naming one attachment of a container file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPath {
    /// Path of the container file.
    pub container: String,
    /// Attachment name.
    pub name: String,
}

impl AttachmentPath {
    /// Create a path from its parts.
    pub fn new(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }

    /// Whether `path` looks like an attachment path.
    pub fn is_attachment_path(path: &str) -> bool {
        Self::parse(path).is_some()
    }

    /// Split a virtual path into container and attachment name.
    ///
    /// The scheme prefix is optional; the container must have a Matroska
    /// extension and the name must not be empty.
    pub fn parse(path: &str) -> Option<Self> {
        let (container, name) = strip_scheme(path).rsplit_once(PATH_SEPARATOR)?;
        let name = name.trim_start_matches(['\\', '/']);
        if name.is_empty() || !has_container_extension(container) {
            return None;
        }
        Some(Self::new(container, name))
    }

    /// `<container>|<name>`, without the scheme.
    pub fn display_path(&self) -> String {
        format!("{}{}{}", self.container, PATH_SEPARATOR, self.name)
    }
}

impl fmt::Display for AttachmentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", PATH_SCHEME, self.display_path())
    }
}

fn strip_scheme(path: &str) -> &str {
    match path.get(..PATH_SCHEME.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(PATH_SCHEME) => &path[PATH_SCHEME.len()..],
        _ => path,
    }
}

fn has_container_extension(path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            CONTAINER_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebml;
    use crate::elements::ATTACHMENTS;
    use std::io::Cursor;

    fn el(id: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        ebml::write_element_id(&mut out, id).unwrap();
        ebml::write_vint(&mut out, payload.len() as u64).unwrap();
        out.extend_from_slice(payload);
        out
    }

    fn attachments_element() -> Vec<u8> {
        let mut file = el(FILE_NAME, b"cover.jpg");
        file.extend(el(FILE_MEDIA_TYPE, b"image/jpeg"));
        file.extend(el(FILE_DESCRIPTION, b"Front"));
        file.extend(el(FILE_UID, &[0x2A]));
        file.extend(el(FILE_DATA, &[1, 2, 3, 4]));
        let mut no_data = el(FILE_NAME, b"empty.txt");
        no_data.extend(el(FILE_UID, &[1]));
        let mut payload = el(ATTACHED_FILE, &file);
        payload.extend(el(ATTACHED_FILE, &no_data));
        el(ATTACHMENTS, &payload)
    }

    #[test]
    fn test_parse_and_read_attachment() {
        let data = attachments_element();
        let mut reader =
            ElementReader::new(Cursor::new(data), ebml::MAX_RECURSION_DEPTH).unwrap();
        let top = reader.read_header().unwrap().unwrap();
        let depth = reader.enter(&top).unwrap();
        let list = parse_attachments(&mut reader, depth).unwrap();

        assert_eq!(list.len(), 1);
        let cover = &list[0];
        assert_eq!(cover.name, "cover.jpg");
        assert_eq!(cover.mime_type, "image/jpeg");
        assert_eq!(cover.description, "Front");
        assert_eq!(cover.uid, 42);
        assert_eq!(cover.data_size, 4);

        assert_eq!(read_attachment(&mut reader, cover).unwrap(), vec![1, 2, 3, 4]);
        assert!(find_attachment(&list, "COVER.JPG").is_some());
        assert!(find_attachment(&list, "back.jpg").is_none());
    }

    #[test]
    fn test_attachment_path_round_trip() {
        let path = AttachmentPath::new("/music/album.mka", "cover.jpg");
        assert_eq!(path.to_string(), "matroska:///music/album.mka|cover.jpg");
        assert_eq!(path.display_path(), "/music/album.mka|cover.jpg");
        assert_eq!(AttachmentPath::parse(&path.to_string()), Some(path));
    }

    #[test]
    fn test_attachment_path_parse() {
        let parsed = AttachmentPath::parse("MATROSKA://C:\\a|b\\x.MKV|\\notes.txt").unwrap();
        assert_eq!(parsed.container, "C:\\a|b\\x.MKV");
        assert_eq!(parsed.name, "notes.txt");

        let bare = AttachmentPath::parse("/tmp/x.mkv|cover.png").unwrap();
        assert_eq!(bare.container, "/tmp/x.mkv");

        assert!(AttachmentPath::parse("/tmp/x.mkv").is_none());
        assert!(AttachmentPath::parse("matroska:///tmp/x.mp4|a.jpg").is_none());
        assert!(AttachmentPath::parse("matroska:///tmp/x.mka|").is_none());
        assert!(!AttachmentPath::is_attachment_path("/tmp/song.flac"));
    }
}
