//! Media classification.
//!
//! Decides, for each fetched history item, which counter bucket it belongs
//! to and, for accepted attachments, extracts the [`MediaRecord`] handed to
//! the store. Only videos, audio files, and generic documents are indexed;
//! photos, voice notes, stickers and the rest are unsupported.

use crate::models::{Attachment, AttachmentKind, MediaKind, MediaRecord, RawMessage};

/// Outcome of classifying one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Deleted,
    NoMedia,
    Unsupported,
    Accepted(MediaRecord),
}

/// Classify a history item. Pure and deterministic.
pub fn classify(item: &RawMessage) -> Classification {
    if item.empty {
        return Classification::Deleted;
    }

    let Some(attachment) = &item.media else {
        return Classification::NoMedia;
    };

    let Some(kind) = accepted_kind(&attachment.kind) else {
        return Classification::Unsupported;
    };

    match to_record(kind, attachment, item) {
        Some(record) => Classification::Accepted(record),
        // Announced as media but carries no file payload.
        None => Classification::Unsupported,
    }
}

fn accepted_kind(kind: &AttachmentKind) -> Option<MediaKind> {
    match kind {
        AttachmentKind::Video => Some(MediaKind::Video),
        AttachmentKind::Audio => Some(MediaKind::Audio),
        AttachmentKind::Document => Some(MediaKind::Document),
        _ => None,
    }
}

fn to_record(kind: MediaKind, attachment: &Attachment, item: &RawMessage) -> Option<MediaRecord> {
    let file = attachment.file.as_ref()?;
    if file.file_unique_id.is_empty() {
        return None;
    }

    let caption = item
        .caption
        .as_ref()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    Some(MediaRecord {
        kind,
        file_id: file.file_id.clone(),
        file_unique_id: file.file_unique_id.clone(),
        file_size: file.file_size,
        file_name: file.file_name.clone(),
        search_name: file.file_name.as_deref().map(search_name),
        mime_type: file.mime_type.clone(),
        caption,
        duration: file.duration,
        width: file.width,
        height: file.height,
        message_id: item.id,
    })
}

/// Normalize a file name for search: `_`, `-`, `.` and `+` become spaces,
/// runs of whitespace collapse to one.
pub fn search_name(file_name: &str) -> String {
    file_name
        .replace(['_', '-', '.', '+'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileInfo;

    fn file(unique: &str, name: &str) -> FileInfo {
        FileInfo {
            file_id: format!("id-{}", unique),
            file_unique_id: unique.to_string(),
            file_size: 2048,
            file_name: Some(name.to_string()),
            mime_type: Some("video/mp4".to_string()),
            duration: Some(95),
            width: Some(1280),
            height: Some(720),
        }
    }

    fn message(id: i64, kind: AttachmentKind, file: Option<FileInfo>) -> RawMessage {
        RawMessage {
            id,
            empty: false,
            caption: Some("  Night.Film 2019  ".to_string()),
            media: Some(Attachment { kind, file }),
        }
    }

    #[test]
    fn tombstone_is_deleted() {
        assert_eq!(classify(&RawMessage::tombstone(3)), Classification::Deleted);
    }

    #[test]
    fn plain_text_has_no_media() {
        let item = RawMessage {
            id: 4,
            empty: false,
            caption: Some("just text".into()),
            media: None,
        };
        assert_eq!(classify(&item), Classification::NoMedia);
    }

    #[test]
    fn photos_and_stickers_are_unsupported() {
        for kind in [
            AttachmentKind::Photo,
            AttachmentKind::Sticker,
            AttachmentKind::Voice,
            AttachmentKind::VideoNote,
            AttachmentKind::Animation,
            AttachmentKind::Other("poll".into()),
        ] {
            let item = message(9, kind.clone(), Some(file("u", "a.bin")));
            assert_eq!(classify(&item), Classification::Unsupported, "{:?}", kind);
        }
    }

    #[test]
    fn accepted_kind_without_payload_is_unsupported() {
        let item = message(10, AttachmentKind::Video, None);
        assert_eq!(classify(&item), Classification::Unsupported);
    }

    #[test]
    fn video_is_accepted_with_metadata() {
        let item = message(11, AttachmentKind::Video, Some(file("abc", "Night_Film-2019.mp4")));
        match classify(&item) {
            Classification::Accepted(record) => {
                assert_eq!(record.kind, MediaKind::Video);
                assert_eq!(record.file_unique_id, "abc");
                assert_eq!(record.file_size, 2048);
                assert_eq!(record.caption.as_deref(), Some("Night.Film 2019"));
                assert_eq!(record.search_name.as_deref(), Some("Night Film 2019 mp4"));
                assert_eq!(record.duration, Some(95));
                assert_eq!(record.message_id, 11);
            }
            other => panic!("expected accepted, got {:?}", other),
        }
    }

    #[test]
    fn classification_is_deterministic() {
        let item = message(12, AttachmentKind::Document, Some(file("doc", "notes.pdf")));
        assert_eq!(classify(&item), classify(&item));
    }

    #[test]
    fn search_name_collapses_separators() {
        assert_eq!(search_name("a__b--c..d++e"), "a b c d e");
        assert_eq!(search_name("plain"), "plain");
    }
}
