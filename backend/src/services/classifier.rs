//! Media classifier
//!
//! Decides from a drive entry's declared MIME type and filename whether it is a
//! video worth cataloging. No content sniffing: a text file renamed to `.mp4`
//! is accepted, a video with an unknown extension and a generic MIME type is not.

/// Video file extensions we recognize (compared case-insensitively)
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "webm", "m4v", "mov", "wmv"];

/// True if the entry should be cataloged as a media item
pub fn is_media(declared_mime_type: &str, filename: &str) -> bool {
    has_video_mime(declared_mime_type) || has_video_extension(filename)
}

fn has_video_mime(mime: &str) -> bool {
    mime.trim()
        .get(..6)
        .is_some_and(|major| major.eq_ignore_ascii_case("video/"))
}

fn has_video_extension(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => VIDEO_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)),
        None => false,
    }
}
