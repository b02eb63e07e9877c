//! Selection-time validation: type allow-lists, size caps, and header checks
//! for detecting files that are not what their name claims.

use crate::config::{UploadContext, UploadSettings};
use crate::content_type::ContentType;
use crate::link_import::RemoteFile;
use crate::upload::types::SelectedFile;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// Extensions that are never accepted, regardless of claimed MIME type.
const BLOCKED_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "pif", "scr", "vbs", "vbe", "js", "jse", "jar", "msi", "dll",
    "php", "phtml", "asp", "aspx", "jsp", "pl", "py", "rb", "sh", "ps1", "cgi", "wsf", "app",
];

/// Validation rules for one upload context.
#[derive(Debug, Clone)]
pub struct ValidationRules {
    context: UploadContext,
    max_file_size_bytes: u64,
}

impl ValidationRules {
    pub fn for_context(settings: &UploadSettings) -> Self {
        Self {
            context: settings.context,
            max_file_size_bytes: settings.max_file_size_bytes(),
        }
    }

    /// Whether this context accepts the given content type.
    ///
    /// Pitch uploads are audio deliverables only. Client portals also take
    /// documents (briefs, PDFs). Project uploads additionally accept artwork
    /// images.
    pub fn allows(&self, content_type: &ContentType) -> bool {
        match self.context {
            UploadContext::Pitches => content_type.is_audio(),
            UploadContext::ClientPortals => {
                content_type.is_audio() || content_type.is_document()
            }
            UploadContext::Global | UploadContext::Projects => {
                content_type.is_audio() || content_type.is_image() || content_type.is_document()
            }
        }
    }

    /// Validate a locally selected file. Returns its resolved content type.
    pub fn check(&self, file: &SelectedFile) -> Result<ContentType, String> {
        let extension = extension_of(&file.name);
        if BLOCKED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(format!("File type not allowed: .{}", extension));
        }

        let content_type = resolve_content_type(&file.mime_type, &extension);
        if !self.allows(&content_type) {
            return Err(format!(
                "File type {} is not accepted for {} uploads",
                content_type.display_name(),
                self.context
            ));
        }

        if file.size > self.max_file_size_bytes {
            return Err(format!(
                "File '{}' is too large. Maximum size: {}MB",
                file.name,
                self.max_file_size_bytes / 1024 / 1024
            ));
        }

        // Header check catches renamed files; skipped when the handle has no
        // readable backing file yet (e.g. a picker that streams on demand).
        if file.path.is_file() {
            match header_matches(&file.path, &content_type) {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Header mismatch for '{}' ({})", file.name, content_type);
                    return Err(format!(
                        "File '{}' does not look like {}",
                        file.name,
                        content_type.display_name()
                    ));
                }
                Err(e) => {
                    return Err(format!("Could not read '{}': {}", file.name, e));
                }
            }
        }

        Ok(content_type)
    }

    /// Validate a remote manifest entry. Sizes are only checked when the
    /// provider reported one; header checks happen after download.
    pub fn check_remote(&self, file: &RemoteFile) -> Result<ContentType, String> {
        let extension = extension_of(&file.filename);
        if BLOCKED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(format!("File type not allowed: .{}", extension));
        }

        let claimed = file.mime_type.as_deref().unwrap_or("");
        let content_type = resolve_content_type(claimed, &extension);
        if !self.allows(&content_type) {
            return Err(format!(
                "File type {} is not accepted for {} uploads",
                content_type.display_name(),
                self.context
            ));
        }

        if let Some(size) = file.size_bytes {
            if size > self.max_file_size_bytes {
                return Err(format!(
                    "File '{}' is too large. Maximum size: {}MB",
                    file.filename,
                    self.max_file_size_bytes / 1024 / 1024
                ));
            }
        }

        Ok(content_type)
    }
}

fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Resolve the claimed MIME type against the filename extension.
/// An absent or generic claim falls back to the extension.
fn resolve_content_type(claimed_mime: &str, extension: &str) -> ContentType {
    let claimed = ContentType::from_mime(claimed_mime);
    match claimed {
        ContentType::OctetStream | ContentType::Other(_) => {
            ContentType::from_extension(extension)
        }
        _ => claimed,
    }
}

/// Check that a file's leading bytes match its content type.
///
/// Simple magic-byte checks, no deep parsing. Types without a reliable
/// signature are assumed valid.
pub fn header_matches(path: &Path, content_type: &ContentType) -> io::Result<bool> {
    let file_size = fs::metadata(path)?.len();
    if file_size == 0 {
        return Ok(false);
    }

    // Longest signature checked is WEBP/WAVE at 12 bytes
    let mut buf = [0u8; 12];
    let mut file = fs::File::open(path)?;
    let bytes_read = file.read(&mut buf)?;

    let ok = match content_type {
        ContentType::Mpeg => {
            // ID3 tag or an MPEG frame sync
            bytes_read >= 3
                && (&buf[0..3] == b"ID3" || (buf[0] == 0xFF && (buf[1] & 0xE0) == 0xE0))
        }
        ContentType::Wav => {
            // RIFF____WAVE
            bytes_read >= 12 && &buf[0..4] == b"RIFF" && &buf[8..12] == b"WAVE"
        }
        ContentType::Flac => bytes_read >= 4 && &buf[0..4] == b"fLaC",
        ContentType::Ogg => bytes_read >= 4 && &buf[0..4] == b"OggS",
        ContentType::Jpeg => {
            // FF D8 FF
            bytes_read >= 3 && buf[0] == 0xFF && buf[1] == 0xD8 && buf[2] == 0xFF
        }
        ContentType::Png => {
            bytes_read >= 8 && buf[..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]
        }
        ContentType::Gif => bytes_read >= 4 && &buf[0..4] == b"GIF8",
        ContentType::Webp => {
            // RIFF____WEBP
            bytes_read >= 12 && &buf[0..4] == b"RIFF" && &buf[8..12] == b"WEBP"
        }
        ContentType::Pdf => bytes_read >= 4 && &buf[0..4] == b"%PDF",
        // M4A/MP4/AAC/WebM audio and text have container layouts we don't
        // probe here; assume valid.
        _ => true,
    };
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn rules_for(context: UploadContext) -> ValidationRules {
        ValidationRules::for_context(&Config::default().settings_for(context))
    }

    fn write_temp_file(extension: &str, data: &[u8]) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{}", extension))
            .tempfile()
            .unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    fn selected(name: &str, size: u64, mime: &str) -> SelectedFile {
        SelectedFile::new(name, size, mime, PathBuf::from(format!("/nonexistent/{}", name)))
    }

    #[test]
    fn blocked_extension_rejected_regardless_of_mime() {
        let rules = rules_for(UploadContext::Projects);
        let err = rules
            .check(&selected("setup.exe", 100, "audio/mpeg"))
            .unwrap_err();
        assert!(err.contains(".exe"), "unexpected: {}", err);

        for name in ["deploy.ps1", "page.aspx", "script.rb", "tool.py"] {
            assert!(
                rules.check(&selected(name, 100, "audio/mpeg")).is_err(),
                "{} should be blocked",
                name
            );
        }
    }

    #[test]
    fn audio_accepted_in_all_contexts() {
        for context in [
            UploadContext::Global,
            UploadContext::Projects,
            UploadContext::Pitches,
            UploadContext::ClientPortals,
        ] {
            let rules = rules_for(context);
            assert_eq!(
                rules.check(&selected("mix.mp3", 100, "audio/mpeg")).unwrap(),
                ContentType::Mpeg
            );
        }
    }

    #[test]
    fn pitches_accept_audio_only() {
        let rules = rules_for(UploadContext::Pitches);
        let err = rules
            .check(&selected("cover.png", 100, "image/png"))
            .unwrap_err();
        assert!(err.contains("PNG"), "unexpected: {}", err);
        assert!(rules
            .check(&selected("notes.pdf", 100, "application/pdf"))
            .is_err());
    }

    #[test]
    fn client_portals_accept_documents_but_not_images() {
        let rules = rules_for(UploadContext::ClientPortals);
        assert!(rules
            .check(&selected("brief.pdf", 100, "application/pdf"))
            .is_ok());
        assert!(rules
            .check(&selected("notes.txt", 100, "text/plain"))
            .is_ok());
        let err = rules
            .check(&selected("cover.png", 100, "image/png"))
            .unwrap_err();
        assert!(err.contains("PNG"), "unexpected: {}", err);
    }

    #[test]
    fn projects_accept_images_and_documents() {
        let rules = rules_for(UploadContext::Projects);
        assert!(rules.check(&selected("cover.png", 100, "image/png")).is_ok());
        assert!(rules
            .check(&selected("notes.pdf", 100, "application/pdf"))
            .is_ok());
    }

    #[test]
    fn oversized_file_rejected() {
        let rules = rules_for(UploadContext::Projects);
        let err = rules
            .check(&selected("huge.wav", 501 * 1024 * 1024, "audio/wav"))
            .unwrap_err();
        assert!(err.contains("too large"), "unexpected: {}", err);
    }

    #[test]
    fn generic_mime_falls_back_to_extension() {
        let rules = rules_for(UploadContext::Projects);
        assert_eq!(
            rules
                .check(&selected("stems.flac", 100, "application/octet-stream"))
                .unwrap(),
            ContentType::Flac
        );
    }

    #[test]
    fn unknown_type_rejected() {
        let rules = rules_for(UploadContext::Projects);
        assert!(rules
            .check(&selected("archive.zip", 100, "application/octet-stream"))
            .is_err());
    }

    #[test]
    fn header_check_rejects_renamed_file() {
        let rules = rules_for(UploadContext::Projects);
        // PDF bytes behind an .mp3 name
        let file = write_temp_file("mp3", b"%PDF-1.4 not audio at all");
        let candidate = SelectedFile::new(
            "fake.mp3",
            25,
            "audio/mpeg",
            file.path().to_path_buf(),
        );
        let err = rules.check(&candidate).unwrap_err();
        assert!(err.contains("does not look like"), "unexpected: {}", err);
    }

    #[test]
    fn header_check_accepts_real_signatures() {
        let cases: Vec<(&str, &[u8], ContentType)> = vec![
            ("mp3", b"ID3\x04\x00\x00\x00\x00\x00\x00", ContentType::Mpeg),
            ("flac", b"fLaC\x00\x00\x00\x22", ContentType::Flac),
            ("wav", b"RIFF\x24\x00\x00\x00WAVEfmt ", ContentType::Wav),
            ("jpg", &[0xFF, 0xD8, 0xFF, 0xE0], ContentType::Jpeg),
            ("pdf", b"%PDF-1.7", ContentType::Pdf),
        ];
        for (ext, data, content_type) in cases {
            let file = write_temp_file(ext, data);
            assert!(
                header_matches(file.path(), &content_type).unwrap(),
                "expected valid {} header",
                content_type
            );
        }
    }

    #[test]
    fn header_check_rejects_empty_file() {
        let file = write_temp_file("mp3", &[]);
        assert!(!header_matches(file.path(), &ContentType::Mpeg).unwrap());
    }

    #[test]
    fn mp3_frame_sync_without_id3_accepted() {
        let file = write_temp_file("mp3", &[0xFF, 0xFB, 0x90, 0x00]);
        assert!(header_matches(file.path(), &ContentType::Mpeg).unwrap());
    }

    #[test]
    fn remote_entry_without_size_passes_size_check() {
        let rules = rules_for(UploadContext::Projects);
        let entry = RemoteFile {
            filename: "session.wav".to_string(),
            size_bytes: None,
            mime_type: None,
            download_url: "https://example.invalid/session.wav".to_string(),
        };
        assert_eq!(rules.check_remote(&entry).unwrap(), ContentType::Wav);
    }

    #[test]
    fn remote_blocked_extension_rejected() {
        let rules = rules_for(UploadContext::Projects);
        let entry = RemoteFile {
            filename: "payload.scr".to_string(),
            size_bytes: Some(10),
            mime_type: None,
            download_url: "https://example.invalid/payload.scr".to_string(),
        };
        assert!(rules.check_remote(&entry).is_err());
    }
}
