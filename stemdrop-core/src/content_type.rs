use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Content type for files moving through the upload engine.
///
/// Wraps MIME types as an enum for type-safe comparisons.
/// Carried on transfer items and serialized as MIME type strings in events.
#[derive(Clone, Debug, PartialEq)]
pub enum ContentType {
    // Audio
    Mpeg,
    Wav,
    Flac,
    Aac,
    Ogg,
    M4a,
    Mp4Audio,
    WebmAudio,
    // Images
    Jpeg,
    Png,
    Gif,
    Webp,
    // Documents
    Pdf,
    PlainText,
    // Other
    OctetStream,
    Other(String),
}

impl ContentType {
    /// MIME type string (e.g., "audio/mpeg", "application/pdf").
    pub fn as_str(&self) -> &str {
        match self {
            Self::Mpeg => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Flac => "audio/flac",
            Self::Aac => "audio/aac",
            Self::Ogg => "audio/ogg",
            Self::M4a => "audio/x-m4a",
            Self::Mp4Audio => "audio/mp4",
            Self::WebmAudio => "audio/webm",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Pdf => "application/pdf",
            Self::PlainText => "text/plain",
            Self::OctetStream => "application/octet-stream",
            Self::Other(s) => s,
        }
    }

    /// Parse from a MIME type string (as reported by the file selection provider).
    pub fn from_mime(s: &str) -> Self {
        match s {
            "audio/mpeg" => Self::Mpeg,
            "audio/wav" | "audio/x-wav" => Self::Wav,
            "audio/flac" => Self::Flac,
            "audio/aac" => Self::Aac,
            "audio/ogg" => Self::Ogg,
            "audio/x-m4a" => Self::M4a,
            "audio/mp4" => Self::Mp4Audio,
            "audio/webm" => Self::WebmAudio,
            "image/jpeg" => Self::Jpeg,
            "image/png" => Self::Png,
            "image/gif" => Self::Gif,
            "image/webp" => Self::Webp,
            "application/pdf" => Self::Pdf,
            "text/plain" => Self::PlainText,
            "application/octet-stream" => Self::OctetStream,
            other => Self::Other(other.to_string()),
        }
    }

    /// Map a file extension to its content type.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "mp3" => Self::Mpeg,
            "wav" => Self::Wav,
            "flac" => Self::Flac,
            "aac" => Self::Aac,
            "ogg" | "oga" => Self::Ogg,
            "m4a" => Self::M4a,
            "mp4" => Self::Mp4Audio,
            "webm" => Self::WebmAudio,
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "gif" => Self::Gif,
            "webp" => Self::Webp,
            "pdf" => Self::Pdf,
            "txt" => Self::PlainText,
            _ => Self::OctetStream,
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            Self::Mpeg
                | Self::Wav
                | Self::Flac
                | Self::Aac
                | Self::Ogg
                | Self::M4a
                | Self::Mp4Audio
                | Self::WebmAudio
        ) || matches!(self, Self::Other(s) if s.starts_with("audio/"))
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Png | Self::Gif | Self::Webp)
            || matches!(self, Self::Other(s) if s.starts_with("image/"))
    }

    pub fn is_document(&self) -> bool {
        matches!(self, Self::Pdf | Self::PlainText)
    }

    /// Short human-readable name for surfacing in error messages (e.g., "MP3", "PDF").
    pub fn display_name(&self) -> &str {
        match self {
            Self::Mpeg => "MP3",
            Self::Wav => "WAV",
            Self::Flac => "FLAC",
            Self::Aac => "AAC",
            Self::Ogg => "OGG",
            Self::M4a => "M4A",
            Self::Mp4Audio => "MP4",
            Self::WebmAudio => "WebM",
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Gif => "GIF",
            Self::Webp => "WebP",
            Self::Pdf => "PDF",
            Self::PlainText => "Text",
            Self::OctetStream => "Binary",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ContentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ContentType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ContentType::from_mime(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_extension_audio() {
        assert_eq!(ContentType::from_extension("mp3"), ContentType::Mpeg);
        assert_eq!(ContentType::from_extension("MP3"), ContentType::Mpeg);
        assert_eq!(ContentType::from_extension("flac"), ContentType::Flac);
        assert_eq!(ContentType::from_extension("m4a"), ContentType::M4a);
    }

    #[test]
    fn from_extension_unknown_is_binary() {
        assert_eq!(ContentType::from_extension("exe"), ContentType::OctetStream);
        assert_eq!(ContentType::from_extension("zip"), ContentType::OctetStream);
    }

    #[test]
    fn from_mime_wav_alias() {
        assert_eq!(ContentType::from_mime("audio/x-wav"), ContentType::Wav);
        assert_eq!(ContentType::from_mime("audio/wav"), ContentType::Wav);
    }

    #[test]
    fn roundtrip() {
        let ct = ContentType::Flac;
        assert_eq!(ContentType::from_mime(ct.as_str()), ct);

        let ct = ContentType::Pdf;
        assert_eq!(ContentType::from_mime(ct.as_str()), ct);
    }

    #[test]
    fn predicates() {
        assert!(ContentType::Mpeg.is_audio());
        assert!(!ContentType::Mpeg.is_image());
        assert!(ContentType::Jpeg.is_image());
        assert!(ContentType::Pdf.is_document());
        assert!(!ContentType::Pdf.is_audio());
        assert!(ContentType::Other("audio/opus".into()).is_audio());
    }
}
