/// Local MIME type inference. Never touches the storage backend.
pub trait MimeTypeDetector: Send + Sync {
    fn detect_from_path(&self, path: &str) -> Option<String>;
}

/// Infers the MIME type from the file extension
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionMimeTypeDetector;

impl MimeTypeDetector for ExtensionMimeTypeDetector {
    fn detect_from_path(&self, path: &str) -> Option<String> {
        mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        let detector = ExtensionMimeTypeDetector;
        assert_eq!(
            detector.detect_from_path("a/b.txt").as_deref(),
            Some("text/plain")
        );
        assert_eq!(
            detector.detect_from_path("report.PDF").as_deref(),
            Some("application/pdf")
        );
    }

    #[test]
    fn test_unknown_extension() {
        let detector = ExtensionMimeTypeDetector;
        assert_eq!(detector.detect_from_path("a/no-extension"), None);
        assert_eq!(detector.detect_from_path("a/b.unknownext"), None);
    }
}
