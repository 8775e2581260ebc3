use std::path::Path;

const MAX_FILENAME_CHARS: usize = 120;
const FALLBACK_FILENAME: &str = "upload";

/// Reduce a client-supplied filename to a single safe path component.
///
/// Directory parts are dropped, reserved and control characters become `_`,
/// and the result is capped while keeping the extension.
pub fn sanitize_filename(filename: &str) -> String {
    // Clients on Windows send backslash-separated paths
    let unified = filename.replace('\\', "/");
    let name = Path::new(&unified)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from upload name: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = sanitized.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return FALLBACK_FILENAME.to_string();
    }

    if trimmed.chars().count() <= MAX_FILENAME_CHARS {
        return trimmed.to_string();
    }

    let extension = Path::new(trimmed)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().count() <= 10)
        .unwrap_or("");
    let keep = MAX_FILENAME_CHARS - extension.chars().count() - 1;
    let stem: String = trimmed.chars().take(keep).collect();
    if extension.is_empty() {
        stem
    } else {
        format!("{}.{}", stem, extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\report.pdf"), "report.pdf");
    }

    #[test]
    fn test_sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_filename("a:b*c?.pdf"), "a_b_c_.pdf");
    }

    #[test]
    fn test_sanitize_falls_back_for_empty_names() {
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename("..."), "upload");
    }

    #[test]
    fn test_sanitize_caps_length_and_keeps_extension() {
        let long = format!("{}.docx", "x".repeat(300));
        let out = sanitize_filename(&long);
        assert_eq!(out.chars().count(), 120);
        assert!(out.ends_with(".docx"));
    }
}
