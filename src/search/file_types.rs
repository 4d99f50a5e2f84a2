use std::collections::BTreeSet;

/// Category to the extensions that select it
const FILE_TYPES: &[(&str, &[&str])] = &[
    ("audio", &["mp3", "flac", "wav", "aac", "ogg", "m4a"]),
    ("video", &["mp4", "mkv", "avi", "mov", "wmv"]),
    ("document", &["pdf", "doc", "docx", "txt", "rtf"]),
    ("image", &["jpg", "jpeg", "png", "gif", "bmp"]),
    ("archive", &["zip", "rar", "7z", "tar", "gz"]),
];

/// Derive coarse category tags from query text.
///
/// An extension counts when it appears as a standalone ` .ext ` token (or
/// `.ext ` at the very start), or when the text ends with `.ext`. Matching
/// ignores case.
pub fn extract_file_types(search_text: &str) -> BTreeSet<String> {
    let text = search_text.to_lowercase();

    FILE_TYPES
        .iter()
        .filter(|(_, extensions)| extensions.iter().any(|ext| mentions(&text, ext)))
        .map(|(category, _)| category.to_string())
        .collect()
}

fn mentions(text: &str, ext: &str) -> bool {
    let dotted = format!(".{ext}");
    let token = format!("{dotted} ");

    text.ends_with(&dotted) || text.starts_with(&token) || text.contains(&format!(" {token}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(text: &str) -> Vec<String> {
        extract_file_types(text).into_iter().collect()
    }

    #[test]
    fn test_trailing_extension() {
        assert_eq!(tags("artist .mp3"), vec!["audio"]);
        assert_eq!(tags("live set.FLAC"), vec!["audio"]);
    }

    #[test]
    fn test_standalone_token_in_the_middle() {
        assert_eq!(tags("holiday .mkv 1080p"), vec!["video"]);
        assert_eq!(tags(".pdf manual"), vec!["document"]);
    }

    #[test]
    fn test_multiple_categories_without_duplicates() {
        assert_eq!(
            tags("album .mp3 .flac cover .jpg"),
            vec!["audio", "image"]
        );
    }

    #[test]
    fn test_embedded_extensions_do_not_match() {
        assert!(tags("mp3 collection").is_empty());
        assert!(tags("the.mp3s archive").is_empty());
        assert!(tags("").is_empty());
    }

    #[test]
    fn test_longest_extension_is_not_confused() {
        assert_eq!(tags("report.docx"), vec!["document"]);
        assert!(tags("file .tarball").is_empty());
    }
}
