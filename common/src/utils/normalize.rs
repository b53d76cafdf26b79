/// Extension synonyms folded onto one canonical spelling.
const EXTENSION_SYNONYMS: &[(&str, &str)] = &[(".jpeg", ".jpg"), (".tiff", ".tif")];

/// Splits a file name into `(stem, extension)`.
///
/// The extension starts at the last `.` and keeps it; a trailing dot yields no
/// extension. A dotfile such as `.profile` has an empty stem.
pub fn split_file_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx.saturating_add(1) < file_name.len() => file_name.split_at(idx),
        _ => (file_name, ""),
    }
}

/// True when the name is nothing but an extension (`.gitignore`, `.env`).
pub fn is_bare_extension(file_name: &str) -> bool {
    let (stem, extension) = split_file_name(file_name);
    stem.is_empty() && !extension.is_empty()
}

/// Trims, collapses whitespace runs to one space and capitalizes the first character.
pub fn normalize_name(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercases the extension and folds known synonyms.
pub fn normalize_extension(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    EXTENSION_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == lowered)
        .map_or(lowered, |(_, canonical)| (*canonical).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_last_dot() {
        assert_eq!(split_file_name("report.txt"), ("report", ".txt"));
        assert_eq!(split_file_name("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_file_name("README"), ("README", ""));
        assert_eq!(split_file_name("trailing."), ("trailing.", ""));
        assert_eq!(split_file_name(".profile"), ("", ".profile"));
    }

    #[test]
    fn detects_dotfiles() {
        assert!(is_bare_extension(".env"));
        assert!(!is_bare_extension("notes.md"));
        assert!(!is_bare_extension("Makefile"));
    }

    #[test]
    fn normalizes_display_names() {
        let (stem, ext) = split_file_name("  John   Smith.TXT");
        assert_eq!(normalize_name(stem), "John Smith");
        assert_eq!(normalize_extension(ext), ".txt");

        assert_eq!(normalize_name("quarterly\treport"), "Quarterly report");
        assert_eq!(normalize_name("éclair recipes"), "Éclair recipes");
        assert_eq!(normalize_name("already Fine"), "Already Fine");
        assert_eq!(normalize_name("   "), "");
    }

    #[test]
    fn folds_extension_synonyms() {
        assert_eq!(normalize_extension(".JPEG"), ".jpg");
        assert_eq!(normalize_extension(".jpeg"), ".jpg");
        assert_eq!(normalize_extension(".TIFF"), ".tif");
        assert_eq!(normalize_extension(".Docx"), ".docx");
        assert_eq!(normalize_extension(""), "");
    }
}
