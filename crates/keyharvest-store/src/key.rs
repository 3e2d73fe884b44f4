//! Cache keys: (platform, keyword, backend kind) → artifact file name

use std::fmt;

/// Serialization strategy for cache artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Delimited table (CSV)
    Delimited,
    /// Structured document (JSON)
    Document,
    /// Relational table (DuckDB database file)
    Relational,
}

impl BackendKind {
    /// Parse CLI/config name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "csv" => Some(Self::Delimited),
            "json" => Some(Self::Document),
            "duckdb" | "sqlite" | "db" => Some(Self::Relational),
            _ => None,
        }
    }

    /// File extension of artifacts written by this backend
    pub fn extension(self) -> &'static str {
        match self {
            Self::Delimited => "csv",
            Self::Document => "json",
            Self::Relational => "duckdb",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::all().iter().copied().find(|k| k.extension() == ext)
    }

    pub fn all() -> &'static [BackendKind] {
        &[Self::Delimited, Self::Document, Self::Relational]
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Case-fold and join whitespace runs with `_`; path separators become `-`.
pub fn normalize_keyword(keyword: &str) -> String {
    keyword
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
        .replace(['/', '\\'], "-")
}

/// Inverse of [`normalize_keyword`] for display (case is not restored).
pub fn display_keyword(normalized: &str) -> String {
    normalized.replace('_', " ")
}

/// Session names keep their case; whitespace runs become `_` and path
/// separators `-`. Shared by checkpoint and merged-artifact file names.
pub fn normalize_session(session: &str) -> String {
    session
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .replace(['/', '\\'], "-")
}

/// Platform names are the part before the first `_` of a file name,
/// so they must not contain one.
pub fn normalize_platform(platform: &str) -> String {
    platform
        .trim()
        .to_lowercase()
        .replace(|c: char| c == '_' || c.is_whitespace() || c == '/' || c == '\\', "-")
}

/// Addresses exactly one artifact. Pure function of its three parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    platform: String,
    keyword: String,
    kind: BackendKind,
}

impl CacheKey {
    pub fn new(platform: &str, keyword: &str, kind: BackendKind) -> Self {
        Self {
            platform: normalize_platform(platform),
            keyword: normalize_keyword(keyword),
            kind,
        }
    }

    /// Key of the consolidated artifact of a session:
    /// `<platform>_<session>_merged.<ext>`.
    pub fn consolidated(platform: &str, session: &str, kind: BackendKind) -> Self {
        Self {
            platform: normalize_platform(platform),
            keyword: format!("{}_merged", normalize_session(session)),
            kind,
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Normalized keyword
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// `<platform>_<normalized-keyword>.<extension>`
    pub fn file_name(&self) -> String {
        format!("{}_{}.{}", self.platform, self.keyword, self.kind.extension())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_from_name() {
        assert_eq!(BackendKind::from_name("csv"), Some(BackendKind::Delimited));
        assert_eq!(BackendKind::from_name("JSON"), Some(BackendKind::Document));
        assert_eq!(BackendKind::from_name("sqlite"), Some(BackendKind::Relational));
        assert_eq!(BackendKind::from_name("duckdb"), Some(BackendKind::Relational));
        assert_eq!(BackendKind::from_name("parquet"), None);
    }

    #[test]
    fn extension_roundtrip() {
        for &kind in BackendKind::all() {
            assert_eq!(BackendKind::from_extension(kind.extension()), Some(kind));
        }
    }

    #[test]
    fn normalize_keyword_folds_case_and_spaces() {
        assert_eq!(normalize_keyword("Counter-terrorism financing"), "counter-terrorism_financing");
        assert_eq!(normalize_keyword("  FATF  "), "fatf");
        assert_eq!(normalize_keyword("#CounterTerrorism"), "#counterterrorism");
        assert_eq!(normalize_keyword("a/b"), "a-b");
    }

    #[test]
    fn normalize_keyword_is_stable() {
        let once = normalize_keyword("Islamic Relief Worldwide");
        assert_eq!(normalize_keyword(&once), once);
    }

    #[test]
    fn display_keyword_restores_spaces() {
        assert_eq!(
            display_keyword(&normalize_keyword("Muslim Aid Nigeria")),
            "muslim aid nigeria"
        );
    }

    #[test]
    fn platform_has_no_separator() {
        assert_eq!(normalize_platform("Blue_Sky"), "blue-sky");
    }

    #[test]
    fn file_name_layout() {
        let key = CacheKey::new("bluesky", "Charity Commission UK", BackendKind::Delimited);
        assert_eq!(key.file_name(), "bluesky_charity_commission_uk.csv");
    }

    #[test]
    fn key_is_pure_function_of_triple() {
        let a = CacheKey::new("bluesky", "FATF", BackendKind::Relational);
        let b = CacheKey::new("bluesky", "FATF", BackendKind::Relational);
        assert_eq!(a, b);
        assert_eq!(a.file_name(), b.file_name());
        let c = CacheKey::new("bluesky", "FATF", BackendKind::Document);
        assert_ne!(a.file_name(), c.file_name());
    }

    #[test]
    fn consolidated_name() {
        let key = CacheKey::consolidated("p", "demo", BackendKind::Document);
        assert_eq!(key.file_name(), "p_demo_merged.json");
    }

    #[test]
    fn consolidated_name_keeps_session_case() {
        let key = CacheKey::consolidated("p", " Demo  Run ", BackendKind::Delimited);
        assert_eq!(key.file_name(), "p_Demo_Run_merged.csv");
    }
}
