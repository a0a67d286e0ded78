use thiserror::Error;

pub type CanopyResult<T, E = CanopyError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum CanopyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tree-sitter error: {0}")]
    TreeSitter(#[from] tree_sitter::LanguageError),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("empty source")]
    EmptySource,

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("internal assertion: {0}")]
    Internal(String),

    #[error("{0}")]
    Msg(String),
}

impl From<&str> for CanopyError {
    fn from(s: &str) -> Self {
        CanopyError::Msg(s.to_owned())
    }
}

impl From<String> for CanopyError {
    fn from(s: String) -> Self {
        CanopyError::Msg(s)
    }
}

#[test]
fn io_conversion_retains_message() {
    let e = std::io::Error::other("boom!");
    let c: CanopyError = e.into();
    assert!(matches!(c, CanopyError::Io(_)));
    assert!(c.to_string().contains("boom"));
}

#[test]
fn simple_string_into_msg() {
    let c: CanopyError = "plain msg".into();
    assert!(matches!(c, CanopyError::Msg(s) if s == "plain msg"));
}

#[test]
fn unsupported_language_names_the_language() {
    let c = CanopyError::UnsupportedLanguage("cobol".into());
    assert_eq!(c.to_string(), "unsupported language: cobol");
}
