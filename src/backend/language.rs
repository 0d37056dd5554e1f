//! Language table
//!
//! Maps a language identifier to the command line, canonical source filename
//! and container image used by the backends. An unrecognized language fails
//! here, before any process or container is created.

use crate::constants::{container_images, languages};
use crate::error::{BenchError, BenchResult};

/// Static execution profile for one language
#[derive(Debug, Clone, Copy)]
pub struct LanguageSpec {
    pub language: &'static str,
    /// Canonical name for the main source file
    pub source_file: &'static str,
    /// Command run through `sh -c`; compiled languages use a pipeline
    pub run_command: &'static str,
    /// Container image used by the sandbox backend
    pub image: &'static str,
}

impl LanguageSpec {
    /// Look up the profile for a language identifier
    pub fn for_language(language: &str) -> BenchResult<&'static LanguageSpec> {
        match language {
            languages::PYTHON => Ok(&PYTHON),
            languages::JAVASCRIPT => Ok(&JAVASCRIPT),
            languages::BASH => Ok(&BASH),
            languages::RUST => Ok(&RUST),
            languages::GO => Ok(&GO),
            other => Err(BenchError::UnsupportedLanguage(other.to_string())),
        }
    }
}

static PYTHON: LanguageSpec = LanguageSpec {
    language: languages::PYTHON,
    source_file: "main.py",
    run_command: "python3 main.py",
    image: container_images::PYTHON,
};

static JAVASCRIPT: LanguageSpec = LanguageSpec {
    language: languages::JAVASCRIPT,
    source_file: "main.js",
    run_command: "node main.js",
    image: container_images::JAVASCRIPT,
};

static BASH: LanguageSpec = LanguageSpec {
    language: languages::BASH,
    source_file: "main.sh",
    run_command: "bash main.sh",
    image: container_images::BASH,
};

static RUST: LanguageSpec = LanguageSpec {
    language: languages::RUST,
    source_file: "main.rs",
    run_command: "rustc -O main.rs -o main && ./main",
    image: container_images::RUST,
};

static GO: LanguageSpec = LanguageSpec {
    language: languages::GO,
    source_file: "main.go",
    run_command: "go run main.go",
    image: container_images::GO,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_declared_languages_resolve() {
        for language in languages::ALL {
            let spec = LanguageSpec::for_language(language).unwrap();
            assert_eq!(spec.language, *language);
            assert!(!spec.run_command.is_empty());
            assert!(!spec.image.is_empty());
        }
    }

    #[test]
    fn test_unknown_language_rejected() {
        let err = LanguageSpec::for_language("cobol").unwrap_err();
        assert!(matches!(err, BenchError::UnsupportedLanguage(_)));
    }

    #[test]
    fn test_compiled_language_uses_pipeline() {
        let spec = LanguageSpec::for_language(languages::RUST).unwrap();
        assert!(spec.run_command.contains("&&"));
    }
}
