//! Static language catalogue.
//!
//! Commands are relative to the work directory: the source lives under
//! `code/` and compiled artifacts are dropped next to it, so the same
//! descriptors work inside the container (cwd `/workspace`) and under the
//! direct-subprocess backend (cwd = the work directory on the host).

/// Descriptor for one supported language.
#[derive(Debug, Clone, Copy)]
pub struct LanguageSpec {
    pub tag: &'static str,
    pub display_name: &'static str,
    /// Source file name inside `code/`.
    pub source_file: &'static str,
    /// Compile command, or a syntax check for interpreted languages.
    pub compile_command: Option<&'static [&'static str]>,
    pub run_command: &'static [&'static str],
}

static CATALOGUE: &[LanguageSpec] = &[
    LanguageSpec {
        tag: "c",
        display_name: "C (GCC)",
        source_file: "main.c",
        compile_command: Some(&[
            "gcc", "-O2", "-std=c17", "code/main.c", "-o", "code/main", "-lm",
        ]),
        run_command: &["code/main"],
    },
    LanguageSpec {
        tag: "cpp",
        display_name: "C++ (G++)",
        source_file: "main.cpp",
        compile_command: Some(&[
            "g++", "-O2", "-std=c++17", "code/main.cpp", "-o", "code/main",
        ]),
        run_command: &["code/main"],
    },
    LanguageSpec {
        tag: "python",
        display_name: "Python 3",
        source_file: "main.py",
        // py_compile catches syntax errors up front so they surface as CE,
        // not as a runtime error on the first test case.
        compile_command: Some(&["python3", "-m", "py_compile", "code/main.py"]),
        run_command: &["python3", "code/main.py"],
    },
];

/// Look up a language by tag.
pub fn get(tag: &str) -> Option<&'static LanguageSpec> {
    CATALOGUE.iter().find(|language| language.tag == tag)
}

pub fn all() -> &'static [LanguageSpec] {
    CATALOGUE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_covers_supported_tags() {
        for tag in ["c", "cpp", "python"] {
            assert!(get(tag).is_some(), "missing language: {tag}");
        }
        assert!(get("java").is_none());
        assert!(get("CPP").is_none(), "tags are case-sensitive");
    }

    #[test]
    fn every_language_checks_syntax_before_running() {
        for language in all() {
            assert!(language.compile_command.is_some(), "{}", language.tag);
            assert!(!language.run_command.is_empty(), "{}", language.tag);
        }
    }

    #[test]
    fn source_files_live_under_code() {
        let cpp = get("cpp").unwrap();
        assert_eq!(cpp.source_file, "main.cpp");
        assert!(cpp
            .compile_command
            .unwrap()
            .iter()
            .any(|arg| *arg == "code/main.cpp"));
    }
}
