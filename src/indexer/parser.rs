use anyhow::Result;
use std::path::Path;
use tree_sitter::{Language, Parser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageId {
    Typescript,
    Tsx,
    Javascript,
    Rust,
    Python,
    Go,
    Java,
    C,
    Cpp,
}

pub fn language_id_for_path(path: &Path) -> Option<LanguageId> {
    match path.extension().and_then(|s| s.to_str()) {
        Some("ts") | Some("mts") | Some("cts") => Some(LanguageId::Typescript),
        Some("tsx") => Some(LanguageId::Tsx),
        Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Some(LanguageId::Javascript),
        Some("rs") => Some(LanguageId::Rust),
        Some("py") | Some("pyi") => Some(LanguageId::Python),
        Some("go") => Some(LanguageId::Go),
        Some("java") => Some(LanguageId::Java),
        Some("c") | Some("h") => Some(LanguageId::C),
        Some("cc") | Some("cpp") | Some("cxx") | Some("hpp") | Some("hh") | Some("hxx") => {
            Some(LanguageId::Cpp)
        }
        _ => None,
    }
}

pub fn language_for_id(id: LanguageId) -> Language {
    match id {
        LanguageId::Typescript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        LanguageId::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        LanguageId::Javascript => tree_sitter_javascript::LANGUAGE.into(),
        LanguageId::Rust => tree_sitter_rust::LANGUAGE.into(),
        LanguageId::Python => tree_sitter_python::LANGUAGE.into(),
        LanguageId::Go => tree_sitter_go::LANGUAGE.into(),
        LanguageId::Java => tree_sitter_java::LANGUAGE.into(),
        LanguageId::C => tree_sitter_c::LANGUAGE.into(),
        LanguageId::Cpp => tree_sitter_cpp::LANGUAGE.into(),
    }
}

pub fn language_name(id: LanguageId) -> &'static str {
    match id {
        LanguageId::Typescript => "typescript",
        LanguageId::Tsx => "tsx",
        LanguageId::Javascript => "javascript",
        LanguageId::Rust => "rust",
        LanguageId::Python => "python",
        LanguageId::Go => "go",
        LanguageId::Java => "java",
        LanguageId::C => "c",
        LanguageId::Cpp => "cpp",
    }
}

/// Separator used when qualifying nested definitions.
pub fn scope_separator(id: LanguageId) -> &'static str {
    match id {
        LanguageId::Rust | LanguageId::Cpp | LanguageId::C => "::",
        _ => ".",
    }
}

pub fn parser_for_id(id: LanguageId) -> Result<Parser> {
    let mut parser = Parser::new();
    parser.set_language(&language_for_id(id))?;
    Ok(parser)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn creates_parsers_for_languages() {
        for id in [
            LanguageId::Typescript,
            LanguageId::Tsx,
            LanguageId::Javascript,
            LanguageId::Rust,
            LanguageId::Python,
            LanguageId::Go,
            LanguageId::Java,
            LanguageId::C,
            LanguageId::Cpp,
        ] {
            assert!(parser_for_id(id).is_ok(), "{}", language_name(id));
        }
    }

    #[rstest]
    #[case("x.ts", Some(LanguageId::Typescript))]
    #[case("x.tsx", Some(LanguageId::Tsx))]
    #[case("x.rs", Some(LanguageId::Rust))]
    #[case("x.py", Some(LanguageId::Python))]
    #[case("x.hpp", Some(LanguageId::Cpp))]
    #[case("x.h", Some(LanguageId::C))]
    #[case("README.md", None)]
    fn detects_language_ids_by_extension(#[case] path: &str, #[case] expected: Option<LanguageId>) {
        assert_eq!(language_id_for_path(Path::new(path)), expected);
    }
}
