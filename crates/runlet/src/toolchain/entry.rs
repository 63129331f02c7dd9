//! Best-effort entry-point detection
//!
//! Some toolchains tie the source file or main-class name to the source
//! text itself. These scanners pick a name consistent with that requirement
//! using plain pattern matching over lines, with a fixed fallback when
//! nothing usable is found. They are deliberately not parsers.

/// Detected Java entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaEntry {
    /// Bare class name; the source file is written as `{class}.java`
    pub class: String,

    /// Declared package, if any
    pub package: Option<String>,
}

impl JavaEntry {
    /// Class name to launch, qualified with the package when present
    pub fn qualified_class(&self) -> String {
        match self.package {
            Some(ref pkg) => format!("{pkg}.{}", self.class),
            None => self.class.clone(),
        }
    }
}

/// Scan Java source for the class carrying `public static void main`.
///
/// Falls back to `Main` when no class declaration is found or the source has
/// no main method at all (the compiler then reports the real problem).
pub fn detect_java_entry(code: &str) -> JavaEntry {
    let mut package = None;
    for line in code.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("package ") {
            if let Some(semi) = rest.find(';') {
                let name = rest[..semi].trim();
                if !name.is_empty() {
                    package = Some(name.to_owned());
                }
                break;
            }
        }
    }

    let mut class = "Main".to_owned();
    if code.contains("public static void main") {
        for line in code.lines() {
            if let Some(name) = class_name_in_line(line) {
                class = name;
                break;
            }
        }
    }

    JavaEntry { class, package }
}

/// Scan C# source for the first class declaration; fall back to `Program`.
pub fn detect_csharp_class(code: &str) -> String {
    code.lines()
        .find_map(class_name_in_line)
        .unwrap_or_else(|| "Program".to_owned())
}

/// Identifier following a word-boundary `class` keyword in one line.
fn class_name_in_line(line: &str) -> Option<String> {
    const KEYWORD: &str = "class";

    let mut rest = line;
    while let Some(idx) = rest.find(KEYWORD) {
        let before = rest[..idx].chars().next_back();
        let after = &rest[idx + KEYWORD.len()..];

        let boundary_before = before.is_none_or(|c| !c.is_alphanumeric() && c != '_');
        let boundary_after = after.chars().next().is_some_and(char::is_whitespace);

        if boundary_before && boundary_after {
            let ident: String = after
                .trim_start()
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if ident
                .chars()
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_')
            {
                return Some(ident);
            }
        }

        rest = &rest[idx + KEYWORD.len()..];
    }
    None
}
