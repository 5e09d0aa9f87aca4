//! Module paths and `go.mod` module directives.

use crate::repo::RepoId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Directives a `go.mod` file may contain.
const KNOWN_VERBS: &[&str] = &[
    "module",
    "go",
    "toolchain",
    "godebug",
    "require",
    "exclude",
    "replace",
    "retract",
    "tool",
    "ignore",
];

/// Device names that cannot appear as a path element on Windows.
const RESERVED_ELEMENTS: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// A module path such as `example.com/foo/v2`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModulePath(String);

impl ModulePath {
    /// Parse and validate a declared module path.
    pub fn parse(path: &str) -> crate::Result<Self> {
        check_path(path)?;
        Ok(Self(path.to_string()))
    }

    /// Path derived from the forge location: `<host>/<org>/<name>`.
    ///
    /// Used when a tag has no module declaration. Not validated, since the
    /// forge host is trusted configuration.
    pub fn from_forge(host: &str, repo: &RepoId) -> Self {
        Self(format!("{host}/{}/{}", repo.org(), repo.name()))
    }

    /// Get the path string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap a path read back from storage without re-validating it.
    pub fn from_stored(path: String) -> Self {
        Self(path)
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModulePath({})", self.0)
    }
}

/// Result of reading a `go.mod` file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModuleDeclaration {
    /// The file declares this module path.
    Declared(ModulePath),
    /// The file parsed but has no `module` directive.
    Missing,
}

impl ModuleDeclaration {
    /// Parse the contents of a `go.mod` file.
    ///
    /// Only the `module` directive is interpreted. Other known directives are
    /// accepted without inspection; unknown directives, malformed quoting,
    /// unterminated blocks, and invalid module paths are errors.
    pub fn parse(contents: &str) -> crate::Result<Self> {
        let mut declared: Option<ModulePath> = None;
        let mut block: Option<(&str, usize)> = None;

        for (idx, raw) in contents.lines().enumerate() {
            let lineno = idx + 1;
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            if let Some((verb, _)) = block {
                if line == ")" {
                    block = None;
                } else if verb == "module" {
                    set_module(&mut declared, line, lineno)?;
                }
                continue;
            }

            let (verb, rest) = match line.split_once(char::is_whitespace) {
                Some((verb, rest)) => (verb, rest.trim()),
                None => (line, ""),
            };
            if !KNOWN_VERBS.contains(&verb) {
                return Err(crate::Error::ModFileParse(format!(
                    "line {lineno}: unknown directive: {verb}"
                )));
            }

            if rest == "(" {
                block = Some((verb, lineno));
                continue;
            }

            if verb == "module" {
                set_module(&mut declared, rest, lineno)?;
            }
        }

        if let Some((verb, lineno)) = block {
            return Err(crate::Error::ModFileParse(format!(
                "line {lineno}: unterminated {verb} block"
            )));
        }

        Ok(match declared {
            Some(path) => ModuleDeclaration::Declared(path),
            None => ModuleDeclaration::Missing,
        })
    }
}

fn set_module(declared: &mut Option<ModulePath>, arg: &str, lineno: usize) -> crate::Result<()> {
    if declared.is_some() {
        return Err(crate::Error::ModFileParse(format!(
            "line {lineno}: repeated module statement"
        )));
    }
    let path = parse_module_arg(arg, lineno)?;
    let path = ModulePath::parse(&path).map_err(|e| {
        crate::Error::InvalidModulePath(format!("line {lineno}: {path:?}: {e}"))
    })?;
    *declared = Some(path);
    Ok(())
}

fn parse_module_arg(arg: &str, lineno: usize) -> crate::Result<String> {
    let usage = || {
        crate::Error::ModFileParse(format!("line {lineno}: usage: module module/path"))
    };

    let (value, rest) = match arg.chars().next() {
        Some(q @ ('"' | '`')) => {
            let body = &arg[1..];
            let end = body.find(q).ok_or_else(|| {
                crate::Error::ModFileParse(format!("line {lineno}: unterminated quoted string"))
            })?;
            let value = &body[..end];
            if q == '"' && value.contains('\\') {
                return Err(crate::Error::ModFileParse(format!(
                    "line {lineno}: escape sequences are not supported in module paths"
                )));
            }
            (value, body[end + 1..].trim())
        }
        Some(_) => match arg.split_once(char::is_whitespace) {
            Some((value, rest)) => (value, rest.trim()),
            None => (arg, ""),
        },
        None => return Err(usage()),
    };

    if !rest.is_empty() || value.is_empty() {
        return Err(usage());
    }
    Ok(value.to_string())
}

/// Remove a trailing `//` comment that is not inside a quoted string.
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut prev = '\0';
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '`' => quote = Some(c),
            None if c == '/' && prev == '/' => return &line[..i - 1],
            None => {}
        }
        prev = c;
    }
    line
}

/// Validate a module path.
fn check_path(path: &str) -> crate::Result<()> {
    let invalid = |msg: &str| crate::Error::InvalidModulePath(format!("{path:?}: {msg}"));

    if path.is_empty() {
        return Err(invalid("empty path"));
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(invalid("leading or trailing slash"));
    }

    let elems: Vec<&str> = path.split('/').collect();
    let first = elems[0];
    if !first.contains('.') {
        return Err(invalid("missing dot in first path element"));
    }
    if first.starts_with('-') {
        return Err(invalid("leading dash in first path element"));
    }
    if !first
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid("invalid char in first path element"));
    }

    for elem in &elems {
        check_elem(elem).map_err(|msg| invalid(&msg))?;
    }

    if elems.len() > 1 {
        if let Some(digits) = elems[elems.len() - 1].strip_prefix('v') {
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                if digits.starts_with('0') || digits == "1" {
                    return Err(invalid("major version suffix must be v2 or later"));
                }
            }
        }
    }

    Ok(())
}

fn check_elem(elem: &str) -> Result<(), String> {
    if elem.is_empty() {
        return Err("empty path element".to_string());
    }
    if elem == "." || elem == ".." {
        return Err(format!("invalid path element {elem:?}"));
    }
    if elem.starts_with('.') {
        return Err("leading dot in path element".to_string());
    }
    if elem.ends_with('.') {
        return Err("trailing dot in path element".to_string());
    }
    if let Some(c) = elem
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')))
    {
        return Err(format!("invalid char {c:?}"));
    }
    let stem = elem.split('.').next().unwrap_or(elem);
    if RESERVED_ELEMENTS
        .iter()
        .any(|r| r.eq_ignore_ascii_case(stem))
    {
        return Err(format!("{elem:?} disallowed as path element component"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(contents: &str) -> String {
        match ModuleDeclaration::parse(contents).unwrap() {
            ModuleDeclaration::Declared(p) => p.to_string(),
            ModuleDeclaration::Missing => panic!("expected a module directive"),
        }
    }

    #[test]
    fn test_parse_simple_module() {
        let contents = "module example.com/foo\n\ngo 1.22\n\nrequire github.com/pkg/errors v0.9.1\n";
        assert_eq!(declared(contents), "example.com/foo");
    }

    #[test]
    fn test_parse_quoted_and_commented() {
        assert_eq!(
            declared("// header\nmodule \"vanity.example/ab\" // trailing\n"),
            "vanity.example/ab"
        );
        assert_eq!(declared("module `vanity.example/ab`\n"), "vanity.example/ab");
    }

    #[test]
    fn test_parse_module_block() {
        assert_eq!(declared("module (\n  example.com/blocky\n)\n"), "example.com/blocky");
    }

    #[test]
    fn test_parse_with_require_block() {
        let contents = r#"
module example.com/app/v3

go 1.21

require (
    github.com/a/b v1.2.3 // indirect
    github.com/c/d v0.0.1
)

replace github.com/a/b => ../b
"#;
        assert_eq!(declared(contents), "example.com/app/v3");
    }

    #[test]
    fn test_missing_module_directive() {
        let decl = ModuleDeclaration::parse("go 1.21\n").unwrap();
        assert_eq!(decl, ModuleDeclaration::Missing);
        assert_eq!(ModuleDeclaration::parse("").unwrap(), ModuleDeclaration::Missing);
    }

    #[test]
    fn test_parse_errors() {
        for bad in [
            "this is not a go.mod file",
            "module\n",
            "module \"unterminated\n",
            "module a.com/x extra\n",
            "module a.com/x\nmodule b.com/y\n",
            "require (\n github.com/a/b v1.0.0\n",
        ] {
            assert!(
                ModuleDeclaration::parse(bad).is_err(),
                "expected parse error for {bad:?}"
            );
        }
    }

    #[test]
    fn test_invalid_declared_path_is_error() {
        let err = ModuleDeclaration::parse("module not a path\n").unwrap_err();
        assert!(matches!(err, crate::Error::ModFileParse(_)));
        let err = ModuleDeclaration::parse("module nodot/foo\n").unwrap_err();
        assert!(matches!(err, crate::Error::InvalidModulePath(_)));
    }

    #[test]
    fn test_check_path_accepts() {
        for ok in [
            "example.com/foo",
            "github.com/org/repo",
            "example.com/foo/v2",
            "go.example.io/x_y~z/a-b",
            "example.com",
        ] {
            assert!(ModulePath::parse(ok).is_ok(), "expected valid: {ok}");
        }
    }

    #[test]
    fn test_check_path_rejects() {
        for bad in [
            "",
            "/example.com/foo",
            "example.com/foo/",
            "example.com//foo",
            "example/foo",
            "Example.com/foo",
            "-example.com/foo",
            "example.com/./foo",
            "example.com/../foo",
            "example.com/.hidden",
            "example.com/trailing.",
            "example.com/sp ace",
            "example.com/foo/v1",
            "example.com/foo/v0",
            "example.com/foo/v02",
            "example.com/con",
            "example.com/ünïcode",
        ] {
            assert!(ModulePath::parse(bad).is_err(), "expected invalid: {bad:?}");
        }
    }

    #[test]
    fn test_from_forge() {
        let repo = RepoId::parse("a/b").unwrap();
        assert_eq!(
            ModulePath::from_forge("forge.example", &repo).as_str(),
            "forge.example/a/b"
        );
    }
}
