//! Dependency walker
//!
//! Scans a source file for top-level `import`/`export` declarations that
//! carry a module specifier and feeds the referenced specifiers into the
//! pending worklist. The scanner is comment-, string-, and
//! template-literal-aware so specifiers inside other syntax never leak.
//! Dynamic `import()` expressions are deliberately ignored.

use std::path::Path;

use crate::assets::BundlerState;
use crate::compiler::compiled_path;
use crate::modules::SourceFile;
use crate::paths;

/// Extract every static import/export specifier from module source text
pub fn scan_specifiers(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut specifiers = Vec::new();
    let mut depth: i32 = 0;
    let mut i = 0;

    // Hashbang line, if any
    if bytes.starts_with(b"#!") {
        while i < bytes.len() && bytes[i] != b'\n' {
            i += 1;
        }
    }

    let mut prev_significant: u8 = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                prev_significant = c;
            }
            b'`' => {
                i = skip_template(bytes, i);
                prev_significant = c;
            }
            b'{' | b'(' | b'[' => {
                depth += 1;
                i += 1;
                prev_significant = c;
            }
            b'}' | b')' | b']' => {
                depth -= 1;
                i += 1;
                prev_significant = c;
            }
            _ if is_ident_start(c) => {
                let start = i;
                while i < bytes.len() && is_ident_char(bytes[i]) {
                    i += 1;
                }
                let word = &text[start..i];
                // `obj.import(...)` is property access, not a declaration
                if depth == 0 && prev_significant != b'.' && (word == "import" || word == "export")
                {
                    if let Some((specifier, next)) = parse_declaration(text, i, word) {
                        specifiers.push(specifier);
                        i = next;
                    }
                }
                prev_significant = b'a';
            }
            _ => {
                if !c.is_ascii_whitespace() {
                    prev_significant = c;
                }
                i += 1;
            }
        }
    }
    specifiers
}

/// Parse forward from just after an `import`/`export` keyword; returns the
/// specifier and the position after its closing quote when the declaration
/// carries one.
fn parse_declaration(text: &str, after_keyword: usize, keyword: &str) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    let mut i = skip_trivia(bytes, after_keyword);
    let first = *bytes.get(i)?;

    if keyword == "import" {
        match first {
            // import "side-effect";
            b'"' | b'\'' => return read_string(text, i),
            // import(...) is dynamic, import.meta is not a declaration
            b'(' | b'.' => return None,
            _ => {}
        }
    } else {
        // Only `export * ... from` and `export { ... } from` carry specifiers
        if first != b'*' && first != b'{' {
            return None;
        }
    }

    // Scan the clause for the contextual `from` keyword, bounded by the
    // statement end.
    let mut depth: i32 = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b'"' | b'\'' => i = skip_string(bytes, i),
            b'{' | b'(' | b'[' => {
                depth += 1;
                i += 1;
            }
            b'}' | b')' | b']' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
                i += 1;
            }
            b';' if depth == 0 => return None,
            b'`' => return None,
            _ if is_ident_start(c) => {
                let start = i;
                while i < bytes.len() && is_ident_char(bytes[i]) {
                    i += 1;
                }
                if depth == 0 && &text[start..i] == "from" {
                    let j = skip_trivia(bytes, i);
                    return read_string(text, j);
                }
            }
            _ => i += 1,
        }
    }
    None
}

fn read_string(text: &str, start: usize) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    let quote = *bytes.get(start)?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            c if c == quote => {
                return Some((text[start + 1..i].to_string(), i + 1));
            }
            _ => i += 1,
        }
    }
    None
}

fn skip_trivia(bytes: &[u8], mut i: usize) -> usize {
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) == Some(&b'/') && bytes.get(i + 1) == Some(&b'/') {
            i = skip_line_comment(bytes, i);
        } else if bytes.get(i) == Some(&b'/') && bytes.get(i + 1) == Some(&b'*') {
            i = skip_block_comment(bytes, i);
        } else {
            return i;
        }
    }
}

fn skip_line_comment(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
    }
    i
}

fn skip_block_comment(bytes: &[u8], mut i: usize) -> usize {
    i += 2;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return i + 2;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i + 1,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    i
}

fn skip_template(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    let mut interpolation_depth: i32 = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                interpolation_depth += 1;
                i += 2;
            }
            b'}' if interpolation_depth > 0 => {
                interpolation_depth -= 1;
                i += 1;
            }
            b'"' | b'\'' if interpolation_depth > 0 => i = skip_string(bytes, i),
            b'`' => {
                if interpolation_depth > 0 {
                    i = skip_template(bytes, i);
                } else {
                    return i + 1;
                }
            }
            _ => i += 1,
        }
    }
    i
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'$'
}

fn is_ident_char(c: u8) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

/// Feed a source file through the walker: relative specifiers become
/// absolute pending paths (JSON data files are routed to the JSON set),
/// bare specifiers are queued for the resolver.
pub fn walk(source: &SourceFile, state: &mut BundlerState) {
    let dir = source.path.parent().unwrap_or(Path::new("/"));
    for specifier in scan_specifiers(&source.text) {
        if specifier.starts_with('.') {
            let joined = paths::normalize(&dir.join(&specifier));
            if specifier.ends_with(".json") {
                state.json_files.insert(joined);
                continue;
            }
            // A typed-source relative import refers to its compiled output.
            let resolved = compiled_path(&joined);
            state.enqueue_pending(resolved.to_string_lossy(), &source.path);
        } else {
            state.enqueue_pending(specifier, &source.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn scans_all_static_import_forms() {
        let text = r#"
import def from "a";
import * as ns from "b";
import { one, two as three } from "c";
import "d";
import def2, { four } from 'e';
"#;
        assert_eq!(scan_specifiers(text), ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn scans_export_from_forms() {
        let text = r#"
export * from "a";
export * as ns from "b";
export { x, y as z } from "c";
export const unrelated = 1;
export default function f() {}
"#;
        assert_eq!(scan_specifiers(text), ["a", "b", "c"]);
    }

    #[test]
    fn ignores_dynamic_import_and_import_meta() {
        let text = r#"
const mod = import("lazy");
const url = import.meta.url;
import real from "real";
"#;
        assert_eq!(scan_specifiers(text), ["real"]);
    }

    #[test]
    fn ignores_specifiers_inside_strings_comments_and_templates() {
        let text = r#"
// import fake1 from "nope1";
/* import fake2 from "nope2"; */
const s = 'import fake3 from "nope3";';
const t = `import fake4 from "nope4"; ${"import x from 'nope5'"}`;
import real from "real";
"#;
        assert_eq!(scan_specifiers(text), ["real"]);
    }

    #[test]
    fn ignores_nested_import_keyword() {
        let text = r#"
function f() {
    const importish = 1;
    return { import: 2 };
}
import real from "real";
"#;
        assert_eq!(scan_specifiers(text), ["real"]);
    }

    #[test]
    fn handles_multiline_clauses() {
        let text = "import {\n  a,\n  b,\n} from \"pkg\";\n";
        assert_eq!(scan_specifiers(text), ["pkg"]);
    }

    #[test]
    fn skips_hashbang() {
        let text = "#!/usr/bin/env node\nimport a from \"a\";\n";
        assert_eq!(scan_specifiers(text), ["a"]);
    }

    #[test]
    fn walk_routes_relative_json_to_json_set() {
        let mut state = BundlerState::new();
        let source = SourceFile::new("/p/index.js", "import data from \"./data.json\";\n");
        walk(&source, &mut state);
        assert!(state.json_files.contains(&PathBuf::from("/p/data.json")));
        assert!(state.pending_is_empty());
    }

    #[test]
    fn walk_absolutizes_relative_specifiers() {
        let mut state = BundlerState::new();
        let source = SourceFile::new("/p/src/index.js", "import u from \"../lib/util.js\";\n");
        walk(&source, &mut state);
        let pending = state.pop_pending().unwrap();
        assert_eq!(pending.key, "/p/lib/util.js");
        assert_eq!(pending.requester, PathBuf::from("/p/src/index.js"));
    }

    #[test]
    fn walk_rewrites_typed_source_suffix() {
        let mut state = BundlerState::new();
        let source = SourceFile::new("/p/index.js", "import u from \"./util.ts\";\n");
        walk(&source, &mut state);
        assert_eq!(state.pop_pending().unwrap().key, "/p/util.js");
    }

    #[test]
    fn walk_queues_bare_specifiers_verbatim() {
        let mut state = BundlerState::new();
        let source = SourceFile::new("/p/index.js", "import fs from \"fs\";\n");
        walk(&source, &mut state);
        assert_eq!(state.pop_pending().unwrap().key, "fs");
    }

    #[test]
    fn walk_deduplicates_against_processed() {
        let mut state = BundlerState::new();
        state.mark_processed("fs");
        let source = SourceFile::new("/p/index.js", "import fs from \"fs\";\n");
        walk(&source, &mut state);
        assert!(state.pending_is_empty());
    }
}
