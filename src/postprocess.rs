//! Asset post-processing
//!
//! Rewrites assets between closure completion and serialization: strips
//! redundant `"use strict"` prologues, drops trailing `sourceMappingURL`
//! lines (the map travels as its own asset), converts JSON data files to
//! modules, and drives the minifier with source-map fusion.

use serde_json::Value;

use crate::error::{BindleError, BindleResult};

/// Reserved words of the modern language dialect; not usable as export
/// names
const RESERVED_WORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Whether `name` can be emitted as `export const <name>`
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        .unwrap_or(false);
    valid_start
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !RESERVED_WORDS.contains(&name)
}

#[derive(Clone, Copy, PartialEq)]
enum ScanMode {
    Code,
    BlockComment,
    Template,
}

/// Delete every top-level expression statement consisting of the string
/// literal `"use strict"`. The merged artifact would otherwise repeat the
/// directive once per embedded module.
pub fn strip_strict_prologue(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut removals: Vec<(usize, usize)> = Vec::new();
    let mut mode = ScanMode::Code;
    let mut depth: i32 = 0;
    let mut i = 0;
    let mut line_start = 0;
    let mut line_starts_in_code = true;
    let mut line_start_depth: i32 = 0;

    loop {
        if i >= bytes.len() || bytes[i] == b'\n' {
            let line_end = if i >= bytes.len() { bytes.len() } else { i + 1 };
            let trimmed = text[line_start..line_end].trim();
            let is_directive = matches!(
                trimmed,
                "\"use strict\";" | "'use strict';" | "\"use strict\"" | "'use strict'"
            );
            if line_starts_in_code && line_start_depth == 0 && is_directive {
                removals.push((line_start, line_end));
            }
            if i >= bytes.len() {
                break;
            }
            i += 1;
            line_start = i;
            line_starts_in_code = mode == ScanMode::Code;
            line_start_depth = depth;
            continue;
        }
        match mode {
            ScanMode::Code => match bytes[i] {
                b'/' if bytes.get(i + 1) == Some(&b'/') => {
                    while i < bytes.len() && bytes[i] != b'\n' {
                        i += 1;
                    }
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    mode = ScanMode::BlockComment;
                    i += 2;
                }
                quote @ (b'"' | b'\'') => {
                    i += 1;
                    while i < bytes.len() && bytes[i] != quote && bytes[i] != b'\n' {
                        i += if bytes[i] == b'\\' { 2 } else { 1 };
                    }
                    if i < bytes.len() && bytes[i] == quote {
                        i += 1;
                    }
                }
                b'`' => {
                    mode = ScanMode::Template;
                    i += 1;
                }
                b'{' | b'(' | b'[' => {
                    depth += 1;
                    i += 1;
                }
                b'}' | b')' | b']' => {
                    depth -= 1;
                    i += 1;
                }
                _ => i += 1,
            },
            ScanMode::BlockComment => {
                if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    mode = ScanMode::Code;
                    i += 2;
                } else {
                    i += 1;
                }
            }
            ScanMode::Template => match bytes[i] {
                b'\\' => i += 2,
                b'`' => {
                    mode = ScanMode::Code;
                    i += 1;
                }
                _ => i += 1,
            },
        }
    }

    if removals.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in removals {
        out.push_str(&text[cursor..start]);
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Drop a trailing `//# sourceMappingURL=` line; the map is embedded as an
/// independent asset.
pub fn strip_source_mapping_url(text: &str) -> String {
    let body = text.strip_suffix('\n').unwrap_or(text);
    let (head, last_line) = match body.rfind('\n') {
        Some(idx) => (&body[..idx + 1], &body[idx + 1..]),
        None => ("", body),
    };
    if last_line.starts_with("//# sourceMappingURL=") {
        head.to_string()
    } else {
        text.to_string()
    }
}

/// Encode a JSON data file as a module.
///
/// Objects get a default export plus one named export per property whose
/// name is a valid identifier; everything else gets only the default
/// export. The JSON text itself is embedded verbatim (trimmed), not
/// re-serialized.
pub fn encode_json_module(text: &str) -> BindleResult<String> {
    let value: Value = serde_json::from_str(text)?;
    let trimmed = text.trim();
    match &value {
        Value::Object(map) => {
            let mut id = "d".to_string();
            let mut counter = 0;
            while map.contains_key(&id) {
                counter += 1;
                id = format!("d{counter}");
            }
            let mut out = format!("const {id} = {trimmed};\nexport default {id};\n");
            for key in map.keys() {
                if is_valid_identifier(key) {
                    out.push_str(&format!("export const {key} = {id}.{key};\n"));
                }
            }
            Ok(out)
        }
        _ => Ok(format!("export default {trimmed};\n")),
    }
}

/// Source-map handling for one minified asset
#[derive(Debug, Clone, Default)]
pub struct MapSettings {
    /// Prior map content to fuse with, if any
    pub content: Option<String>,
    /// Map root: portable dirname of the asset's origin, with trailing `/`
    pub root: String,
    /// Basename of the asset
    pub filename: String,
}

/// Settings handed to the minifier service
#[derive(Debug, Clone)]
pub struct MinifySettings {
    pub ecma: u16,
    pub module: bool,
    pub compress: bool,
    pub mangle: bool,
    pub global_defs: Vec<(String, Value)>,
    pub source_map: Option<MapSettings>,
}

impl MinifySettings {
    /// The settings every bundling uses: ES-2020 grammar, module-mode
    /// compression and mangling, and the compile-time define the target
    /// runtime expects.
    pub fn bundler_defaults() -> Self {
        Self {
            ecma: 2020,
            module: true,
            compress: true,
            mangle: true,
            global_defs: vec![("process.env.FRIDA_COMPILE".to_string(), Value::Bool(true))],
            source_map: None,
        }
    }
}

/// Result of minifying one asset
#[derive(Debug, Clone)]
pub struct MinifyOutput {
    pub code: String,
    pub map: Option<String>,
}

/// External minifier service
pub trait Minifier: Send + Sync {
    fn minify(
        &self,
        asset_name: &str,
        code: &str,
        settings: &MinifySettings,
    ) -> BindleResult<MinifyOutput>;
}

/// Built-in conservative minifier.
///
/// Strips comments and trailing whitespace while preserving line
/// structure, so an input source map stays valid and passes through
/// unchanged. A terser-grade minifier plugs in through the same trait.
pub struct StripMinifier;

impl Minifier for StripMinifier {
    fn minify(
        &self,
        _asset_name: &str,
        code: &str,
        settings: &MinifySettings,
    ) -> BindleResult<MinifyOutput> {
        let bytes = code.as_bytes();
        let mut out: Vec<u8> = Vec::with_capacity(code.len());
        let mut mode = ScanMode::Code;
        let mut i = 0;
        while i < bytes.len() {
            match mode {
                ScanMode::Code => match bytes[i] {
                    b'/' if bytes.get(i + 1) == Some(&b'/') => {
                        while i < bytes.len() && bytes[i] != b'\n' {
                            i += 1;
                        }
                    }
                    b'/' if bytes.get(i + 1) == Some(&b'*') => {
                        mode = ScanMode::BlockComment;
                        i += 2;
                    }
                    quote @ (b'"' | b'\'') => {
                        out.push(quote);
                        i += 1;
                        while i < bytes.len() && bytes[i] != quote && bytes[i] != b'\n' {
                            if bytes[i] == b'\\' && i + 1 < bytes.len() {
                                out.extend_from_slice(&bytes[i..i + 2]);
                                i += 2;
                            } else {
                                out.push(bytes[i]);
                                i += 1;
                            }
                        }
                        if i < bytes.len() && bytes[i] == quote {
                            out.push(quote);
                            i += 1;
                        }
                    }
                    b'`' => {
                        mode = ScanMode::Template;
                        out.push(b'`');
                        i += 1;
                    }
                    _ => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                },
                ScanMode::BlockComment => {
                    if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                        mode = ScanMode::Code;
                        i += 2;
                    } else {
                        // Keep newlines so line numbering survives
                        if bytes[i] == b'\n' {
                            out.push(b'\n');
                        }
                        i += 1;
                    }
                }
                ScanMode::Template => {
                    if bytes[i] == b'\\' && i + 1 < bytes.len() {
                        out.extend_from_slice(&bytes[i..i + 2]);
                        i += 2;
                    } else {
                        if bytes[i] == b'`' {
                            mode = ScanMode::Code;
                        }
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
        }

        // Comments are ASCII-delimited, so the surviving bytes are valid
        // UTF-8.
        let stripped = String::from_utf8_lossy(&out).into_owned();
        let code: String = stripped
            .split_inclusive('\n')
            .map(|line| {
                let newline = line.ends_with('\n');
                let stripped = line.trim_end();
                if newline {
                    format!("{stripped}\n")
                } else {
                    stripped.to_string()
                }
            })
            .collect();
        let map = settings
            .source_map
            .as_ref()
            .and_then(|map_settings| map_settings.content.clone());
        Ok(MinifyOutput { code, map })
    }
}

/// Rewrite a returned source map's `sources` entries to strip the map root
/// prefix.
pub fn fuse_source_map(map_json: &str, root: &str) -> BindleResult<String> {
    let mut map: Value = serde_json::from_str(map_json)?;
    if let Some(sources) = map.get_mut("sources").and_then(Value::as_array_mut) {
        for entry in sources {
            if let Value::String(source) = entry {
                if let Some(stripped) = source.strip_prefix(root) {
                    *source = stripped.to_string();
                }
            }
        }
    }
    serde_json::to_string(&map).map_err(BindleError::from)
}
