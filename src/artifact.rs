//! Artifact serialization
//!
//! The artifact is a single text file: a manifest naming every embedded
//! asset (with byte length and optional alias), then the payloads joined
//! by scissor separators. Emission order is lexicographic with the
//! entrypoint's output floated to the front and every `.map` immediately
//! preceding its base asset. The format round-trips: `parse` recovers the
//! asset table and alias set exactly.

use std::collections::BTreeMap;

use crate::error::{BindleError, BindleResult};

const MAGIC: &str = "\u{1F4E6}\n";
const SEPARATOR_LINE: &str = "\u{2704}\n";
const PAYLOAD_SEPARATOR: &str = "\n\u{2704}\n";
const ALIAS_PREFIX: &str = "\u{21BB} ";

/// One embedded asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
    pub name: String,
    pub alias: Option<String>,
    pub data: Vec<u8>,
}

/// The serialized bundle: manifest plus payloads, in emission order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Artifact {
    pub entries: Vec<ArtifactEntry>,
}

impl Artifact {
    /// Assemble an artifact from the final asset table.
    ///
    /// `entry_name` is the entrypoint's output asset name; it floats to
    /// position 0 while every other asset keeps its sorted index. Map
    /// siblings are interleaved immediately before their base asset.
    pub fn from_assets(
        output: &BTreeMap<String, Vec<u8>>,
        aliases: &BTreeMap<String, String>,
        entry_name: &str,
    ) -> Artifact {
        let mut ordered: Vec<&String> = output
            .keys()
            .filter(|name| {
                // A map travels with its base asset, not on its own,
                // unless it is orphaned.
                match name.strip_suffix(".map") {
                    Some(base) => !output.contains_key(base),
                    None => true,
                }
            })
            .collect();
        if let Some(position) = ordered.iter().position(|name| name.as_str() == entry_name) {
            let entry = ordered.remove(position);
            ordered.insert(0, entry);
        }

        let mut entries = Vec::with_capacity(output.len());
        for name in ordered {
            let sibling = format!("{name}.map");
            if let Some(map_data) = output.get(&sibling) {
                entries.push(ArtifactEntry {
                    name: sibling.clone(),
                    alias: aliases.get(&sibling).cloned(),
                    data: map_data.clone(),
                });
            }
            entries.push(ArtifactEntry {
                name: name.clone(),
                alias: aliases.get(name).cloned(),
                data: output[name].clone(),
            });
        }
        Artifact { entries }
    }

    /// Serialize to the wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC.as_bytes());
        for entry in &self.entries {
            out.extend_from_slice(format!("{} {}\n", entry.data.len(), entry.name).as_bytes());
            if let Some(alias) = &entry.alias {
                out.extend_from_slice(format!("{ALIAS_PREFIX}{alias}\n").as_bytes());
            }
        }
        out.extend_from_slice(SEPARATOR_LINE.as_bytes());
        for (index, entry) in self.entries.iter().enumerate() {
            if index > 0 {
                out.extend_from_slice(PAYLOAD_SEPARATOR.as_bytes());
            }
            out.extend_from_slice(&entry.data);
        }
        out
    }

    /// Serialize to text; payloads are UTF-8 by construction
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.to_bytes()).into_owned()
    }

    /// Parse a serialized artifact back into its entries
    pub fn parse(text: &str) -> BindleResult<Artifact> {
        let bytes = text.as_bytes();
        if !text.starts_with(MAGIC) {
            return Err(malformed("missing package header"));
        }
        let mut offset = MAGIC.len();

        struct ManifestLine {
            length: usize,
            name: String,
            alias: Option<String>,
        }
        let mut manifest: Vec<ManifestLine> = Vec::new();
        loop {
            let line_end = text[offset..]
                .find('\n')
                .map(|idx| offset + idx)
                .ok_or_else(|| malformed("unterminated manifest"))?;
            let line = &text[offset..line_end];
            offset = line_end + 1;
            if line == SEPARATOR_LINE.trim_end() {
                break;
            }
            if let Some(alias) = line.strip_prefix(ALIAS_PREFIX) {
                let last = manifest
                    .last_mut()
                    .ok_or_else(|| malformed("alias before any manifest entry"))?;
                last.alias = Some(alias.to_string());
                continue;
            }
            let (length, name) = line
                .split_once(' ')
                .ok_or_else(|| malformed("manifest line without length"))?;
            let length: usize = length
                .parse()
                .map_err(|_| malformed("manifest length is not a number"))?;
            if !name.starts_with('/') {
                return Err(malformed("asset name must be absolute"));
            }
            manifest.push(ManifestLine {
                length,
                name: name.to_string(),
                alias: None,
            });
        }

        let mut entries = Vec::with_capacity(manifest.len());
        let count = manifest.len();
        for (index, line) in manifest.into_iter().enumerate() {
            let end = offset
                .checked_add(line.length)
                .filter(|end| *end <= bytes.len())
                .ok_or_else(|| malformed("payload shorter than manifest length"))?;
            let data = bytes[offset..end].to_vec();
            offset = end;
            if index + 1 < count {
                let separator_end = offset + PAYLOAD_SEPARATOR.len();
                if separator_end > bytes.len()
                    || &bytes[offset..separator_end] != PAYLOAD_SEPARATOR.as_bytes()
                {
                    return Err(malformed("missing payload separator"));
                }
                offset = separator_end;
            }
            entries.push(ArtifactEntry {
                name: line.name,
                alias: line.alias,
                data,
            });
        }
        if offset != bytes.len() {
            return Err(malformed("trailing bytes after final payload"));
        }
        Ok(Artifact { entries })
    }
}

fn malformed(message: &str) -> BindleError {
    BindleError::MalformedArtifact {
        message: message.to_string(),
    }
}
