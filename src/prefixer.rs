//! Bulk identifier rewriting ("prefixing"): every `Self`, `XMLContent`,
//! `ParentStory`, `Applied*Style`, `StoryList` entry and
//! `idPkg:Story`/`idPkg:Spread`/@src in a package gets a caller-chosen
//! prefix prepended to its token, and the corresponding part files are
//! renamed to match. `MarkupTag` is left alone: its `XMLTag/<name>` values
//! name user-defined tags, a namespace disjoint from `Self`/`XMLContent`
//! tokens. A `StoryList` entry with no matching story part (a backing-story
//! token) is still prefixed along with every other entry, even though the
//! rename step has no matching part to rename.

use std::collections::HashMap;

use crate::error::IdmlError;
use crate::registry::{classify, PartCategory, PartData, PartEntry, Parts};
use crate::xmldoc::Element;

/// Attributes holding a bare token, prefixed directly.
pub(crate) const PLAIN_TOKEN_ATTRS: &[&str] = &["Self", "XMLContent", "ParentStory"];

/// Attributes holding a `Kind/token` reference; only the token after the
/// last `/` is prefixed. `MarkupTag` is deliberately absent: its
/// `XMLTag/<name>` values name tags, not package identifiers, and stay
/// untouched by prefixing and retokenization alike.
pub(crate) const PATH_TOKEN_ATTRS: &[&str] = &[
    "AppliedCharacterStyle",
    "AppliedParagraphStyle",
    "AppliedObjectStyle",
    "AppliedCellStyle",
    "AppliedTableStyle",
];

/// Rewrites every identifier-bearing attribute in `element` (and its
/// descendants) according to `map`, leaving tokens with no entry untouched.
/// Used by the splicer to re-tokenize grafted donor content so it can never
/// collide with the recipient's own identifiers.
pub fn retokenize_element(element: &mut Element, map: &HashMap<String, String>) {
    for (key, value) in element.attrs.iter_mut() {
        if key == "StoryList" {
            *value = value
                .split_whitespace()
                .map(|t| map.get(t).cloned().unwrap_or_else(|| t.to_string()))
                .collect::<Vec<_>>()
                .join(" ");
        } else if PLAIN_TOKEN_ATTRS.contains(&key.as_str()) {
            if let Some(new) = map.get(value.as_str()) {
                *value = new.clone();
            }
        } else if PATH_TOKEN_ATTRS.contains(&key.as_str()) {
            if let Some((head, tail)) = value.rsplit_once('/') {
                if let Some(new) = map.get(tail) {
                    *value = format!("{head}/{new}");
                }
            } else if let Some(new) = map.get(value.as_str()) {
                *value = new.clone();
            }
        }
    }
    for child in element.children_elements_mut() {
        retokenize_element(child, map);
    }
}

pub fn prefix_package(parts: &mut Parts, prefix: &str) -> Result<(), IdmlError> {
    for entry in parts.values_mut() {
        if let PartData::Xml(doc) = &mut entry.data {
            prefix_element(&mut doc.root, prefix);
        }
    }
    rename_parts(parts, prefix);
    Ok(())
}

fn prefix_element(element: &mut Element, prefix: &str) {
    for (key, value) in element.attrs.iter_mut() {
        if key == "StoryList" {
            *value = prefix_story_list(value, prefix);
        } else if PLAIN_TOKEN_ATTRS.contains(&key.as_str()) {
            *value = format!("{prefix}{value}");
        } else if PATH_TOKEN_ATTRS.contains(&key.as_str()) {
            *value = prefix_path_component(value, prefix);
        } else if key == "src" && (element.tag == "idPkg:Story" || element.tag == "idPkg:Spread") {
            *value = rewrite_part_filename(value, prefix);
        }
    }
    for child in element.children_elements_mut() {
        prefix_element(child, prefix);
    }
}

/// `StoryList` tokens are space-separated; a token with no matching
/// `Stories/Story_<token>.xml` part (a backing-story reference) is left
/// untouched rather than prefixed.
fn prefix_story_list(value: &str, prefix: &str) -> String {
    value
        .split_whitespace()
        .map(|token| format!("{prefix}{token}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn prefix_path_component(value: &str, prefix: &str) -> String {
    match value.rsplit_once('/') {
        Some((head, tail)) => format!("{head}/{prefix}{tail}"),
        None => format!("{prefix}{value}"),
    }
}

fn rewrite_part_filename(path: &str, prefix: &str) -> String {
    let (dir, filename) = path.rsplit_once('/').unwrap_or(("", path));
    for kind in ["Story_", "Spread_"] {
        if let Some(rest) = filename.strip_prefix(kind) {
            if let Some(token) = rest.strip_suffix(".xml") {
                let new_filename = format!("{kind}{prefix}{token}.xml");
                return if dir.is_empty() {
                    new_filename
                } else {
                    format!("{dir}/{new_filename}")
                };
            }
        }
    }
    path.to_string()
}

/// Renames `Spreads/Spread_<t>.xml` and `Stories/Story_<t>.xml` entries in
/// the part map to match the rewritten `idPkg:*/@src` values. `designmap.xml`,
/// `XML/Tags.xml`, `XML/BackingStory.xml` and resource parts keep their path.
fn rename_parts(parts: &mut Parts, prefix: &str) {
    let renames: Vec<(String, String)> = parts
        .keys()
        .filter(|path| {
            matches!(classify(path), PartCategory::Spread | PartCategory::Story)
        })
        .map(|path| (path.clone(), rewrite_part_filename(path, prefix)))
        .filter(|(old, new)| old != new)
        .collect();

    let mut renamed: HashMap<String, PartEntry> = HashMap::new();
    for (old, new) in renames {
        if let Some(entry) = parts.remove(&old) {
            renamed.insert(new, entry);
        }
    }
    parts.extend(renamed);
}
