//! Opaque identifier tokens and fresh-token minting (the "Fresh-token rule").
//!
//! A token is any string used as a `Self`/`XMLContent`/`AppliedXStyle` value;
//! this crate treats it as opaque and never infers structure from it beyond
//! what's needed to mint new ones that don't collide. Minting pairs a fixed
//! prefix with a monotonic counter rather than generating a fresh random
//! identifier per call, so collisions within one run are structurally
//! impossible rather than merely unlikely.

use std::collections::HashSet;

use crate::xmldoc::Element;

const PLAIN_TOKEN_ATTRS: &[&str] = &["Self", "XMLContent", "ParentStory"];
/// `MarkupTag` is excluded: its `XMLTag/<name>` values name tags, not
/// package identifiers (see `prefixer::PATH_TOKEN_ATTRS`).
const PATH_TOKEN_ATTRS: &[&str] = &[
    "AppliedCharacterStyle",
    "AppliedParagraphStyle",
    "AppliedObjectStyle",
    "AppliedCellStyle",
    "AppliedTableStyle",
];

/// Collects every token referenced by `element` and its descendants, across
/// every identifier-bearing attribute the prefixer and splicer understand.
pub fn collect_tokens(element: &Element, out: &mut HashSet<String>) {
    for (key, value) in &element.attrs {
        if key == "StoryList" {
            out.extend(value.split_whitespace().map(str::to_string));
        } else if PLAIN_TOKEN_ATTRS.contains(&key.as_str()) {
            out.insert(value.clone());
        } else if PATH_TOKEN_ATTRS.contains(&key.as_str()) {
            let token = value.rsplit_once('/').map(|(_, t)| t).unwrap_or(value);
            out.insert(token.to_string());
        }
    }
    for child in element.children_elements() {
        collect_tokens(child, out);
    }
}

/// Collects every `XMLContent` reference within `element` and its descendants,
/// in document order, for graph traversal when pulling in reachable stories.
pub fn collect_xml_content_refs(element: &Element, out: &mut Vec<String>) {
    if let Some(token) = element.xml_content() {
        out.push(token.to_string());
    }
    for child in element.children_elements() {
        collect_xml_content_refs(child, out);
    }
}

/// Returns the longest leading run of ASCII alphabetic characters shared by
/// every token in `tokens`. Used to guess a sensible mint prefix from a
/// package's existing identifiers when the caller doesn't supply one.
pub fn common_alpha_prefix<'a, I: IntoIterator<Item = &'a str>>(tokens: I) -> String {
    let mut prefix: Option<String> = None;
    for token in tokens {
        let alpha: String = token.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
        prefix = Some(match prefix {
            None => alpha,
            Some(existing) => {
                let common_len = existing
                    .chars()
                    .zip(alpha.chars())
                    .take_while(|(a, b)| a == b)
                    .count();
                existing[..common_len].to_string()
            }
        });
    }
    prefix.unwrap_or_default()
}

/// Mints tokens of the form `<prefix>fresh<counter>`, skipping any candidate
/// already present in the recipient's token space.
pub struct TokenMinter {
    prefix: String,
    counter: u64,
}

impl TokenMinter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: 1,
        }
    }

    pub fn mint(&mut self, existing: &HashSet<String>) -> String {
        let mut buf = itoa::Buffer::new();
        loop {
            let candidate = format!("{}fresh{}", self.prefix, buf.format(self.counter));
            self.counter += 1;
            if !existing.contains(&candidate) {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_common_prefix() {
        let tokens = vec!["main102", "main11b", "main139"];
        assert_eq!(common_alpha_prefix(tokens), "main");
    }

    #[test]
    fn empty_when_no_common_prefix() {
        let tokens = vec!["u102", "di3"];
        assert_eq!(common_alpha_prefix(tokens), "");
    }

    #[test]
    fn mints_without_collision() {
        let mut existing = HashSet::new();
        existing.insert("mainfresh1".to_string());
        let mut minter = TokenMinter::new("main");
        let token = minter.mint(&existing);
        assert_eq!(token, "mainfresh2");
        assert!(!existing.contains(&token));
    }
}
