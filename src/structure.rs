//! The structure tree: designmap's embedded `Root` element with every node's
//! `XMLContent` reference recursively inlined, depth-first, with the
//! referenced story's root element swapped out in favor of its children
//! (the referencing node keeps its own tag and `Self`).

use std::collections::HashSet;

use crate::error::IdmlError;
use crate::registry::{story_path_for_token, BACKING_STORY_PATH};
use crate::xmldoc::{Element, Node};

/// Builds the inlined structure tree from designmap's `Root` element.
/// `story_root` looks up the root element of `Stories/Story_<token>.xml`
/// for a given token, returning `None` when no such part exists.
pub fn build<'a, F>(root: &Element, story_root: F) -> Result<Element, IdmlError>
where
    F: Fn(&str) -> Option<&'a Element>,
{
    let mut visiting = HashSet::new();
    inline(root, &story_root, &mut visiting)
}

fn inline<'a, F>(
    node: &Element,
    story_root: &F,
    visiting: &mut HashSet<String>,
) -> Result<Element, IdmlError>
where
    F: Fn(&str) -> Option<&'a Element>,
{
    let mut out = Element {
        tag: node.tag.clone(),
        attrs: node.attrs.clone(),
        children: Vec::new(),
    };

    if let Some(token) = node.xml_content() {
        if let Some(story) = story_root(token) {
            if !visiting.insert(token.to_string()) {
                return Err(IdmlError::BrokenReference(format!(
                    "cycle detected while inlining story `{token}`"
                )));
            }
            for child in story.children_elements() {
                out.children.push(Node::Element(inline(child, story_root, visiting)?));
            }
            visiting.remove(token);
            return Ok(out);
        }
    }

    for child in node.children_elements() {
        out.children.push(Node::Element(inline(child, story_root, visiting)?));
    }
    Ok(out)
}

/// Walks an XPath-like, slash-separated path (`/Root/article[1]/Story/title`)
/// over an already-inlined structure tree and returns the part path of the
/// story "in effect" at the target node.
///
/// A node's own `XMLContent` only takes effect for resolving *its children*,
/// never for the node itself -- the story in effect at a node is whichever
/// story was entered by an ancestor strictly above it. A target with no such
/// ancestor resolves to the backing story.
pub fn resolve_story(tree_root: &Element, path: &str) -> Result<String, IdmlError> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let first = segments
        .next()
        .ok_or_else(|| IdmlError::UnknownPath(path.to_string()))?;
    let (first_tag, _) = parse_segment(first)?;
    if first_tag != tree_root.tag {
        return Err(IdmlError::UnknownPath(path.to_string()));
    }

    let mut node = tree_root;
    let mut current_story = BACKING_STORY_PATH.to_string();

    for segment in segments {
        if let Some(token) = node.xml_content() {
            current_story = story_path_for_token(token);
        }
        let (tag, index) = parse_segment(segment)?;
        node = node
            .child(&tag, index)
            .ok_or_else(|| IdmlError::UnknownPath(path.to_string()))?;
    }

    Ok(current_story)
}

pub(crate) fn parse_segment(segment: &str) -> Result<(String, usize), IdmlError> {
    if let Some(open) = segment.find('[') {
        let close = segment
            .find(']')
            .ok_or_else(|| IdmlError::UnknownPath(segment.to_string()))?;
        let tag = segment[..open].to_string();
        let index: usize = segment[open + 1..close]
            .parse()
            .map_err(|_| IdmlError::UnknownPath(segment.to_string()))?;
        Ok((tag, index))
    } else {
        Ok((segment.to_string(), 1))
    }
}
