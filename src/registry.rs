//! Part classification and designmap-declared ordering.
//!
//! An OOXML-style package keeps its parts in a map plus a relationships
//! graph that supplies real ordering; an IDML package has no relationships
//! part, so the analogous "declared order" comes from designmap.xml's own
//! child element sequence instead.

use std::collections::HashMap;

use crate::xmldoc::{Element, XmlDoc};

pub const DESIGNMAP_PATH: &str = "designmap.xml";
pub const TAGS_PATH: &str = "XML/Tags.xml";
pub const BACKING_STORY_PATH: &str = "XML/BackingStory.xml";
pub const STYLES_PATH: &str = "Resources/Styles.xml";
pub const FONTS_PATH: &str = "Resources/Fonts.xml";
pub const GRAPHIC_PATH: &str = "Resources/Graphic.xml";

/// The five style-group roots nested directly under `Resources/Styles.xml`'s
/// document element.
pub const STYLE_GROUP_TAGS: &[&str] = &[
    "RootCharacterStyleGroup",
    "RootParagraphStyleGroup",
    "RootCellStyleGroup",
    "RootTableStyleGroup",
    "RootObjectStyleGroup",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartCategory {
    DesignMap,
    Spread,
    Story,
    BackingStory,
    Tags,
    Styles,
    Fonts,
    Graphic,
    MasterSpread,
    Other,
}

pub fn classify(path: &str) -> PartCategory {
    match path {
        DESIGNMAP_PATH => PartCategory::DesignMap,
        BACKING_STORY_PATH => PartCategory::BackingStory,
        TAGS_PATH => PartCategory::Tags,
        STYLES_PATH => PartCategory::Styles,
        FONTS_PATH => PartCategory::Fonts,
        GRAPHIC_PATH => PartCategory::Graphic,
        _ if path.starts_with("Spreads/") => PartCategory::Spread,
        _ if path.starts_with("Stories/") => PartCategory::Story,
        _ if path.starts_with("MasterSpreads/") => PartCategory::MasterSpread,
        _ => PartCategory::Other,
    }
}

/// Token used by a `Self`/`XMLContent`/reference attribute to identify the
/// content of an entry in `StoryList`. A `StoryList` token with no matching
/// `Stories/Story_<t>.xml` part is a backing-story reference: it is kept
/// verbatim through every prefix and splice without ever resolving to a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoryRef {
    Part(String, String),
    Backing(String),
}

impl StoryRef {
    pub fn token(&self) -> &str {
        match self {
            StoryRef::Part(token, _) => token,
            StoryRef::Backing(token) => token,
        }
    }
}

/// Splits designmap's `StoryList` attribute into its whitespace-separated tokens.
pub fn story_list_tokens(designmap: &Element) -> Vec<String> {
    designmap
        .attr("StoryList")
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Reads `idPkg:Spread/@src` children of designmap in document order.
pub fn spread_paths(designmap: &Element) -> Vec<String> {
    designmap
        .children_elements()
        .filter(|e| e.tag == "idPkg:Spread")
        .filter_map(|e| e.attr("src"))
        .map(str::to_string)
        .collect()
}

/// Reads `idPkg:Story/@src` children of designmap in document order.
pub fn story_paths(designmap: &Element) -> Vec<String> {
    designmap
        .children_elements()
        .filter(|e| e.tag == "idPkg:Story")
        .filter_map(|e| e.attr("src"))
        .map(str::to_string)
        .collect()
}

/// Resolves every `StoryList` token to a [`StoryRef`], matching tokens against
/// the `idPkg:Story/@src` entries found via [`story_paths`]; tokens with no
/// matching entry are backing-story references.
pub fn story_refs(designmap: &Element) -> Vec<StoryRef> {
    let paths = story_paths(designmap);
    story_list_tokens(designmap)
        .into_iter()
        .map(|token| {
            let expected_suffix = format!("Story_{token}.xml");
            match paths.iter().find(|p| p.ends_with(&expected_suffix)) {
                Some(path) => StoryRef::Part(token, path.clone()),
                None => StoryRef::Backing(token),
            }
        })
        .collect()
}

/// Returns the designmap-declared `idPkg:Story` paths, in document order
/// (this is the iteration order used by [`crate::package::IdmlPackage::stories`],
/// which follows file order rather than `StoryList` order -- the two differ
/// in real packages).
pub fn ordered_story_paths(designmap: &Element) -> Vec<String> {
    story_paths(designmap)
}

pub fn ordered_spread_paths(designmap: &Element) -> Vec<String> {
    spread_paths(designmap)
}

pub fn story_path_for_token(token: &str) -> String {
    format!("Stories/Story_{token}.xml")
}

pub fn spread_path_for_token(token: &str) -> String {
    format!("Spreads/Spread_{token}.xml")
}

/// A part's in-memory payload: XML parts are kept parsed (mutated in place
/// by the prefixer/splicer), everything else (`mimetype`, binary resources)
/// is kept as raw bytes.
#[derive(Debug, Clone)]
pub enum PartData {
    Xml(XmlDoc),
    Blob(Vec<u8>),
}

impl PartData {
    pub fn as_xml(&self) -> Option<&XmlDoc> {
        match self {
            PartData::Xml(doc) => Some(doc),
            PartData::Blob(_) => None,
        }
    }

    pub fn as_xml_mut(&mut self) -> Option<&mut XmlDoc> {
        match self {
            PartData::Xml(doc) => Some(doc),
            PartData::Blob(_) => None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PartData::Xml(doc) => doc.to_bytes(),
            PartData::Blob(bytes) => bytes.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PartEntry {
    pub category: PartCategory,
    pub data: PartData,
}

pub type Parts = HashMap<String, PartEntry>;
