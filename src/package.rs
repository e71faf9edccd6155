//! The package façade: everything a caller touches day to day.
//!
//! `open`/`from_bytes`/`save` read and write a ZIP container into/out of an
//! in-memory part map, and the façade sequences the lower layers
//! (archive -> xmldoc -> registry -> structure/views/prefixer/splicer)
//! behind one type.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use crate::archive::Archive;
use crate::error::IdmlError;
use crate::prefixer;
use crate::registry::{
    self, spread_path_for_token, story_path_for_token, PartCategory, PartData, PartEntry, Parts,
    DESIGNMAP_PATH, FONTS_PATH, GRAPHIC_PATH, STYLES_PATH, STYLE_GROUP_TAGS, TAGS_PATH,
};
use crate::splicer::{self, DonorPage};
use crate::structure;
use crate::token::{common_alpha_prefix, TokenMinter};
use crate::views::{SpreadView, StoryView};
use crate::xmldoc::{Element, XmlDoc};

/// Tuning knobs for [`IdmlPackage::open_with_options`] / [`IdmlPackage::save_with_options`].
/// The defaults suit every documented scenario; `fresh_token_prefix` only
/// needs overriding when a caller wants splice-minted tokens to carry a
/// specific, stable namespace rather than one inferred from the package's
/// own identifiers, and `compression_level` only when the default Deflate
/// balance doesn't fit (e.g. `Some(9)` for an archival save).
#[derive(Debug, Clone)]
pub struct PackageOptions {
    pub fresh_token_prefix: Option<String>,
    pub compression_level: Option<i64>,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            fresh_token_prefix: None,
            compression_level: Some(6),
        }
    }
}

/// An open IDML package: a part map plus the designmap that ties it together.
pub struct IdmlPackage {
    parts: Parts,
    options: PackageOptions,
}

impl IdmlPackage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IdmlError> {
        Self::open_with_options(path, PackageOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(
        path: P,
        options: PackageOptions,
    ) -> Result<Self, IdmlError> {
        let bytes = fs::read(path)?;
        Self::from_bytes_with_options(&bytes, options)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdmlError> {
        Self::from_bytes_with_options(bytes, PackageOptions::default())
    }

    pub fn from_bytes_with_options(bytes: &[u8], options: PackageOptions) -> Result<Self, IdmlError> {
        let archive = Archive::from_bytes(bytes).map_err(IdmlError::Archive)?;
        let mut parts = Parts::new();
        for path in archive.names() {
            let bytes = archive.member(path).expect("path just listed by names()");
            let category = registry::classify(path);
            let data = if path.to_ascii_lowercase().ends_with(".xml") {
                PartData::Xml(XmlDoc::parse(bytes, path).map_err(IdmlError::Archive)?)
            } else {
                PartData::Blob(bytes.to_vec())
            };
            parts.insert(path.to_string(), PartEntry { category, data });
        }
        if !parts.contains_key(DESIGNMAP_PATH) {
            return Err(IdmlError::MalformedPackage(
                "missing designmap.xml".to_string(),
            ));
        }
        log::debug!("opened idml package with {} parts", parts.len());
        Ok(Self { parts, options })
    }

    fn designmap_doc(&self) -> Result<&XmlDoc, IdmlError> {
        self.parts
            .get(DESIGNMAP_PATH)
            .and_then(|e| e.data.as_xml())
            .ok_or_else(|| IdmlError::MalformedPackage("missing designmap.xml".to_string()))
    }

    fn designmap_root(&self) -> Result<&Element, IdmlError> {
        Ok(&self.designmap_doc()?.root)
    }

    fn structure_root(&self) -> Result<&Element, IdmlError> {
        self.designmap_root()?
            .child("Root", 1)
            .ok_or_else(|| IdmlError::MalformedPackage("designmap has no Root".to_string()))
    }

    fn xml_part_root(&self, path: &str) -> Result<&Element, IdmlError> {
        self.parts
            .get(path)
            .and_then(|e| e.data.as_xml())
            .map(|doc| &doc.root)
            .ok_or_else(|| IdmlError::UnknownPath(path.to_string()))
    }

    pub fn spreads(&self) -> Result<Vec<String>, IdmlError> {
        Ok(registry::ordered_spread_paths(self.designmap_root()?))
    }

    pub fn stories(&self) -> Result<Vec<String>, IdmlError> {
        Ok(registry::ordered_story_paths(self.designmap_root()?))
    }

    pub fn tags(&self) -> Result<Vec<&Element>, IdmlError> {
        Ok(self.xml_part_root(TAGS_PATH)?.children_elements().collect())
    }

    pub fn style_groups(&self) -> Result<Vec<&Element>, IdmlError> {
        Ok(self
            .xml_part_root(STYLES_PATH)?
            .children_elements()
            .filter(|e| STYLE_GROUP_TAGS.contains(&e.tag.as_str()))
            .collect())
    }

    pub fn font_families(&self) -> Result<Vec<&Element>, IdmlError> {
        Ok(self.xml_part_root(FONTS_PATH)?.children_elements().collect())
    }

    pub fn graphics(&self) -> Result<Vec<&Element>, IdmlError> {
        Ok(self.xml_part_root(GRAPHIC_PATH)?.children_elements().collect())
    }

    pub fn designmap(&self) -> Result<&Element, IdmlError> {
        self.designmap_root()
    }

    /// Builds the structure tree by depth-first story inlining. Computed
    /// fresh on every call rather than cached: package mutations (prefix,
    /// splice) would otherwise have to remember to invalidate a cache, and
    /// this tree is cheap relative to part parsing.
    pub fn xml_structure(&self) -> Result<Element, IdmlError> {
        let root = self.structure_root()?;
        let lookup = |token: &str| -> Option<&Element> {
            self.parts
                .get(&story_path_for_token(token))
                .and_then(|e| e.data.as_xml())
                .map(|d| &d.root)
        };
        structure::build(root, lookup)
    }

    pub fn get_story_by_xpath(&self, path: &str) -> Result<String, IdmlError> {
        let tree = self.xml_structure()?;
        structure::resolve_story(&tree, path)
    }

    pub fn get_story_object_by_id(&self, token: &str) -> Result<StoryView, IdmlError> {
        let path = story_path_for_token(token);
        let root = self.xml_part_root(&path)?.clone();
        Ok(StoryView { path, root })
    }

    pub fn get_spread_object_by_id(&self, token: &str) -> Result<SpreadView, IdmlError> {
        let path = spread_path_for_token(token);
        let root = self.xml_part_root(&path)?.clone();
        Ok(SpreadView { path, root })
    }

    pub fn namelist(&self) -> Vec<String> {
        let mut names: Vec<String> = self.parts.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn extractall<P: AsRef<Path>>(&self, dir: P) -> Result<(), IdmlError> {
        let dir = dir.as_ref();
        for (path, entry) in &self.parts {
            let dest = dir.join(path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(dest, entry.data.to_bytes())?;
        }
        Ok(())
    }

    /// Bulk identifier rewrite: every `Self`/`XMLContent`/`ParentStory`/
    /// `Applied*Style`/`StoryList` entry gets `prefix` prepended (`MarkupTag`
    /// is a separate tag namespace and is left alone), and
    /// `Spreads/Spread_*`/`Stories/Story_*` parts are renamed to match.
    pub fn prefix(mut self, prefix: &str) -> Result<Self, IdmlError> {
        log::info!("prefixing package with `{prefix}`");
        prefixer::prefix_package(&mut self.parts, prefix)?;
        Ok(self)
    }

    /// Grafts the subtree of `donor` found at `only_path` (e.g.
    /// `/Document/Root/module[1]`, or `/Document/Root` for the donor's whole
    /// structure) into the empty slot addressed by `target_path` (e.g.
    /// `/Document/Root/module[3]`), and merges `donor`'s style groups, tags,
    /// fonts and graphics into this package's matching resource parts.
    pub fn insert_idml(
        mut self,
        donor: &IdmlPackage,
        target_path: &str,
        only_path: &str,
    ) -> Result<Self, IdmlError> {
        let donor_designmap_root = donor.designmap_root()?.clone();
        let mut designmap_entry = self
            .parts
            .remove(DESIGNMAP_PATH)
            .ok_or_else(|| IdmlError::MalformedPackage("missing designmap.xml".to_string()))?;
        let result = (|| {
            let designmap_doc = designmap_entry
                .data
                .as_xml_mut()
                .ok_or_else(|| IdmlError::MalformedPackage("designmap.xml is not xml".to_string()))?;
            splicer::insert_idml(
                &mut designmap_doc.root,
                &mut self.parts,
                &donor_designmap_root,
                &donor.parts,
                target_path,
                only_path,
            )
        })();
        self.parts.insert(DESIGNMAP_PATH.to_string(), designmap_entry);
        result?;
        Ok(self)
    }

    fn donor_pages(donor: &IdmlPackage) -> Result<Vec<DonorPage>, IdmlError> {
        let spread_paths = donor.spreads()?;
        let mut spreads = Vec::with_capacity(spread_paths.len());
        for path in &spread_paths {
            spreads.push((path.as_str(), donor.xml_part_root(path)?));
        }
        Ok(splicer::donor_pages(&spreads))
    }

    /// Picks the spread a newly lifted page should land on: the package's
    /// last spread, if it still has room for another page (a spread holds at
    /// most two, verso and recto), or a freshly minted one otherwise.
    fn spread_for_new_page(&mut self) -> Result<String, IdmlError> {
        let spreads = self.spreads()?;
        if let Some(path) = spreads.last() {
            let has_room = splicer::spread_page_count(self.xml_part_root(path)?) < 2;
            if has_room {
                return Ok(path.clone());
            }
        }
        self.create_empty_spread()
    }

    /// Shared plumbing for [`IdmlPackage::add_page_from_idml`] and
    /// [`IdmlPackage::add_pages_from_idml`]: appends `donor_page` (with its
    /// items) to the spread [`Self::spread_for_new_page`] picks -- minting a
    /// fresh spread once the current last one already holds two pages --
    /// alternating facing as [`splicer::add_page`] does, then runs `graft`
    /// against the same designmap to perform whichever structural-tree
    /// splice the caller needs.
    fn splice_one_page(
        &mut self,
        donor: &IdmlPackage,
        donor_page: &DonorPage,
        graft: impl FnOnce(&mut Element, &mut Parts) -> Result<(), IdmlError>,
    ) -> Result<(), IdmlError> {
        let target_spread_path = self.spread_for_new_page()?;

        let mut designmap_entry = self
            .parts
            .remove(DESIGNMAP_PATH)
            .ok_or_else(|| IdmlError::MalformedPackage("missing designmap.xml".to_string()))?;
        let mut spread_entry = self
            .parts
            .remove(&target_spread_path)
            .ok_or_else(|| IdmlError::UnknownPath(target_spread_path.clone()))?;

        let result = (|| {
            let designmap_doc = designmap_entry
                .data
                .as_xml_mut()
                .ok_or_else(|| IdmlError::MalformedPackage("designmap.xml is not xml".to_string()))?;
            let spread_doc = spread_entry
                .data
                .as_xml_mut()
                .ok_or_else(|| IdmlError::MalformedPackage(target_spread_path.clone()))?;
            splicer::add_page(
                &mut designmap_doc.root,
                &mut self.parts,
                &mut spread_doc.root,
                donor_page,
                &donor.parts,
            )?;
            graft(&mut designmap_doc.root, &mut self.parts)
        })();

        self.parts.insert(DESIGNMAP_PATH.to_string(), designmap_entry);
        self.parts.insert(target_spread_path, spread_entry);
        result
    }

    /// Lifts page `page_index` (across `donor`'s spreads, in declared order)
    /// out of `donor`, appends it (with its items) to this package's last
    /// spread, minting a fresh spread if none exists yet or the last one
    /// already holds two pages, alternates its facing from whatever page
    /// currently ends that spread, and grafts the donor structure subtree
    /// found at `only_path` as a new child of the structure node found at
    /// `at_path`.
    pub fn add_page_from_idml(
        mut self,
        donor: &IdmlPackage,
        page_index: usize,
        at_path: &str,
        only_path: &str,
    ) -> Result<Self, IdmlError> {
        let pages = Self::donor_pages(donor)?;
        let donor_page = pages
            .get(page_index)
            .ok_or_else(|| IdmlError::UnknownPath(format!("donor page index {page_index}")))?;
        let donor_designmap_root = donor.designmap_root()?.clone();

        self.splice_one_page(donor, donor_page, |designmap_root, parts| {
            splicer::append_structure_child(
                designmap_root,
                parts,
                &donor_designmap_root,
                &donor.parts,
                at_path,
                only_path,
            )
        })?;
        Ok(self)
    }

    /// Appends every page of `donor`, in declared order, grafting each page's
    /// structural counterpart -- the donor structure root's Nth child, by
    /// page-index correspondence -- as a new child of `at_path`.
    pub fn add_pages_from_idml(mut self, donor: &IdmlPackage, at_path: &str) -> Result<Self, IdmlError> {
        let pages = Self::donor_pages(donor)?;
        let donor_designmap_root = donor.designmap_root()?.clone();
        for (i, donor_page) in pages.iter().enumerate() {
            self.splice_one_page(donor, donor_page, |designmap_root, parts| {
                splicer::append_nth_structure_child(
                    designmap_root,
                    parts,
                    &donor_designmap_root,
                    &donor.parts,
                    at_path,
                    i,
                )
            })?;
        }
        Ok(self)
    }

    /// Re-homes `items` onto page `page_self` of `spread_path`, replacing
    /// whatever items currently follow it up to the next page. The owned
    /// [`crate::views::PageView::page_items`] snapshot has no live setter
    /// (see `views.rs`'s module doc comment); this is that mutator.
    pub fn set_page_items(
        &mut self,
        spread_path: &str,
        page_self: &str,
        items: Vec<Element>,
    ) -> Result<(), IdmlError> {
        let entry = self
            .parts
            .get_mut(spread_path)
            .ok_or_else(|| IdmlError::UnknownPath(spread_path.to_string()))?;
        let doc = entry
            .data
            .as_xml_mut()
            .ok_or_else(|| IdmlError::MalformedPackage(spread_path.to_string()))?;
        splicer::set_page_items(&mut doc.root, page_self, items)
    }

    /// Flips page `page_self`'s facing to `recto`, re-offsetting its
    /// `GeometricBounds` so the recto/verso invariant still holds.
    pub fn set_page_face(&mut self, spread_path: &str, page_self: &str, recto: bool) -> Result<(), IdmlError> {
        let entry = self
            .parts
            .get_mut(spread_path)
            .ok_or_else(|| IdmlError::UnknownPath(spread_path.to_string()))?;
        let doc = entry
            .data
            .as_xml_mut()
            .ok_or_else(|| IdmlError::MalformedPackage(spread_path.to_string()))?;
        splicer::set_page_face(&mut doc.root, page_self, recto)
    }

    fn create_empty_spread(&mut self) -> Result<String, IdmlError> {
        let mut existing = splicer::all_self_and_story_tokens(&self.parts);
        existing.extend(
            self.designmap_root()?
                .attr("Self")
                .map(str::to_string),
        );
        let prefix = self
            .options
            .fresh_token_prefix
            .clone()
            .unwrap_or_else(|| common_alpha_prefix(existing.iter().map(String::as_str)));
        let mut minter = TokenMinter::new(prefix);
        let token = minter.mint(&existing);
        let path = spread_path_for_token(&token);

        let mut root = Element::new("Spread");
        root.set_attr("Self", token.clone());
        self.parts.insert(
            path.clone(),
            PartEntry {
                category: PartCategory::Spread,
                data: PartData::Xml(XmlDoc { pi: None, root }),
            },
        );

        let designmap_entry = self
            .parts
            .get_mut(DESIGNMAP_PATH)
            .ok_or_else(|| IdmlError::MalformedPackage("missing designmap.xml".to_string()))?;
        let designmap_doc = designmap_entry
            .data
            .as_xml_mut()
            .ok_or_else(|| IdmlError::MalformedPackage("designmap.xml is not xml".to_string()))?;
        let mut entry = Element::new("idPkg:Spread");
        entry.set_attr("src", path.clone());
        designmap_doc
            .root
            .children
            .push(crate::xmldoc::Node::Element(entry));

        Ok(path)
    }

    /// Renders the structure tree as XML text with the internal
    /// bookkeeping attributes (`Self`, `XMLContent`) stripped.
    pub fn export_xml(&self) -> Result<String, IdmlError> {
        let mut tree = self.xml_structure()?;
        strip_bookkeeping_attrs(&mut tree);
        let doc = XmlDoc { pi: None, root: tree };
        Ok(String::from_utf8_lossy(&doc.to_bytes()).into_owned())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), IdmlError> {
        self.save_with_options(path, &self.options)
    }

    /// Like [`IdmlPackage::save`], but with explicit [`PackageOptions`]
    /// (currently only `compression_level` affects saving) instead of the
    /// package's own.
    pub fn save_with_options<P: AsRef<Path>>(
        &self,
        path: P,
        options: &PackageOptions,
    ) -> Result<(), IdmlError> {
        let bytes = self.to_bytes_with_options(options)?;
        let path = path.as_ref();
        let tmp_path = path.with_extension("idml.tmp");
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, path)?;
        log::debug!("saved idml package to {}", path.display());
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, IdmlError> {
        self.to_bytes_with_options(&self.options)
    }

    fn to_bytes_with_options(&self, options: &PackageOptions) -> Result<Vec<u8>, IdmlError> {
        let mut archive = Archive::new();
        for (path, entry) in &self.parts {
            archive.insert(path.clone(), entry.data.to_bytes());
        }
        let level = options.compression_level.unwrap_or(6);
        archive.to_bytes_with_level(level).map_err(IdmlError::Archive)
    }
}

fn strip_bookkeeping_attrs(element: &mut Element) {
    element.attrs.retain(|(k, _)| k != "Self" && k != "XMLContent");
    for child in element.children_elements_mut() {
        strip_bookkeeping_attrs(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_part(zip: &mut ZipWriter<&mut Cursor<Vec<u8>>>, name: &str, bytes: &[u8]) {
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(bytes).unwrap();
    }

    fn fixture_bytes() -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut cursor);
            write_part(&mut zip, "mimetype", b"application/vnd.adobe.indesign-idml-package");
            write_part(
                &mut zip,
                "designmap.xml",
                br#"<Document Self="d" StoryList="u139">
                    <idPkg:Spread src="Spreads/Spread_ub6.xml"/>
                    <idPkg:Story src="Stories/Story_u139.xml"/>
                    <Root Self="di2"><article XMLContent="u139" Self="di2i3"/></Root>
                </Document>"#,
            );
            write_part(
                &mut zip,
                "Spreads/Spread_ub6.xml",
                br#"<Spread Self="ub6"><Page Self="p1" GeometricBounds="-100 -200 100 0"/></Spread>"#,
            );
            write_part(
                &mut zip,
                "Stories/Story_u139.xml",
                br#"<Story Self="u139"><p Self="u139p">hello</p></Story>"#,
            );
            write_part(
                &mut zip,
                "XML/Tags.xml",
                br#"<Tags><XMLTag Self="XMLTag/photo" Name="photo"/></Tags>"#,
            );
            write_part(
                &mut zip,
                "Resources/Styles.xml",
                br#"<Styles><RootCharacterStyleGroup Self="g1"/><RootParagraphStyleGroup Self="g2"/></Styles>"#,
            );
            write_part(
                &mut zip,
                "Resources/Fonts.xml",
                br#"<Fonts><FontFamily Self="FontFamily/Minion" Name="Minion Pro"/></Fonts>"#,
            );
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn opens_and_reads_package_structure() {
        let pkg = IdmlPackage::from_bytes(&fixture_bytes()).unwrap();
        assert_eq!(pkg.spreads().unwrap(), vec!["Spreads/Spread_ub6.xml"]);
        assert_eq!(pkg.stories().unwrap(), vec!["Stories/Story_u139.xml"]);
        assert_eq!(pkg.tags().unwrap().len(), 1);
        assert_eq!(pkg.style_groups().unwrap().len(), 2);
        assert_eq!(pkg.font_families().unwrap()[0].attr("Name"), Some("Minion Pro"));

        let story = pkg.get_story_object_by_id("u139").unwrap();
        assert_eq!(story.get_element_content_by_id("u139p").as_deref(), Some("hello"));
    }

    #[test]
    fn to_bytes_with_options_honors_compression_level() {
        let pkg = IdmlPackage::from_bytes(&fixture_bytes()).unwrap();
        let stored = pkg
            .to_bytes_with_options(&PackageOptions {
                fresh_token_prefix: None,
                compression_level: Some(1),
            })
            .unwrap();
        let reopened = IdmlPackage::from_bytes(&stored).unwrap();
        assert_eq!(reopened.spreads().unwrap(), vec!["Spreads/Spread_ub6.xml"]);
    }

    #[test]
    fn namelist_matches_source_archive() {
        let bytes = fixture_bytes();
        let archive = Archive::from_bytes(&bytes).unwrap();
        let mut from_archive: Vec<&str> = archive.names().collect();
        from_archive.sort();

        let pkg = IdmlPackage::from_bytes(&bytes).unwrap();
        assert_eq!(pkg.namelist(), from_archive);
    }

    #[test]
    fn prefix_then_save_round_trips() {
        let pkg = IdmlPackage::from_bytes(&fixture_bytes()).unwrap();
        let pkg = pkg.prefix("FOO").unwrap();
        assert_eq!(pkg.spreads().unwrap(), vec!["Spreads/Spread_FOOub6.xml"]);

        let bytes = pkg.to_bytes().unwrap();
        let reopened = IdmlPackage::from_bytes(&bytes).unwrap();
        assert_eq!(reopened.spreads().unwrap(), vec!["Spreads/Spread_FOOub6.xml"]);
    }

    #[test]
    fn set_page_face_and_items_mutate_the_spread_in_place() {
        let mut pkg = IdmlPackage::from_bytes(&fixture_bytes()).unwrap();
        pkg.set_page_face("Spreads/Spread_ub6.xml", "p1", true).unwrap();
        let spread = pkg.get_spread_object_by_id("ub6").unwrap();
        let page = spread.root.child("Page", 1).unwrap();
        assert!(crate::views::compute_coordinates(page).unwrap().is_recto());

        let mut item = Element::new("Oval");
        item.set_attr("Self", "newoval");
        pkg.set_page_items("Spreads/Spread_ub6.xml", "p1", vec![item]).unwrap();
        let spread = pkg.get_spread_object_by_id("ub6").unwrap();
        assert!(spread.root.children_elements().any(|e| e.tag == "Oval"));
    }

    #[test]
    fn export_xml_strips_bookkeeping_attrs() {
        let pkg = IdmlPackage::from_bytes(&fixture_bytes()).unwrap();
        let xml = pkg.export_xml().unwrap();
        assert!(!xml.contains("XMLContent"));
        assert!(!xml.contains("Self="));
    }
}
