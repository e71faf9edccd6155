//! Structural splicing: grafting content from one package into another.
//!
//! `insert_idml` grafts a donor package's whole structure subtree into an
//! empty slot of the recipient's. `add_page_from_idml`/`add_pages_from_idml`
//! lift one or more pages (with their items) out of a donor package's
//! spreads and append them to the recipient's. Donor content is copied
//! verbatim -- tokens are never rewritten on the way in -- on the
//! expectation that callers have already prefixed both packages into
//! disjoint namespaces; a pre-write check compares the two token spaces and
//! fails with [`IdmlError::TokenCollision`] if they overlap. The one
//! exception is a page-item container minted fresh to hold a newly relocated
//! story, which has no donor counterpart to preserve in the first place.

use std::collections::{HashSet, VecDeque};

use crate::error::IdmlError;
use crate::registry::{
    ordered_spread_paths, story_path_for_token, PartCategory, PartData, PartEntry, Parts,
    FONTS_PATH, GRAPHIC_PATH, STYLES_PATH, STYLE_GROUP_TAGS, TAGS_PATH,
};
use crate::structure::parse_segment;
use crate::token::{collect_tokens, collect_xml_content_refs, common_alpha_prefix, TokenMinter};
use crate::views::compute_coordinates;
use crate::xmldoc::{Element, Node};

/// Finds the raw (non-inlined) designmap node addressed by a slash-separated
/// `tag[index]` path, mirroring [`crate::structure::resolve_story`]'s segment
/// syntax but walking the undecorated tree so a slot's current occupancy can
/// be inspected directly.
fn navigate<'a>(root: &'a Element, path: &str) -> Result<&'a Element, IdmlError> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let first = segments
        .next()
        .ok_or_else(|| IdmlError::UnknownPath(path.to_string()))?;
    let (first_tag, _) = parse_segment(first)?;
    if first_tag != root.tag {
        return Err(IdmlError::UnknownPath(path.to_string()));
    }

    let mut node = root;
    for segment in segments {
        let (tag, index) = parse_segment(segment)?;
        node = node
            .child(&tag, index)
            .ok_or_else(|| IdmlError::UnknownPath(path.to_string()))?;
    }
    Ok(node)
}

fn navigate_mut<'a>(root: &'a mut Element, path: &str) -> Result<&'a mut Element, IdmlError> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let first = segments
        .next()
        .ok_or_else(|| IdmlError::UnknownPath(path.to_string()))?;
    let (first_tag, _) = parse_segment(first)?;
    if first_tag != root.tag {
        return Err(IdmlError::UnknownPath(path.to_string()));
    }

    let mut node = root;
    for segment in segments {
        let (tag, index) = parse_segment(segment)?;
        let pos = node
            .children_elements()
            .enumerate()
            .filter(|(_, e)| e.tag == tag)
            .nth(index.saturating_sub(1))
            .map(|(i, _)| i)
            .ok_or_else(|| IdmlError::UnknownPath(path.to_string()))?;
        node = node
            .children
            .iter_mut()
            .filter_map(|n| match n {
                Node::Element(e) => Some(e),
                Node::Text(_) => None,
            })
            .nth(pos)
            .expect("position was just computed from the same iterator");
    }
    Ok(node)
}

/// Walks the BFS closure of story tokens reachable from `seed_tokens` through
/// each story's own `XMLContent` references against `donor_parts`, returning
/// the reachable story tokens (each with a matching donor story part) in
/// first-reached order.
fn reachable_story_tokens(seed_tokens: &HashSet<String>, donor_parts: &Parts) -> Vec<String> {
    let mut queue: VecDeque<String> = seed_tokens.iter().cloned().collect();
    let mut seen = HashSet::new();
    let mut reachable = Vec::new();

    while let Some(token) = queue.pop_front() {
        if !seen.insert(token.clone()) {
            continue;
        }
        let Some(entry) = donor_parts.get(&story_path_for_token(&token)) else {
            continue;
        };
        let Some(doc) = entry.data.as_xml() else {
            continue;
        };
        reachable.push(token);
        let mut refs = Vec::new();
        collect_xml_content_refs(&doc.root, &mut refs);
        queue.extend(refs);
    }

    reachable
}

/// Every token `donor_subtree` (and whatever stories it transitively
/// references through `reachable_stories`) carries, for the pre-write
/// disjointness check.
fn donor_token_space(
    donor_subtree: &Element,
    donor_parts: &Parts,
    reachable_stories: &[String],
) -> HashSet<String> {
    let mut tokens = HashSet::new();
    collect_tokens(donor_subtree, &mut tokens);
    for token in reachable_stories {
        if let Some(doc) = donor_parts.get(&story_path_for_token(token)).and_then(|e| e.data.as_xml()) {
            collect_tokens(&doc.root, &mut tokens);
        }
    }
    tokens
}

/// Fails with [`IdmlError::TokenCollision`] on the first token shared between
/// `recipient_tokens` and `donor_tokens` -- the disjoint-namespace
/// precondition every splice operation requires of its caller.
fn check_disjoint(recipient_tokens: &HashSet<String>, donor_tokens: &HashSet<String>) -> Result<(), IdmlError> {
    match donor_tokens.intersection(recipient_tokens).next() {
        Some(token) => Err(IdmlError::TokenCollision(token.clone())),
        None => Ok(()),
    }
}

/// Copies each of `tokens`' donor story parts into `parts` verbatim, byte for
/// byte, preserving the donor's own token. Returns the tokens actually
/// copied (a token with no matching donor story part is skipped).
fn insert_story_parts_verbatim(parts: &mut Parts, donor_parts: &Parts, tokens: &[String]) -> Vec<String> {
    let mut copied = Vec::new();
    for token in tokens {
        let Some(entry) = donor_parts.get(&story_path_for_token(token)) else {
            continue;
        };
        let Some(doc) = entry.data.as_xml() else {
            continue;
        };
        parts.insert(
            story_path_for_token(token),
            PartEntry {
                category: PartCategory::Story,
                data: PartData::Xml(doc.clone()),
            },
        );
        copied.push(token.clone());
    }
    copied
}

fn append_story_list(designmap: &mut Element, tokens: &[String]) {
    let mut list = designmap
        .attr("StoryList")
        .map(str::to_string)
        .unwrap_or_default();
    for token in tokens {
        if !list.split_whitespace().any(|t| t == token) {
            if !list.is_empty() {
                list.push(' ');
            }
            list.push_str(token);
        }
    }
    designmap.set_attr("StoryList", list);
}

fn append_idpkg_story_entries(designmap: &mut Element, tokens: &[String]) {
    for token in tokens {
        let mut entry = Element::new("idPkg:Story");
        entry.set_attr("src", story_path_for_token(token));
        designmap.children.push(Node::Element(entry));
    }
}

pub(crate) fn all_self_and_story_tokens(parts: &Parts) -> HashSet<String> {
    let mut tokens = HashSet::new();
    for entry in parts.values() {
        if let Some(doc) = entry.data.as_xml() {
            collect_tokens(&doc.root, &mut tokens);
        }
    }
    tokens
}

/// Runs `merge` between `recipient_parts[path]` and `donor_parts[path]`'s
/// document elements when both sides carry that part. Either side missing
/// the part is not an error: a donor or recipient with no `Resources/
/// Fonts.xml`, say, simply contributes nothing to the merge.
fn merge_xml_part(
    recipient_parts: &mut Parts,
    donor_parts: &Parts,
    path: &str,
    merge: impl FnOnce(&mut Element, &Element),
) {
    let Some(donor_root) = donor_parts.get(path).and_then(|e| e.data.as_xml()).map(|d| &d.root) else {
        return;
    };
    let donor_root = donor_root.clone();
    let Some(entry) = recipient_parts.get_mut(path) else { return };
    let Some(doc) = entry.data.as_xml_mut() else { return };
    merge(&mut doc.root, &donor_root);
}

/// Concatenates each of the five style-group roots' donor children after the
/// recipient's own, preserving donor order. A group the recipient lacks
/// entirely is appended wholesale.
fn merge_style_groups(recipient_root: &mut Element, donor_root: &Element) {
    for tag in STYLE_GROUP_TAGS {
        let Some(donor_group) = donor_root.children_elements().find(|e| e.tag == *tag) else {
            continue;
        };
        let donor_children = donor_group.children.clone();
        match recipient_root.children_elements_mut().find(|e| e.tag == *tag) {
            Some(recipient_group) => recipient_group.children.extend(donor_children),
            None => recipient_root.children.push(Node::Element(donor_group.clone())),
        }
    }
}

/// Unions `donor_root`'s children into `recipient_root` by `Self`: a donor
/// child whose `Self` already appears among the recipient's children is
/// dropped (the recipient's copy wins), everything else is appended.
fn merge_unique_by_self(recipient_root: &mut Element, donor_root: &Element) {
    let existing: HashSet<&str> = recipient_root
        .children_elements()
        .filter_map(|e| e.attr("Self"))
        .collect();
    let to_add: Vec<Element> = donor_root
        .children_elements()
        .filter(|e| !matches!(e.attr("Self"), Some(id) if existing.contains(id)))
        .cloned()
        .collect();
    recipient_root.children.extend(to_add.into_iter().map(Node::Element));
}

/// Appends a new page-item referencing `root_token`'s story to the
/// recipient's last spread, satisfying the "relocate into spread" step of a
/// structural graft: a freshly grafted structure fragment that carries its
/// own `XMLContent` needs somewhere in the spread to actually display that
/// story, so a `TextFrame` with `ParentStory` set to the (verbatim) donor
/// token is appended there. The frame's own `Self` is freshly minted -- it is
/// a new page-item container, not copied donor content, so there is nothing
/// of the donor's to preserve.
fn relocate_into_spread(
    recipient_designmap: &Element,
    recipient_parts: &mut Parts,
    root_token: &str,
) -> Result<(), IdmlError> {
    let spread_path = ordered_spread_paths(recipient_designmap)
        .last()
        .cloned()
        .ok_or_else(|| IdmlError::MalformedPackage("package has no spread to relocate content into".to_string()))?;

    let mut existing_tokens = all_self_and_story_tokens(recipient_parts);
    collect_tokens(recipient_designmap, &mut existing_tokens);
    let prefix = common_alpha_prefix(existing_tokens.iter().map(String::as_str));
    let mut minter = TokenMinter::new(prefix);
    let fresh_self = minter.mint(&existing_tokens);

    let mut frame = Element::new("TextFrame");
    frame.set_attr("Self", fresh_self);
    frame.set_attr("ParentStory", root_token.to_string());

    let entry = recipient_parts
        .get_mut(&spread_path)
        .ok_or_else(|| IdmlError::UnknownPath(spread_path.clone()))?;
    let doc = entry
        .data
        .as_xml_mut()
        .ok_or_else(|| IdmlError::MalformedPackage(spread_path.clone()))?;
    doc.root.children.push(Node::Element(frame));
    log::debug!("insert_idml: relocated `{root_token}` into spread `{spread_path}`");
    Ok(())
}

/// Grafts the subtree of `donor` found at `only_path` into `target_path`'s
/// slot in `recipient`'s structure, which must currently carry no
/// `XMLContent` and no children of its own (an occupied slot is an
/// [`IdmlError::IncompatibleSlot`]).
///
/// `only_path` is resolved against `donor_designmap` the same way
/// `target_path` is resolved against `recipient_designmap`. When it names the
/// designmap's own `Root` element, `Root`'s tag is dissolved and its children
/// become the grafted content directly (matching how a node's own tag
/// disappears when its `XMLContent` is inlined, see `structure::build`).
/// Any other path keeps the named element's own tag: the target ends up
/// containing that element as a single child, not its children.
///
/// Donor content is copied verbatim -- its `Self`/`XMLContent` tokens are not
/// rewritten -- so the recipient and donor token spaces must already be
/// disjoint (callers `prefix` both packages beforehand); a shared token fails
/// with [`IdmlError::TokenCollision`] before anything is written. If the
/// grafted fragment itself carries an `XMLContent` reference, its story is
/// relocated into the recipient's last spread so it actually renders.
///
/// Also merges the donor's style groups, tags, fonts and graphics into the
/// recipient's matching resource parts, concatenating donor style-group
/// children after the recipient's own and unioning tags/fonts/graphics by
/// `Self` (recipient wins on a collision).
pub fn insert_idml(
    recipient_designmap: &mut Element,
    recipient_parts: &mut Parts,
    donor_designmap: &Element,
    donor_parts: &Parts,
    target_path: &str,
    only_path: &str,
) -> Result<(), IdmlError> {
    let donor_subtree = navigate(donor_designmap, only_path)?.clone();

    let mut seed = HashSet::new();
    collect_tokens(&donor_subtree, &mut seed);
    let reachable_stories = reachable_story_tokens(&seed, donor_parts);
    let donor_tokens = donor_token_space(&donor_subtree, donor_parts, &reachable_stories);

    let mut recipient_tokens = all_self_and_story_tokens(recipient_parts);
    collect_tokens(recipient_designmap, &mut recipient_tokens);
    check_disjoint(&recipient_tokens, &donor_tokens)?;

    let root_token = donor_subtree.attr("XMLContent").map(str::to_string);

    {
        let target = navigate_mut(recipient_designmap, target_path)?;
        if target.xml_content().is_some() || !target.children.is_empty() {
            return Err(IdmlError::IncompatibleSlot(target_path.to_string()));
        }
        target.children = if donor_subtree.tag == "Root" {
            donor_subtree.children
        } else {
            vec![Node::Element(donor_subtree)]
        };
    }
    log::debug!("insert_idml: grafted donor content at `{target_path}` verbatim");

    let new_story_tokens = insert_story_parts_verbatim(recipient_parts, donor_parts, &reachable_stories);
    if !new_story_tokens.is_empty() {
        append_story_list(recipient_designmap, &new_story_tokens);
        append_idpkg_story_entries(recipient_designmap, &new_story_tokens);
    }

    if let Some(root_token) = root_token {
        relocate_into_spread(recipient_designmap, recipient_parts, &root_token)?;
    }

    merge_xml_part(recipient_parts, donor_parts, STYLES_PATH, merge_style_groups);
    merge_xml_part(recipient_parts, donor_parts, TAGS_PATH, merge_unique_by_self);
    merge_xml_part(recipient_parts, donor_parts, FONTS_PATH, merge_unique_by_self);
    merge_xml_part(recipient_parts, donor_parts, GRAPHIC_PATH, merge_unique_by_self);

    Ok(())
}

/// Appends a verbatim copy of the donor subtree found at `only_path` as a
/// new child of the recipient node found at `at_path`, importing every story
/// part the subtree transitively references via its `XMLContent`s. Unlike
/// [`insert_idml`], this does not indirect through a synthetic wrapping
/// `XMLContent`/story part: the donor element itself (its own tag, `Self`,
/// and any `XMLContent` it carries) is cloned and appended verbatim alongside
/// whatever children `at_path`'s node already has -- the shape used when
/// lifting a whole page's structural subtree into a recipient that already
/// has pages of its own. Fails with [`IdmlError::TokenCollision`] if any
/// donor token already appears in the recipient.
pub fn append_structure_child(
    recipient_designmap: &mut Element,
    recipient_parts: &mut Parts,
    donor_designmap: &Element,
    donor_parts: &Parts,
    at_path: &str,
    only_path: &str,
) -> Result<(), IdmlError> {
    let donor_subtree = navigate(donor_designmap, only_path)?.clone();
    log::debug!("append_structure_child: grafting `{only_path}` under `{at_path}`");
    append_structure_element(recipient_designmap, recipient_parts, donor_subtree, donor_parts, at_path)
}

/// Same as [`append_structure_child`], but selects the donor subtree by its
/// position among the structure root's children (0-based) instead of by
/// XPath -- used when lifting page `nth`'s structural counterpart under the
/// convention that the Nth physical page corresponds to the Nth child of the
/// donor's structure root.
pub fn append_nth_structure_child(
    recipient_designmap: &mut Element,
    recipient_parts: &mut Parts,
    donor_designmap: &Element,
    donor_parts: &Parts,
    at_path: &str,
    nth: usize,
) -> Result<(), IdmlError> {
    let donor_root = donor_designmap
        .child("Root", 1)
        .ok_or_else(|| IdmlError::MalformedPackage("donor designmap has no Root".to_string()))?;
    let donor_subtree = donor_root
        .children_elements()
        .nth(nth)
        .cloned()
        .ok_or_else(|| {
            IdmlError::UnknownPath(format!("donor structure root has no child at position {nth}"))
        })?;
    append_structure_element(recipient_designmap, recipient_parts, donor_subtree, donor_parts, at_path)
}

fn append_structure_element(
    recipient_designmap: &mut Element,
    recipient_parts: &mut Parts,
    donor_subtree: Element,
    donor_parts: &Parts,
    at_path: &str,
) -> Result<(), IdmlError> {
    let mut seed = HashSet::new();
    collect_tokens(&donor_subtree, &mut seed);
    let reachable_stories = reachable_story_tokens(&seed, donor_parts);
    let donor_tokens = donor_token_space(&donor_subtree, donor_parts, &reachable_stories);

    let mut recipient_tokens = all_self_and_story_tokens(recipient_parts);
    collect_tokens(recipient_designmap, &mut recipient_tokens);
    check_disjoint(&recipient_tokens, &donor_tokens)?;

    let new_story_tokens = insert_story_parts_verbatim(recipient_parts, donor_parts, &reachable_stories);
    if !new_story_tokens.is_empty() {
        append_story_list(recipient_designmap, &new_story_tokens);
        append_idpkg_story_entries(recipient_designmap, &new_story_tokens);
    }

    let at = navigate_mut(recipient_designmap, at_path)?;
    at.children.push(Node::Element(donor_subtree));
    Ok(())
}

/// A single page lifted out of a donor spread: the `<Page>` element itself
/// plus every sibling element that follows it (its items), in document
/// order, up to (but excluding) the next `<Page>`.
pub struct DonorPage {
    pub page: Element,
    pub items: Vec<Element>,
}

/// Flattens every page across every spread of a donor designmap, in
/// designmap-declared spread order, pairing each with the items that follow it.
pub fn donor_pages(spreads: &[(&str, &Element)]) -> Vec<DonorPage> {
    let mut pages = Vec::new();
    for (_, spread_root) in spreads {
        let mut current: Option<Element> = None;
        let mut items = Vec::new();
        for child in spread_root.children_elements() {
            if child.tag == "Page" {
                if let Some(page) = current.take() {
                    pages.push(DonorPage {
                        page,
                        items: std::mem::take(&mut items),
                    });
                }
                current = Some(child.clone());
            } else if current.is_some() {
                items.push(child.clone());
            }
        }
        if let Some(page) = current {
            pages.push(DonorPage { page, items });
        }
    }
    pages
}

/// Appends `donor_page`'s page and items to `recipient_spread` verbatim --
/// their tokens are preserved exactly as the donor has them -- adjusting
/// only the page's facing (recto/verso) to alternate from whatever page
/// already ends the spread. Fails with [`IdmlError::TokenCollision`] if any
/// donor token already appears in the recipient.
pub fn add_page(
    recipient_designmap: &mut Element,
    recipient_parts: &mut Parts,
    recipient_spread: &mut Element,
    donor_page: &DonorPage,
    donor_parts: &Parts,
) -> Result<(), IdmlError> {
    let mut seed = HashSet::new();
    collect_tokens(&donor_page.page, &mut seed);
    for item in &donor_page.items {
        collect_tokens(item, &mut seed);
    }
    let reachable_stories = reachable_story_tokens(&seed, donor_parts);
    let mut donor_tokens = seed.clone();
    for token in &reachable_stories {
        if let Some(doc) = donor_parts.get(&story_path_for_token(token)).and_then(|e| e.data.as_xml()) {
            collect_tokens(&doc.root, &mut donor_tokens);
        }
    }

    let mut recipient_tokens = all_self_and_story_tokens(recipient_parts);
    collect_tokens(recipient_designmap, &mut recipient_tokens);
    collect_tokens(recipient_spread, &mut recipient_tokens);
    check_disjoint(&recipient_tokens, &donor_tokens)?;

    let new_story_tokens = insert_story_parts_verbatim(recipient_parts, donor_parts, &reachable_stories);
    if !new_story_tokens.is_empty() {
        append_story_list(recipient_designmap, &new_story_tokens);
        append_idpkg_story_entries(recipient_designmap, &new_story_tokens);
    }

    let mut page = donor_page.page.clone();
    let want_recto = !last_page_is_recto(recipient_spread)?;
    reface_page(&mut page, want_recto)?;

    recipient_spread.children.push(Node::Element(page));
    for item in &donor_page.items {
        recipient_spread.children.push(Node::Element(item.clone()));
    }

    Ok(())
}

/// Finds the page with `Self == page_self` among `spread`'s children and
/// returns its index, or `UnknownPath` if no such page exists.
fn find_page_index(spread: &Element, page_self: &str) -> Result<usize, IdmlError> {
    spread
        .children_elements()
        .enumerate()
        .find(|(_, e)| e.tag == "Page" && e.self_id() == Some(page_self))
        .map(|(i, _)| i)
        .ok_or_else(|| IdmlError::UnknownPath(format!("page `{page_self}` not found in spread")))
}

/// Replaces the items following page `page_self` (up to the next `<Page>` or
/// the end of the spread) with `items`, re-homing them onto that page.
pub fn set_page_items(
    spread: &mut Element,
    page_self: &str,
    items: Vec<Element>,
) -> Result<(), IdmlError> {
    let page_pos = find_page_index(spread, page_self)?;
    let mut end = page_pos + 1;
    while end < spread.children.len() {
        match &spread.children[end] {
            Node::Element(e) if e.tag == "Page" => break,
            _ => end += 1,
        }
    }
    spread
        .children
        .splice(page_pos + 1..end, items.into_iter().map(Node::Element));
    Ok(())
}

/// Flips page `page_self`'s facing to `recto` and re-offsets its
/// `GeometricBounds` so the recto/verso invariant (`x1 >= 0` for recto) holds.
pub fn set_page_face(spread: &mut Element, page_self: &str, recto: bool) -> Result<(), IdmlError> {
    let page_pos = find_page_index(spread, page_self)?;
    let page = match &mut spread.children[page_pos] {
        Node::Element(e) => e,
        Node::Text(_) => unreachable!("find_page_index only matches Page elements"),
    };
    reface_page(page, recto)
}

/// Counts `<Page>` children of `spread` -- used to enforce the two-page
/// (verso/recto) capacity of a single spread before appending another page.
pub fn spread_page_count(spread: &Element) -> usize {
    spread.children_elements().filter(|e| e.tag == "Page").count()
}

fn last_page_is_recto(spread: &Element) -> Result<bool, IdmlError> {
    let last_page = spread.children_elements().filter(|e| e.tag == "Page").last();
    match last_page {
        Some(page) => Ok(compute_coordinates(page)?.is_recto()),
        None => Ok(false),
    }
}

/// Flips a page's facing by mirroring its `GeometricBounds` x-extent across
/// zero, so `x1`/`x2` swap sign -- the simplest transform-preserving way to
/// move a page from one side of the spine to the other for an axis-aligned,
/// unrotated page (the common case for freshly authored content).
fn reface_page(page: &mut Element, want_recto: bool) -> Result<(), IdmlError> {
    let coords = compute_coordinates(page)?;
    if coords.is_recto() == want_recto {
        return Ok(());
    }
    let bounds = page
        .attr("GeometricBounds")
        .ok_or_else(|| IdmlError::MalformedPackage("Page missing GeometricBounds".to_string()))?;
    let values: Vec<&str> = bounds.split_whitespace().collect();
    if values.len() != 4 {
        return Err(IdmlError::MalformedPackage(format!(
            "invalid GeometricBounds `{bounds}`"
        )));
    }
    let y1 = values[0];
    let x1: rust_decimal::Decimal = values[1]
        .parse()
        .map_err(|_| IdmlError::MalformedPackage(bounds.to_string()))?;
    let y2 = values[2];
    let x2: rust_decimal::Decimal = values[3]
        .parse()
        .map_err(|_| IdmlError::MalformedPackage(bounds.to_string()))?;
    let new_bounds = format!("{y1} {} {y2} {}", -x2, -x1);
    page.set_attr("GeometricBounds", new_bounds);
    Ok(())
}
