//! In-memory model and composition engine for Adobe InDesign IDML packages.
//!
//! An IDML package is a ZIP archive of interlinked XML parts: a designmap
//! that declares its spreads and stories and embeds the document's XML
//! structure, spread/story/resource parts referenced by that designmap, and
//! a handful of fixed administrative entries. This crate opens one into an
//! in-memory [`package::IdmlPackage`], lets callers inspect it (spreads,
//! stories, tags, style groups, font families, the inlined structure tree),
//! bulk-rewrite its identifiers ([`package::IdmlPackage::prefix`]), and
//! splice content between packages ([`package::IdmlPackage::insert_idml`],
//! [`package::IdmlPackage::add_page_from_idml`],
//! [`package::IdmlPackage::add_pages_from_idml`]).
//!
//! ZIP I/O, XML parsing/serialization, and part classification are internal
//! plumbing (`archive`, `xmldoc`, `registry`); the rest of the crate builds
//! on top of an already-parsed part map.

pub mod archive;
pub mod error;
pub mod package;
pub mod prefixer;
pub mod registry;
pub mod splicer;
pub mod structure;
pub mod token;
pub mod views;
pub mod xmldoc;

pub use error::{IdmlError, Result};
pub use package::{IdmlPackage, PackageOptions};
pub use views::{Coordinates, Face, PageView, SpreadView, StoryView};
pub use xmldoc::{Element, Node, XmlDoc};
