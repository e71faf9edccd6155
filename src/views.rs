//! Owned snapshot views over spreads, stories and pages.
//!
//! A live, mutable reference bound back to the open package (a `Page` object
//! whose `.face` setter mutates the package in place) is awkward to express
//! safely against Rust's borrow checker if a caller can also hold the owning
//! package open, so these views are owned clones instead: read freely, and
//! make changes through the explicit mutator methods on
//! [`crate::package::IdmlPackage`].

use rust_decimal::Decimal;

use crate::error::IdmlError;
use crate::xmldoc::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Recto,
    Verso,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub x1: Decimal,
    pub y1: Decimal,
    pub x2: Decimal,
    pub y2: Decimal,
}

impl Coordinates {
    pub fn is_recto(&self) -> bool {
        self.x1 >= Decimal::ZERO
    }

    pub fn face(&self) -> Face {
        if self.is_recto() {
            Face::Recto
        } else {
            Face::Verso
        }
    }
}

/// Parses `GeometricBounds="y1 x1 y2 x2"` and an optional
/// `ItemTransform="a b c d tx ty"` (defaulting to the identity transform) and
/// returns the transformed, axis-normalized bounding box.
pub fn compute_coordinates(element: &Element) -> Result<Coordinates, IdmlError> {
    let bounds = element
        .attr("GeometricBounds")
        .ok_or_else(|| IdmlError::MalformedPackage("missing GeometricBounds".to_string()))?;
    let b: Vec<Decimal> = parse_decimals(bounds, 4)?;
    let (y1, x1, y2, x2) = (b[0], b[1], b[2], b[3]);

    let (a, bb, c, d, tx, ty) = match element.attr("ItemTransform") {
        Some(t) => {
            let v: Vec<Decimal> = parse_decimals(t, 6)?;
            (v[0], v[1], v[2], v[3], v[4], v[5])
        }
        None => (
            Decimal::ONE,
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ONE,
            Decimal::ZERO,
            Decimal::ZERO,
        ),
    };

    let transform = |x: Decimal, y: Decimal| (a * x + c * y + tx, bb * x + d * y + ty);
    let (tx1, ty1) = transform(x1, y1);
    let (tx2, ty2) = transform(x2, y2);

    Ok(Coordinates {
        x1: tx1.min(tx2),
        y1: ty1.min(ty2),
        x2: tx1.max(tx2),
        y2: ty1.max(ty2),
    })
}

fn parse_decimals(s: &str, expected: usize) -> Result<Vec<Decimal>, IdmlError> {
    let values: Result<Vec<Decimal>, _> = s.split_whitespace().map(|v| v.parse()).collect();
    let values = values.map_err(|_| IdmlError::MalformedPackage(format!("invalid decimal list `{s}`")))?;
    if values.len() != expected {
        return Err(IdmlError::MalformedPackage(format!(
            "expected {expected} values, got {} in `{s}`",
            values.len()
        )));
    }
    Ok(values)
}

#[derive(Debug, Clone)]
pub struct PageView {
    pub self_id: String,
    pub coordinates: Coordinates,
    pub page_items: Vec<Element>,
}

impl PageView {
    pub fn is_recto(&self) -> bool {
        self.coordinates.is_recto()
    }

    pub fn face(&self) -> Face {
        self.coordinates.face()
    }
}

#[derive(Debug, Clone)]
pub struct SpreadView {
    pub path: String,
    pub root: Element,
}

impl SpreadView {
    /// `Page` children of the spread, paired with the items (any sibling
    /// element that isn't itself a `Page`) that fall after them and before
    /// the next page -- the simplest faithful reading of "belongs to this
    /// page" for a flat spread child list.
    pub fn pages(&self) -> Result<Vec<PageView>, IdmlError> {
        let mut pages = Vec::new();
        let mut pending_items: Vec<Element> = Vec::new();
        let mut current: Option<(String, Coordinates)> = None;

        for child in self.root.children_elements() {
            if child.tag == "Page" {
                if let Some((self_id, coordinates)) = current.take() {
                    pages.push(PageView {
                        self_id,
                        coordinates,
                        page_items: std::mem::take(&mut pending_items),
                    });
                }
                let self_id = child
                    .self_id()
                    .ok_or_else(|| IdmlError::MalformedPackage("Page without Self".to_string()))?
                    .to_string();
                current = Some((self_id, compute_coordinates(child)?));
            } else if current.is_some() {
                pending_items.push(child.clone());
            }
        }
        if let Some((self_id, coordinates)) = current {
            pages.push(PageView {
                self_id,
                coordinates,
                page_items: pending_items,
            });
        }
        Ok(pages)
    }
}

#[derive(Debug, Clone)]
pub struct StoryView {
    pub path: String,
    pub root: Element,
}

impl StoryView {
    pub fn get_element_by_id(&self, id: &str) -> Option<&Element> {
        self.root.find_by_self(id)
    }

    pub fn get_element_content_by_id(&self, id: &str) -> Option<String> {
        self.get_element_by_id(id).map(|e| e.text_content())
    }
}
