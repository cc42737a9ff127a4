//! PDF Page Tree Parser
//!
//! Flattens the page tree into an ordered list of pages. Resources, MediaBox,
//! CropBox and Rotate can be inherited from ancestor `/Pages` nodes
//! (ISO 32000-1 Section 7.7.3.4).

use super::document::PdfDocument;
use super::objects::{PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};
use std::collections::HashSet;

/// US Letter, used when neither the page nor an ancestor has a MediaBox
const DEFAULT_MEDIA_BOX: Rectangle = Rectangle {
    llx: 0.0,
    lly: 0.0,
    urx: 612.0,
    ury: 792.0,
};

/// A page boundary in default user space units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

impl Rectangle {
    pub fn new(llx: f64, lly: f64, urx: f64, ury: f64) -> Self {
        Self { llx, lly, urx, ury }
    }

    /// Read `[llx lly urx ury]`, normalizing corners given in any order
    pub fn from_array(values: &[PdfObject]) -> Option<Self> {
        let [a, b, c, d] = values else {
            return None;
        };
        let (x1, y1, x2, y2) = (a.as_real()?, b.as_real()?, c.as_real()?, d.as_real()?);
        Some(Self {
            llx: x1.min(x2),
            lly: y1.min(y2),
            urx: x1.max(x2),
            ury: y1.max(y2),
        })
    }

    pub fn width(&self) -> f64 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f64 {
        self.ury - self.lly
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.llx, self.lly, self.urx, self.ury]
    }
}

/// A page with its inherited attributes resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    /// 1-based position in the document
    pub number: usize,

    /// Object reference to this page in the form (object_number, generation_number).
    pub obj_ref: (u32, u16),

    /// Page dictionary containing all page-specific entries like Contents, Resources, etc.
    pub dict: PdfDictionary,

    /// MediaBox, from the page or the nearest ancestor that has one
    pub media_box: Rectangle,

    /// Visible area; the MediaBox when no CropBox is given
    pub crop_box: Rectangle,

    /// Page rotation in degrees: 0, 90, 180 or 270, applied clockwise
    pub rotation: i32,

    /// Resources, from the page or the nearest ancestor that has them
    pub resources: Option<PdfDictionary>,
}

impl ParsedPage {
    /// Effective page width; for 90° or 270° rotations width and height are swapped.
    pub fn width(&self) -> f64 {
        match self.rotation {
            90 | 270 => self.media_box.height(),
            _ => self.media_box.width(),
        }
    }

    /// Effective page height, accounting for rotation like [`ParsedPage::width`].
    pub fn height(&self) -> f64 {
        match self.rotation {
            90 | 270 => self.media_box.width(),
            _ => self.media_box.height(),
        }
    }

    pub fn get_resources(&self) -> Option<&PdfDictionary> {
        self.resources.as_ref()
    }
}

/// Attributes a `/Pages` node passes down to its descendants
#[derive(Debug, Clone, Default)]
struct Inherited {
    resources: Option<PdfDictionary>,
    media_box: Option<Rectangle>,
    crop_box: Option<Rectangle>,
    rotate: Option<i64>,
}

/// Clamp a `/Rotate` value to one of 0, 90, 180, 270
fn normalize_rotation(rotate: i64) -> i32 {
    let quarter_turns = (rotate as f64 / 90.0).round() as i64;
    (quarter_turns.rem_euclid(4) * 90) as i32
}

/// Walks the tree below the catalog's `/Pages` entry.
pub(crate) struct PageTreeWalker<'a> {
    document: &'a PdfDocument,
    max_depth: usize,
}

impl<'a> PageTreeWalker<'a> {
    pub(crate) fn new(document: &'a PdfDocument, max_depth: usize) -> Self {
        Self {
            document,
            max_depth,
        }
    }

    /// Collect every leaf page in document order.
    ///
    /// The root must resolve to a dictionary. Below it, kids that fail to
    /// resolve, are not dictionaries, or were already visited are skipped.
    pub(crate) fn collect(&self, root: &PdfObject) -> ParseResult<Vec<ParsedPage>> {
        let root_dict = self.document.resolve_object(root)?;
        if root_dict.as_dict().is_none() {
            return Err(ParseError::SyntaxError {
                position: 0,
                message: format!("/Pages is a {}, not a dictionary", root_dict.type_name()),
            });
        }

        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        // Stack of (node, attributes inherited from its parent, depth)
        let mut stack = vec![(root.clone(), Inherited::default(), 0usize)];

        while let Some((node, inherited, depth)) = stack.pop() {
            if depth > self.max_depth {
                return Err(ParseError::RecursionLimit(self.max_depth));
            }

            let obj_ref = node.as_reference();
            if let Some(reference) = obj_ref {
                if !visited.insert(reference) {
                    tracing::warn!(obj_num = reference.0, "Page tree node visited twice, skipping");
                    continue;
                }
            }

            let dict = match self.document.resolve_object(&node) {
                Ok(PdfObject::Dictionary(dict)) => dict,
                Ok(other) => {
                    tracing::warn!(node = ?obj_ref, found = other.type_name(), "Skipping page tree kid that is not a dictionary");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(node = ?obj_ref, error = %err, "Skipping unresolvable page tree kid");
                    continue;
                }
            };

            let inherited = self.inherit(&dict, inherited);

            let is_pages_node = match dict.get_type() {
                Some("Pages") => true,
                Some("Page") => false,
                _ => dict.contains_key("Kids"),
            };

            if is_pages_node {
                let kids = match self.document.resolve_object(dict.get("Kids").unwrap_or(&PdfObject::Null)) {
                    Ok(PdfObject::Array(kids)) => kids,
                    _ => {
                        tracing::warn!(node = ?obj_ref, "Pages node without a /Kids array");
                        continue;
                    }
                };
                // Reversed so the stack pops kids in document order
                for kid in kids.0.into_iter().rev() {
                    stack.push((kid, inherited.clone(), depth + 1));
                }
            } else {
                let number = pages.len() + 1;
                pages.push(Self::leaf(number, obj_ref.unwrap_or((0, 0)), dict, inherited));
            }
        }

        tracing::debug!(pages = pages.len(), "Page tree walked");
        Ok(pages)
    }

    /// Overlay a node's own inheritable attributes on its parent's
    fn inherit(&self, dict: &PdfDictionary, mut inherited: Inherited) -> Inherited {
        if let Some(resources) = self.resolved_dict(dict, "Resources") {
            inherited.resources = Some(resources);
        }
        if let Some(media_box) = self.resolved_rect(dict, "MediaBox") {
            inherited.media_box = Some(media_box);
        }
        if let Some(crop_box) = self.resolved_rect(dict, "CropBox") {
            inherited.crop_box = Some(crop_box);
        }
        if let Some(rotate) = dict
            .get("Rotate")
            .and_then(|obj| self.document.resolve_object(obj).ok())
            .and_then(|obj| obj.as_integer())
        {
            inherited.rotate = Some(rotate);
        }
        inherited
    }

    fn resolved_dict(&self, dict: &PdfDictionary, key: &str) -> Option<PdfDictionary> {
        match self.document.resolve_object(dict.get(key)?) {
            Ok(PdfObject::Dictionary(value)) => Some(value),
            _ => None,
        }
    }

    fn resolved_rect(&self, dict: &PdfDictionary, key: &str) -> Option<Rectangle> {
        match self.document.resolve_object(dict.get(key)?) {
            Ok(PdfObject::Array(array)) => {
                let values: Vec<PdfObject> = array
                    .0
                    .iter()
                    .map(|obj| self.document.resolve_object(obj).unwrap_or(PdfObject::Null))
                    .collect();
                Rectangle::from_array(&values)
            }
            _ => None,
        }
    }

    fn leaf(
        number: usize,
        obj_ref: (u32, u16),
        dict: PdfDictionary,
        inherited: Inherited,
    ) -> ParsedPage {
        let media_box = inherited.media_box.unwrap_or_else(|| {
            tracing::warn!(page = number, "Page has no MediaBox, assuming US Letter");
            DEFAULT_MEDIA_BOX
        });

        ParsedPage {
            number,
            obj_ref,
            dict,
            media_box,
            crop_box: inherited.crop_box.unwrap_or(media_box),
            rotation: normalize_rotation(inherited.rotate.unwrap_or(0)),
            resources: inherited.resources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(media_box: Rectangle, rotation: i32) -> ParsedPage {
        ParsedPage {
            number: 1,
            obj_ref: (3, 0),
            dict: PdfDictionary::new(),
            media_box,
            crop_box: media_box,
            rotation,
            resources: None,
        }
    }

    #[test]
    fn test_rectangle_from_array() {
        let rect = Rectangle::from_array(&[
            PdfObject::Integer(0),
            PdfObject::Integer(0),
            PdfObject::Real(612.0),
            PdfObject::Integer(792),
        ])
        .unwrap();
        assert_eq!(rect, Rectangle::new(0.0, 0.0, 612.0, 792.0));
        assert_eq!(rect.width(), 612.0);
        assert_eq!(rect.height(), 792.0);
    }

    #[test]
    fn test_rectangle_normalizes_corners() {
        let rect = Rectangle::from_array(&[
            PdfObject::Integer(100),
            PdfObject::Integer(200),
            PdfObject::Integer(0),
            PdfObject::Integer(0),
        ])
        .unwrap();
        assert_eq!(rect.as_array(), [0.0, 0.0, 100.0, 200.0]);
    }

    #[test]
    fn test_rectangle_rejects_bad_arrays() {
        assert!(Rectangle::from_array(&vec![PdfObject::Integer(0); 3]).is_none());
        assert!(Rectangle::from_array(&[
            PdfObject::Integer(0),
            PdfObject::Null,
            PdfObject::Integer(1),
            PdfObject::Integer(1),
        ])
        .is_none());
    }

    #[test]
    fn test_page_dimensions_follow_rotation() {
        let media_box = Rectangle::new(0.0, 0.0, 612.0, 792.0);

        let portrait = page(media_box, 0);
        assert_eq!((portrait.width(), portrait.height()), (612.0, 792.0));

        let landscape = page(media_box, 90);
        assert_eq!((landscape.width(), landscape.height()), (792.0, 612.0));

        let upside_down = page(media_box, 180);
        assert_eq!(upside_down.width(), 612.0);
    }

    #[test]
    fn test_normalize_rotation() {
        assert_eq!(normalize_rotation(0), 0);
        assert_eq!(normalize_rotation(90), 90);
        assert_eq!(normalize_rotation(-90), 270);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(360), 0);
        assert_eq!(normalize_rotation(100), 90);
    }
}
