//! Page setup for the delegated print-to-pdf path. The core only
//! carries these values; the rendering surface does the printing.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaperSize {
    #[default]
    A4,
    UsLetter,
    Legal,
    A3,
    A5,
}

impl PaperSize {
    /// Width and height in points, portrait.
    pub fn dimensions_pt(self) -> (f64, f64) {
        match self {
            PaperSize::A4 => (595.0, 842.0),
            PaperSize::UsLetter => (612.0, 792.0),
            PaperSize::Legal => (612.0, 1008.0),
            PaperSize::A3 => (842.0, 1191.0),
            PaperSize::A5 => (420.0, 595.0),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "a4" => Some(PaperSize::A4),
            "us letter" | "letter" => Some(PaperSize::UsLetter),
            "legal" => Some(PaperSize::Legal),
            "a3" => Some(PaperSize::A3),
            "a5" => Some(PaperSize::A5),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Margins in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: 36.0,
            bottom: 36.0,
            left: 36.0,
            right: 36.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PageSetup {
    pub paper: PaperSize,
    pub orientation: Orientation,
    pub margins: Margins,
}

impl PageSetup {
    /// Printable page dimensions in points, orientation applied.
    pub fn page_dimensions_pt(&self) -> (f64, f64) {
        let (w, h) = self.paper.dimensions_pt();
        match self.orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }
}

/// What DIO hands to the rendering surface for PDF export.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintRequest {
    pub html_document: String,
    pub setup: PageSetup,
}
