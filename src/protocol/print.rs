//! `Page.printToPDF` parameters.
//!
//! [`PrintParams`] is an open set of protocol-level print options. Known
//! options are typed; anything else can be passed through
//! [`PrintParams::with_option`].
//!
//! # Example
//!
//! ```ignore
//! use headless_pdf::{Margins, PrintParams};
//!
//! let params = PrintParams::default()
//!     .with_landscape(true)
//!     .with_page_ranges("1-3,5")
//!     .with_margins(Margins::uniform(0.4));
//! ```

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

// ============================================================================
// Margins
// ============================================================================

/// Page margins in inches. Unset sides use the browser default.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Margins {
    /// Top margin.
    pub top: Option<f64>,
    /// Right margin.
    pub right: Option<f64>,
    /// Bottom margin.
    pub bottom: Option<f64>,
    /// Left margin.
    pub left: Option<f64>,
}

impl Margins {
    /// Same margin on every side.
    #[inline]
    #[must_use]
    pub const fn uniform(inches: f64) -> Self {
        Self {
            top: Some(inches),
            right: Some(inches),
            bottom: Some(inches),
            left: Some(inches),
        }
    }
}

// ============================================================================
// PrintParams
// ============================================================================

/// Options forwarded to `Page.printToPDF`.
///
/// Defaults print backgrounds, show the header/footer area and prefer the
/// CSS `@page` size. Unset optional fields are omitted from the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintParams {
    /// Scale of the rendering (browser accepts 0.1 to 2).
    pub scale: f64,

    /// Print background graphics.
    pub print_background: bool,

    /// Display header and footer.
    pub display_header_footer: bool,

    /// Prefer page size as defined by CSS.
    #[serde(rename = "preferCSSPageSize")]
    pub prefer_css_page_size: bool,

    /// Generate a tagged (accessible) PDF.
    #[serde(rename = "generateTaggedPDF")]
    pub generate_tagged_pdf: bool,

    /// Paper orientation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landscape: Option<bool>,

    /// Paper width in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_width: Option<f64>,

    /// Paper height in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_height: Option<f64>,

    /// Top margin in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_top: Option<f64>,

    /// Bottom margin in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_bottom: Option<f64>,

    /// Left margin in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_left: Option<f64>,

    /// Right margin in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_right: Option<f64>,

    /// Pages to print, e.g. `"1-3,5,7-9"`. Empty means all pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_ranges: Option<String>,

    /// HTML template for the print header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_template: Option<String>,

    /// HTML template for the print footer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer_template: Option<String>,

    /// Additional raw options.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for PrintParams {
    fn default() -> Self {
        Self {
            scale: 1.0,
            print_background: true,
            display_header_footer: true,
            prefer_css_page_size: true,
            generate_tagged_pdf: false,
            landscape: None,
            paper_width: None,
            paper_height: None,
            margin_top: None,
            margin_bottom: None,
            margin_left: None,
            margin_right: None,
            page_ranges: None,
            header_template: None,
            footer_template: None,
            extra: Map::new(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl PrintParams {
    /// Sets the scale factor.
    #[inline]
    #[must_use]
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Sets whether backgrounds are printed.
    #[inline]
    #[must_use]
    pub fn with_print_background(mut self, enabled: bool) -> Self {
        self.print_background = enabled;
        self
    }

    /// Sets whether the header/footer area is shown.
    #[inline]
    #[must_use]
    pub fn with_display_header_footer(mut self, enabled: bool) -> Self {
        self.display_header_footer = enabled;
        self
    }

    /// Sets whether the CSS page size wins over the paper size.
    #[inline]
    #[must_use]
    pub fn with_prefer_css_page_size(mut self, enabled: bool) -> Self {
        self.prefer_css_page_size = enabled;
        self
    }

    /// Sets whether a tagged PDF is generated.
    #[inline]
    #[must_use]
    pub fn with_tagged_pdf(mut self, enabled: bool) -> Self {
        self.generate_tagged_pdf = enabled;
        self
    }

    /// Sets paper orientation.
    #[inline]
    #[must_use]
    pub fn with_landscape(mut self, landscape: bool) -> Self {
        self.landscape = Some(landscape);
        self
    }

    /// Sets paper size in inches.
    #[inline]
    #[must_use]
    pub fn with_paper_size(mut self, width: f64, height: f64) -> Self {
        self.paper_width = Some(width);
        self.paper_height = Some(height);
        self
    }

    /// Sets the set margins. Sides left as `None` keep their current value.
    #[must_use]
    pub fn with_margins(mut self, margins: Margins) -> Self {
        self.margin_top = margins.top.or(self.margin_top);
        self.margin_right = margins.right.or(self.margin_right);
        self.margin_bottom = margins.bottom.or(self.margin_bottom);
        self.margin_left = margins.left.or(self.margin_left);
        self
    }

    /// Sets the page ranges. An empty string prints all pages.
    #[inline]
    #[must_use]
    pub fn with_page_ranges(mut self, ranges: impl Into<String>) -> Self {
        self.page_ranges = Some(ranges.into());
        self
    }

    /// Sets the header template HTML.
    #[inline]
    #[must_use]
    pub fn with_header_template(mut self, html: impl Into<String>) -> Self {
        self.header_template = Some(html.into());
        self
    }

    /// Sets the footer template HTML.
    #[inline]
    #[must_use]
    pub fn with_footer_template(mut self, html: impl Into<String>) -> Self {
        self.footer_template = Some(html.into());
        self
    }

    /// Adds a raw option that has no typed field.
    #[inline]
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Converts to the `params` object of a `Page.printToPDF` call.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if a value cannot be serialized.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

// ============================================================================
// Data URL
// ============================================================================

/// Builds the `data:` URL used to load a document without a server.
#[must_use]
pub fn data_url_for_html(html: &str) -> String {
    format!("data:text/html;base64,{}", Base64Standard.encode(html))
}

// ============================================================================
// Tests
// ============================================================================
