//! Page and layout context derived from the page URL and descriptor flags.

use url::Url;

/// Page type, derived only from the URL path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageContext {
    Trade,
    Catalog,
    Disassembly,
    Lootbox,
    Generic,
}

impl PageContext {
    /// Classify a page URL.
    pub fn from_url(url: &Url) -> Self {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|segment| !segment.is_empty()).collect())
            .unwrap_or_default();
        match segments.as_slice() {
            ["trades", "create", ..] | ["trades", "offers", ..] => Self::Trade,
            ["trades", id, ..] if !id.is_empty() && id.bytes().all(|byte| byte.is_ascii_digit()) => {
                Self::Trade
            }
            ["cards", ..] => Self::Catalog,
            ["melt" | "disassembly", ..] => Self::Disassembly,
            ["packs" | "lootbox", ..] => Self::Lootbox,
            _ => Self::Generic,
        }
    }

    /// Unlimited contexts ignore the overlay cap.
    pub const fn is_unlimited(self) -> bool {
        matches!(self, Self::Trade | Self::Disassembly)
    }

    /// Bulk update containers are only honored on actual trade pages.
    pub const fn honors_bulk_containers(self) -> bool {
        matches!(self, Self::Trade)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Catalog => "catalog",
            Self::Disassembly => "disassembly",
            Self::Lootbox => "lootbox",
            Self::Generic => "generic",
        }
    }
}

/// Rendering context of a card, used for layout band selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutContext {
    Lootbox,
    Carousel,
    Standard,
}

impl LayoutContext {
    pub const fn resolve(page: PageContext, carousel: bool) -> Self {
        if matches!(page, PageContext::Lootbox) {
            Self::Lootbox
        } else if carousel {
            Self::Carousel
        } else {
            Self::Standard
        }
    }
}
