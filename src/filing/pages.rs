use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node};

use super::dom::serialize_leaf;

/// Substring that identifies a page-break comment in generated filings.
pub const PAGE_SENTINEL: &str = "Field: Page;";

static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static RULE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<hr\b[^>]*>").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Comment,
    Rule,
}

impl MarkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerKind::Comment => "comment",
            MarkerKind::Rule => "headertag",
        }
    }
}

/// A page break, addressed as the `position`-th child of `container`.
#[derive(Debug, Clone, Copy)]
pub struct PageBoundaryMarker<'a> {
    pub kind: MarkerKind,
    pub container: ElementRef<'a>,
    pub position: usize,
}

/// Markup between two page breaks, serialized from the parsed tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub index: usize,
    pub kind: Option<MarkerKind>,
    pub html: String,
}

/// Finds the page breaks of a filing: sentinel comments first, `hr` elements otherwise.
pub fn locate_markers(doc: &Html) -> Vec<PageBoundaryMarker<'_>> {
    let mut markers = Vec::new();

    for node in doc.tree.root().descendants() {
        let is_sentinel = match node.value() {
            Node::Comment(comment) => comment.contains(PAGE_SENTINEL),
            _ => false,
        };
        if !is_sentinel {
            continue;
        }
        let Some(container) = node.parent().and_then(ElementRef::wrap) else {
            debug!("Skipping page comment outside of any element");
            continue;
        };
        if let Some(position) = container.children().position(|c| c.id() == node.id()) {
            markers.push(PageBoundaryMarker {
                kind: MarkerKind::Comment,
                container,
                position,
            });
        }
    }

    if !markers.is_empty() {
        info!("Found {} {} markers", markers.len(), MarkerKind::Comment.as_str());
        return markers;
    }

    for rule in doc
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name().starts_with("hr"))
    {
        let Some(container) = rule.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        if let Some(position) = container.children().position(|c| c.id() == rule.id()) {
            markers.push(PageBoundaryMarker {
                kind: MarkerKind::Rule,
                container,
                position,
            });
        }
    }

    if markers.is_empty() {
        warn!("No page comment or page-break rule found, document is unsegmentable");
    } else {
        info!("Found {} {} markers", markers.len(), MarkerKind::Rule.as_str());
    }
    markers
}

/// Content after `start` up to (excluding) `end`, or to the end of the document when `end` is `None`.
///
/// Whole sibling subtrees are emitted; when a sibling contains the end marker the walk
/// descends into it, and when a container runs out the walk climbs to its parent.
pub fn extract_page(start: &PageBoundaryMarker<'_>, end: Option<&PageBoundaryMarker<'_>>) -> String {
    let mut out = String::new();
    let Some(start_node) = start.container.children().nth(start.position) else {
        return out;
    };

    let end_node = end.and_then(|m| m.container.children().nth(m.position));
    let end_id = end_node.map(|n| n.id());
    let end_ancestors: Vec<_> = end_node
        .map(|n| n.ancestors().map(|a| a.id()).collect())
        .unwrap_or_default();

    let mut cursor = start_node;
    loop {
        let mut next = cursor.next_sibling();
        while let Some(node) = next {
            if Some(node.id()) == end_id {
                return out;
            }
            if end_ancestors.contains(&node.id()) {
                next = node.first_child();
                continue;
            }
            match ElementRef::wrap(node) {
                Some(element) => out.push_str(&element.html()),
                None => out.push_str(&serialize_leaf(node.value())),
            }
            next = node.next_sibling();
        }
        match cursor.parent() {
            Some(parent) => cursor = parent,
            None => return out,
        }
    }
}

/// Content before `marker` within its container, stopping at an earlier comment.
pub fn extract_before(marker: &PageBoundaryMarker<'_>) -> String {
    let preceding: Vec<_> = marker.container.children().take(marker.position).collect();
    let mut parts = Vec::new();
    for node in preceding.into_iter().rev() {
        if matches!(node.value(), Node::Comment(_)) {
            break;
        }
        match ElementRef::wrap(node) {
            Some(element) => parts.push(element.html()),
            None => parts.push(serialize_leaf(node.value())),
        }
    }
    parts.reverse();
    parts.concat()
}

/// The cover page: everything ahead of the first page break.
pub fn cover_page(markers: &[PageBoundaryMarker<'_>]) -> Option<Page> {
    let first = markers.first()?;
    Some(Page {
        index: 0,
        kind: Some(first.kind),
        html: extract_before(first),
    })
}

/// The intervals following each of the first `limit` markers.
///
/// Every interval ends at the next marker of the full sequence, so a capped scan still
/// sees complete pages. Without markers the whole document is one interval.
pub fn page_intervals(doc: &Html, markers: &[PageBoundaryMarker<'_>], limit: Option<usize>) -> Vec<Page> {
    if markers.is_empty() {
        return vec![Page {
            index: 0,
            kind: None,
            html: doc.root_element().html(),
        }];
    }

    let count = limit.map_or(markers.len(), |l| l.min(markers.len()));
    if count < markers.len() {
        info!("Scanning only the first {} of {} pages", count, markers.len());
    }

    (0..count)
        .map(|i| Page {
            index: i + 1,
            kind: Some(markers[i].kind),
            html: extract_page(&markers[i], markers.get(i + 1)),
        })
        .collect()
}

/// Byte-exact split of the raw document around its first page break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSplit<'a> {
    pub cover: &'a str,
    pub marker: &'a str,
    pub remainder: &'a str,
}

impl RawSplit<'_> {
    pub fn is_segmented(&self) -> bool {
        !self.marker.is_empty()
    }
}

/// Splits the raw text at the first sentinel comment (or `hr` tag when there is none).
/// An unsegmentable document has an empty cover and marker.
pub fn split_raw(raw: &str) -> RawSplit<'_> {
    let found = COMMENT_RE
        .find_iter(raw)
        .find(|m| m.as_str().contains(PAGE_SENTINEL))
        .or_else(|| RULE_RE.find(raw));

    match found {
        Some(m) => RawSplit {
            cover: &raw[..m.start()],
            marker: m.as_str(),
            remainder: &raw[m.end()..],
        },
        None => RawSplit {
            cover: "",
            marker: "",
            remainder: raw,
        },
    }
}
