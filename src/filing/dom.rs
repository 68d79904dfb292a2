use scraper::{ElementRef, Node};

/// Serializes a non-element node the way it appears in markup.
pub fn serialize_leaf(node: &Node) -> String {
    match node {
        Node::Text(text) => html_escape::encode_text(&**text).into_owned(),
        Node::Comment(comment) => format!("<!--{}-->", &**comment),
        _ => String::new(),
    }
}

pub fn is_named(element: ElementRef<'_>, name: &str) -> bool {
    element.value().name().eq_ignore_ascii_case(name)
}

/// True when any element strictly below `element` has the given tag name.
pub fn has_descendant(element: ElementRef<'_>, name: &str) -> bool {
    element
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .any(|e| is_named(e, name))
}

/// All elements strictly below `element` with the given tag name, in document order.
pub fn descendants_named<'a>(element: ElementRef<'a>, name: &str) -> Vec<ElementRef<'a>> {
    element
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .filter(|e| is_named(*e, name))
        .collect()
}

/// Elements named `name` that are not nested inside another element of the same name.
pub fn outermost_named<'a>(element: ElementRef<'a>, name: &str) -> Vec<ElementRef<'a>> {
    descendants_named(element, name)
        .into_iter()
        .filter(|e| !has_ancestor_within(*e, element, name))
        .collect()
}

/// Elements named `name` that contain no further element of the same name.
pub fn innermost_named<'a>(element: ElementRef<'a>, name: &str) -> Vec<ElementRef<'a>> {
    descendants_named(element, name)
        .into_iter()
        .filter(|e| !has_descendant(*e, name))
        .collect()
}

fn has_ancestor_within(element: ElementRef<'_>, scope: ElementRef<'_>, name: &str) -> bool {
    for ancestor in element.ancestors() {
        if ancestor.id() == scope.id() {
            return false;
        }
        if let Some(a) = ElementRef::wrap(ancestor) {
            if is_named(a, name) {
                return true;
            }
        }
    }
    false
}

/// Concatenated text of every text node below `element`.
pub fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// Text below `element` that does not sit inside a `table`.
pub fn text_outside_tables(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        if let Node::Text(text) = node.value() {
            let in_table = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| is_named(a, "table"));
            if !in_table {
                out.push_str(text);
            }
        }
    }
    out
}

/// Text below `element` that precedes its first `table`, skipping nothing else.
pub fn text_before_first_table(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        if let Some(e) = ElementRef::wrap(node) {
            if is_named(e, "table") {
                break;
            }
        }
        if let Node::Text(text) = node.value() {
            out.push_str(text);
        }
    }
    out
}

/// Collapses every whitespace run (including non-breaking spaces) into one space.
pub fn normalize_space(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_text_outside_tables_skips_cells() {
        let html = Html::parse_fragment(
            "<div><p>BALANCE SHEETS</p><table><tr><td>Cash</td></tr></table><p>Notes</p></div>",
        );
        let root = html.root_element();
        assert_eq!(text_outside_tables(root), "BALANCE SHEETSNotes");
        assert_eq!(text_before_first_table(root), "BALANCE SHEETS");
    }

    #[test]
    fn test_innermost_and_outermost() {
        let html = Html::parse_fragment(
            "<div id=\"a\"><div id=\"b\">x</div><div id=\"c\">y</div></div>",
        );
        let root = html.root_element();
        let inner: Vec<_> = innermost_named(root, "div")
            .into_iter()
            .filter_map(|e| e.value().attr("id"))
            .collect();
        assert_eq!(inner, vec!["b", "c"]);
        let outer: Vec<_> = outermost_named(root, "div")
            .into_iter()
            .filter_map(|e| e.value().attr("id"))
            .collect();
        assert_eq!(outer, vec!["a"]);
    }

    #[test]
    fn test_serialize_leaf() {
        let html = Html::parse_fragment("<div>a &amp; b<!-- Field: Page; Sequence: 1 --></div>");
        let div = descendants_named(html.root_element(), "div")[0];
        let parts: Vec<String> = div.children().map(|c| serialize_leaf(c.value())).collect();
        assert_eq!(parts, vec!["a &amp; b", "<!-- Field: Page; Sequence: 1 -->"]);
    }

    #[test]
    fn test_normalize_space() {
        assert_eq!(normalize_space("  CONDENSED\n\tBALANCE\u{a0} SHEETS "), "CONDENSED BALANCE SHEETS");
    }
}
