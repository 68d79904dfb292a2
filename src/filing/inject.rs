use log::{debug, info};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::ops::Range;

use crate::core::types::{dedup_assignments, TagAssignment};

/// Attribute carried by every inserted wrapper.
pub const AUTOTAG_ATTR: &str = "data-autotag";

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"__placeholder_\d+__").unwrap());

/// Randomness behind wrapper ids and placeholder tokens.
pub trait IdSource: Send {
    /// Shared suffix for every wrapper of one annotation run.
    fn run_id(&mut self) -> String;
    fn letter(&mut self) -> char;
    fn placeholder_digits(&mut self) -> String;
}

#[derive(Debug, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn run_id(&mut self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    fn letter(&mut self) -> char {
        const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
        LETTERS[rand::thread_rng().gen_range(0..LETTERS.len())] as char
    }

    fn placeholder_digits(&mut self) -> String {
        rand::thread_rng().gen_range(1_000_000..100_000_000u32).to_string()
    }
}

/// Deterministic ids for reproducible output.
#[derive(Debug)]
pub struct SequentialIds {
    run: String,
    letters: u64,
    placeholders: u64,
}

impl SequentialIds {
    pub fn new(run: impl Into<String>) -> Self {
        Self {
            run: run.into(),
            letters: 0,
            placeholders: 0,
        }
    }
}

impl IdSource for SequentialIds {
    fn run_id(&mut self) -> String {
        self.run.clone()
    }

    fn letter(&mut self) -> char {
        let letter = (b'a' + (self.letters % 26) as u8) as char;
        self.letters += 1;
        letter
    }

    fn placeholder_digits(&mut self) -> String {
        self.placeholders += 1;
        self.placeholders.to_string()
    }
}

/// Outcome of injecting one set of assignments into one fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Injection {
    pub html: String,
    pub applied: usize,
    pub missed: Vec<String>,
}

/// Wraps literal occurrences of predicted texts in labelled `<font>` elements.
pub struct TagInjector<'a> {
    ids: &'a mut dyn IdSource,
    run_id: String,
}

impl<'a> TagInjector<'a> {
    pub fn new(ids: &'a mut dyn IdSource) -> Self {
        let run_id = ids.run_id();
        Self { ids, run_id }
    }

    pub fn wrap(&mut self, text: &str, label: &str) -> String {
        format!(
            "<font {}=\"true\" id=xdx_90{}_e{}_{}>{}</font>",
            AUTOTAG_ATTR,
            self.ids.letter(),
            label,
            self.run_id,
            text
        )
    }

    fn fresh_placeholder(&mut self, buffer: &str, pending: &[(String, String)]) -> String {
        loop {
            let candidate = format!("__placeholder_{}__", self.ids.placeholder_digits());
            if !buffer.contains(&candidate) && !pending.iter().any(|(p, _)| *p == candidate) {
                return candidate;
            }
        }
    }

    /// Applies `assignments` to `html`, labels prefixed with `namespace`.
    ///
    /// Text making up a whole segment between two tags is wrapped directly. Anything else
    /// is replaced inside longer text segments through a placeholder that is resolved once
    /// every assignment has been tried. Content of existing wrappers is never touched.
    pub fn inject(&mut self, html: &str, assignments: &[TagAssignment], namespace: &str) -> Injection {
        let mut buffer = html.replace("\r\n", " ").replace('\n', " ");
        let mut pending: Vec<(String, String)> = Vec::new();
        let mut applied = 0;
        let mut missed = Vec::new();

        for assignment in dedup_assignments(assignments.to_vec()) {
            let label = format!("{}{}", namespace, assignment.tag_label);
            let escaped = html_escape::encode_text(&assignment.matched_text).into_owned();
            let mut needles = vec![assignment.matched_text.clone()];
            if escaped != assignment.matched_text {
                needles.push(escaped);
            }
            if !needles.iter().any(|n| buffer.contains(n.as_str())) {
                if let Some(found) = entity_variant(&assignment.matched_text).and_then(|p| find_in_text(&buffer, &p)) {
                    debug!("Matched '{}' as '{}'", assignment.matched_text, found);
                    needles.push(found);
                }
            }

            let mut placed = false;
            for needle in &needles {
                if !buffer.contains(&format!(">{}<", needle)) {
                    continue;
                }
                let markup = self.wrap(needle, &label);
                let (next, count) = replace_in_text(&buffer, needle, &markup, Scope::WholeSegment);
                if count > 0 {
                    buffer = next;
                    placed = true;
                    break;
                }
            }
            if placed {
                applied += 1;
                continue;
            }

            for needle in &needles {
                let placeholder = self.fresh_placeholder(&buffer, &pending);
                let (next, count) = replace_in_text(&buffer, needle, &placeholder, Scope::Anywhere);
                if count > 0 {
                    buffer = next;
                    let markup = self.wrap(needle, &label);
                    pending.push((placeholder, markup));
                    placed = true;
                    break;
                }
            }

            if placed {
                applied += 1;
            } else {
                debug!("No occurrence of '{}' ({})", assignment.matched_text, label);
                missed.push(assignment.matched_text);
            }
        }

        for (placeholder, markup) in &pending {
            buffer = buffer.replace(placeholder, markup);
        }

        info!("Injected {} tags, {} without a match", applied, missed.len());
        Injection {
            html: buffer,
            applied,
            missed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// The text between two tags must equal the needle.
    WholeSegment,
    Anywhere,
}

/// Elements whose content is raw text, never markup.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Splits `html` into consecutive byte ranges, flagging the text segments that may be
/// rewritten. Tags, comments, raw text elements and the content of existing wrappers
/// are not editable.
fn segments(html: &str) -> Vec<(Range<usize>, bool)> {
    let mut pieces = Vec::new();
    let mut pos = 0;
    let mut wrapped = false;

    while pos < html.len() {
        let rest = &html[pos..];
        let (len, editable) = if rest.starts_with("<!--") {
            (rest.find("-->").map_or(rest.len(), |i| i + 3), false)
        } else if rest.starts_with('<') {
            let tag_end = rest.find('>').map_or(rest.len(), |i| i + 1);
            let tag = &rest[..tag_end];
            wrapped = tag.contains(AUTOTAG_ATTR);
            match raw_text_element(tag) {
                Some(name) => (closing_tag_end(rest, tag_end, name), false),
                None => (tag_end, false),
            }
        } else {
            (rest.find('<').unwrap_or(rest.len()), !wrapped)
        };
        pieces.push((pos..pos + len, editable));
        pos += len;
    }
    pieces
}

fn raw_text_element(tag: &str) -> Option<&'static str> {
    let name = tag[1..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    RAW_TEXT_ELEMENTS.iter().copied().find(|raw| *raw == name)
}

/// End of the close tag of `name`, searched from `from`; the rest of the input when unclosed.
fn closing_tag_end(rest: &str, from: usize, name: &str) -> usize {
    let lower = rest[from..].to_ascii_lowercase();
    match lower.find(&format!("</{}", name)) {
        Some(i) => {
            let close = from + i;
            rest[close..].find('>').map_or(rest.len(), |j| close + j + 1)
        }
        None => rest.len(),
    }
}

/// Pattern for `text` as it may be written in the source: spaces as any whitespace or
/// no-break space entity, apostrophes curly or as entities, `&` possibly escaped.
fn entity_variant(text: &str) -> Option<Regex> {
    if !text.contains(|c: char| c == ' ' || c == '\'' || c == '\u{2019}') {
        return None;
    }
    let mut pattern = String::new();
    let mut in_space = false;
    for c in text.chars() {
        if c == ' ' {
            if !in_space {
                pattern.push_str(r"(?:\s|&nbsp;|&#160;|&#[xX][aA]0;)+");
            }
            in_space = true;
            continue;
        }
        in_space = false;
        match c {
            '\'' | '\u{2019}' => pattern.push_str("(?:'|\u{2019}|&#8217;|&rsquo;|&#39;|&apos;)"),
            '&' => pattern.push_str("&(?:amp;)?"),
            '<' => pattern.push_str("&lt;"),
            '>' => pattern.push_str("(?:>|&gt;)"),
            other => pattern.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    Regex::new(&pattern).ok()
}

/// The first text of an editable segment matching `pattern`, as written in `html`.
fn find_in_text(html: &str, pattern: &Regex) -> Option<String> {
    segments(html)
        .into_iter()
        .filter(|(_, editable)| *editable)
        .find_map(|(range, _)| pattern.find(&html[range]).map(|m| m.as_str().to_string()))
}

/// Replaces `needle` in the editable text segments of `html`, skipping earlier placeholders.
fn replace_in_text(html: &str, needle: &str, replacement: &str, scope: Scope) -> (String, usize) {
    let mut out = String::with_capacity(html.len());
    let mut count = 0;

    for (range, editable) in segments(html) {
        let text = &html[range];
        if !editable {
            out.push_str(text);
        } else if scope == Scope::WholeSegment {
            if text == needle {
                out.push_str(replacement);
                count += 1;
            } else {
                out.push_str(text);
            }
        } else {
            count += replace_outside_placeholders(text, needle, replacement, &mut out);
        }
    }

    (out, count)
}

fn replace_outside_placeholders(text: &str, needle: &str, replacement: &str, out: &mut String) -> usize {
    let mut count = 0;
    let mut last = 0;
    for m in PLACEHOLDER_RE.find_iter(text) {
        count += replace_piece(&text[last..m.start()], needle, replacement, out);
        out.push_str(m.as_str());
        last = m.end();
    }
    count + replace_piece(&text[last..], needle, replacement, out)
}

fn replace_piece(piece: &str, needle: &str, replacement: &str, out: &mut String) -> usize {
    let hits = piece.matches(needle).count();
    if hits > 0 {
        out.push_str(&piece.replace(needle, replacement));
    } else {
        out.push_str(piece);
    }
    hits
}
