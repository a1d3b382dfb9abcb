//! Nuclino export parser.
//!
//! An export is a flat list of `(filename, content)` entries. Filenames
//! carry the page title plus an 8-hex-char page ID
//! (`My Page a1b2c3d4.md`); contents are markdown with HTML entities,
//! angle-bracket-wrapped cross-page links, and ASCII tree-drawing noise
//! from Nuclino's index pages.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use lore_core::defaults;

/// One raw entry of a wiki export.
#[derive(Debug, Clone)]
pub struct ExportEntry {
    pub filename: String,
    pub content: String,
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

/// A cross-page link found in page content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub text: String,
    pub target_filename: String,
    pub target_page_id: String,
    pub full_match: String,
}

/// One parsed page from the export, pre-classification. Ephemeral: consumed
/// by classification and discarded after note creation.
#[derive(Debug, Clone)]
pub struct Page {
    /// 8-hex-char identifier from the filename, or a deterministic pseudo-ID
    /// for non-conforming filenames.
    pub source_page_id: String,
    pub title: String,
    /// Cleaned content: entities decoded, tree art stripped.
    pub content: String,
    /// Content exactly as exported.
    pub content_raw: String,
    pub links: Vec<PageLink>,
    pub is_empty: bool,
}

/// Title and page ID extracted from an export filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilename {
    pub title: String,
    pub source_page_id: String,
}

/// Kind of a collection page, detected from its title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    NotablePeople,
    Places,
    Todo,
    Done,
    Other,
}

/// A detected collection page and the pages it links to.
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub source_page_id: String,
    pub title: String,
    pub linked_page_ids: Vec<String>,
    pub collection_type: CollectionType,
}

static FILENAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*) ([0-9a-f]{8})\.md$").unwrap());

static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:#x([0-9a-fA-F]+)|#([0-9]+)|(amp|lt|gt|quot|apos|nbsp));").unwrap()
});

/// Cross-page link markup: `[text](<target.md?n>)`. The angle brackets
/// permit spaces in the target filename; the trailing `?n` is export noise.
pub(crate) static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]\(<([^>]*\.md)(?:\?n)?>\)").unwrap());

/// Session-log title patterns: explicit session/scene/journey words, dates,
/// or first-person-plural narrative titles ("We find the body").
static SESSION_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(session|scene|journey)\b|^we\b|\d{4}-\d{2}-\d{2}|\b\d{1,2}[./]\d{1,2}[./]\d{2,4}\b")
        .unwrap()
});

/// Line-leading box-drawing characters from Nuclino's exported tree index.
const TREE_CHARS: &[char] = &['│', '├', '└', '─', '┬', '┴', '┼', '┤'];

/// Parse an export filename into title and page ID.
///
/// Conforming names look like `<title> <8 hex chars>.md`. Non-conforming
/// names never fail: the page ID falls back to a deterministic pseudo-ID
/// hashed from the filename.
pub fn parse_filename(filename: &str) -> ParsedFilename {
    if let Some(caps) = FILENAME_RE.captures(filename) {
        return ParsedFilename {
            title: clean_title(&caps[1]),
            source_page_id: caps[2].to_string(),
        };
    }

    let title = filename.strip_suffix(".md").unwrap_or(filename);
    ParsedFilename {
        title: clean_title(title),
        source_page_id: pseudo_page_id(filename),
    }
}

/// Title cleanup: `" _ "` separates multi-part session titles and becomes
/// `" / "`; a bare `"_"` is an escaped slash.
fn clean_title(raw: &str) -> String {
    raw.replace(" _ ", " / ").replace('_', "/").trim().to_string()
}

/// Deterministic 8-hex-char pseudo-ID for non-conforming filenames.
fn pseudo_page_id(filename: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hex::encode(hasher.finalize())[..8].to_string()
}

/// Decode hex (`&#xNN;`), decimal (`&#NN;`), and the six named HTML
/// entities. Unknown or invalid references are left untouched.
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            if let Some(hex_digits) = caps.get(1) {
                u32::from_str_radix(hex_digits.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_else(|| caps[0].to_string())
            } else if let Some(dec_digits) = caps.get(2) {
                dec_digits
                    .as_str()
                    .parse::<u32>()
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_else(|| caps[0].to_string())
            } else {
                match &caps[3] {
                    "amp" => "&",
                    "lt" => "<",
                    "gt" => ">",
                    "quot" => "\"",
                    "apos" => "'",
                    "nbsp" => "\u{00a0}",
                    _ => unreachable!("entity alternation is exhaustive"),
                }
                .to_string()
            }
        })
        .into_owned()
}

/// Extract all cross-page links from page content.
pub fn extract_links(content: &str) -> Vec<PageLink> {
    LINK_RE
        .captures_iter(content)
        .map(|caps| {
            let target_filename = caps[2].to_string();
            let target_page_id = parse_filename(&target_filename).source_page_id;
            PageLink {
                text: caps[1].to_string(),
                target_filename,
                target_page_id,
                full_match: caps[0].to_string(),
            }
        })
        .collect()
}

/// Remove tree-drawing index lines, collapse blank-line runs to at most one
/// blank line, and trim.
pub fn strip_tree_art(content: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut blank_run = 0usize;

    for line in content.lines() {
        let first = line.trim_start().chars().next();
        if first.is_some_and(|c| TREE_CHARS.contains(&c)) {
            continue;
        }
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push("");
        } else {
            blank_run = 0;
            out.push(line);
        }
    }

    out.join("\n").trim().to_string()
}

/// A page is a collection page only if it has at least
/// [`defaults::MIN_COLLECTION_LINKS`] links AND the text left after
/// stripping link spans, headers, bullets, and whitespace is shorter than
/// [`defaults::COLLECTION_TEXT_RATIO`] times the average link-text length,
/// meaning the page is mostly a list.
pub fn is_collection_page(content: &str, links: &[PageLink]) -> bool {
    if links.len() < defaults::MIN_COLLECTION_LINKS {
        return false;
    }

    let mut residual = content.to_string();
    for link in links {
        residual = residual.replace(&link.full_match, "");
    }

    let residual_len: usize = residual
        .lines()
        .map(|line| {
            let line = line.trim_start();
            let line = line.trim_start_matches('#');
            let line = line.trim_start_matches(['-', '*', '+']);
            line.chars().filter(|c| !c.is_whitespace()).count()
        })
        .sum();

    let avg_link_text = links.iter().map(|l| l.text.chars().count()).sum::<usize>() as f32
        / links.len() as f32;

    (residual_len as f32) < defaults::COLLECTION_TEXT_RATIO * avg_link_text
}

/// Detect the collection family from a collection page's title.
pub fn detect_collection_type(title: &str) -> CollectionType {
    let title = title.to_lowercase();
    if title.contains("people") || title.contains("npc") || title.contains("character") {
        CollectionType::NotablePeople
    } else if title.contains("place") || title.contains("location") {
        CollectionType::Places
    } else if title.contains("todo") || title.contains("to-do") || title.contains("open quest") {
        CollectionType::Todo
    } else if title.contains("done") || title.contains("completed") || title.contains("finished") {
        CollectionType::Done
    } else {
        CollectionType::Other
    }
}

/// Whether a title looks like a session log. A title containing "setting"
/// is never a session log, regardless of other matches ("Scene Setting").
pub fn is_session_log_title(title: &str) -> bool {
    if title.to_lowercase().contains("setting") {
        return false;
    }
    SESSION_TITLE_RE.is_match(title)
}

/// Parse a full export into pages. Only `.md` entries are processed; other
/// filenames are silently ignored.
pub fn parse_export(entries: &[ExportEntry]) -> Vec<Page> {
    let mut pages = Vec::new();

    for entry in entries {
        if !entry.filename.ends_with(".md") {
            tracing::trace!(filename = %entry.filename, "Skipping non-markdown export entry");
            continue;
        }

        let parsed = parse_filename(&entry.filename);
        let decoded = decode_entities(&entry.content);
        let links = extract_links(&decoded);
        let content = strip_tree_art(&decoded);
        let is_empty = content.trim().is_empty();

        pages.push(Page {
            source_page_id: parsed.source_page_id,
            title: parsed.title,
            content,
            content_raw: entry.content.clone(),
            links,
            is_empty,
        });
    }

    tracing::debug!(page_count = pages.len(), "Parsed export entries");
    pages
}

/// Detect collection pages and build the page-to-collections membership map.
/// A page may belong to multiple collections.
pub fn detect_collections(
    pages: &[Page],
) -> (Vec<CollectionInfo>, HashMap<String, Vec<CollectionType>>) {
    let mut collections = Vec::new();
    let mut memberships: HashMap<String, Vec<CollectionType>> = HashMap::new();

    for page in pages {
        if !is_collection_page(&page.content, &page.links) {
            continue;
        }
        let collection_type = detect_collection_type(&page.title);
        let linked_page_ids: Vec<String> = page
            .links
            .iter()
            .map(|l| l.target_page_id.clone())
            .collect();

        for member in &linked_page_ids {
            memberships
                .entry(member.clone())
                .or_default()
                .push(collection_type);
        }

        collections.push(CollectionInfo {
            source_page_id: page.source_page_id.clone(),
            title: page.title.clone(),
            linked_page_ids,
            collection_type,
        });
    }

    (collections, memberships)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filename_conforming() {
        let parsed = parse_filename("Thistle Hollow a1b2c3d4.md");
        assert_eq!(parsed.title, "Thistle Hollow");
        assert_eq!(parsed.source_page_id, "a1b2c3d4");
    }

    #[test]
    fn test_parse_filename_multipart_session_title() {
        let parsed = parse_filename("Session 3 _ The Long Road deadbeef.md");
        assert_eq!(parsed.title, "Session 3 / The Long Road");
    }

    #[test]
    fn test_parse_filename_escaped_slash() {
        let parsed = parse_filename("Either_Or 01234567.md");
        assert_eq!(parsed.title, "Either/Or");
    }

    #[test]
    fn test_parse_filename_fallback_is_deterministic() {
        let a = parse_filename("not-conforming.md");
        let b = parse_filename("not-conforming.md");
        assert_eq!(a.source_page_id, b.source_page_id);
        assert_eq!(a.source_page_id.len(), 8);
        assert!(a.source_page_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a.title, "not-conforming");
    }

    #[test]
    fn test_parse_filename_uppercase_hex_does_not_conform() {
        // Page IDs are lowercase hex; an uppercase suffix is just title text.
        let parsed = parse_filename("Shouting DEADBEEF.md");
        assert_eq!(parsed.title, "Shouting DEADBEEF");
        assert_ne!(parsed.source_page_id, "DEADBEEF");
    }

    #[test]
    fn test_decode_entities_named() {
        assert_eq!(
            decode_entities("Smith &amp; Sons &lt;est. 1422&gt;"),
            "Smith & Sons <est. 1422>"
        );
        assert_eq!(decode_entities("&quot;aye&quot; &apos;tis"), "\"aye\" 'tis");
    }

    #[test]
    fn test_decode_entities_numeric() {
        assert_eq!(decode_entities("&#x27;tis"), "'tis");
        assert_eq!(decode_entities("&#39;tis"), "'tis");
        assert_eq!(decode_entities("caf&#xE9;"), "café");
    }

    #[test]
    fn test_decode_entities_invalid_left_untouched() {
        assert_eq!(decode_entities("&#x110000;"), "&#x110000;");
        assert_eq!(decode_entities("&unknown;"), "&unknown;");
    }

    #[test]
    fn test_extract_links_strips_query_suffix() {
        let links = extract_links("See [the mayor](<Mayor Hobbs 0a1b2c3d.md?n>).");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].text, "the mayor");
        assert_eq!(links[0].target_filename, "Mayor Hobbs 0a1b2c3d.md");
        assert_eq!(links[0].target_page_id, "0a1b2c3d");
        assert_eq!(links[0].full_match, "[the mayor](<Mayor Hobbs 0a1b2c3d.md?n>)");
    }

    #[test]
    fn test_extract_links_target_with_spaces() {
        let links = extract_links("[x](<The Sunken Temple of Yg 11223344.md>)");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target_page_id, "11223344");
    }

    #[test]
    fn test_strip_tree_art_removes_index_lines() {
        let content = "Intro\n├── Chapter One\n│   └── Detail\n└── Chapter Two\nOutro";
        assert_eq!(strip_tree_art(content), "Intro\nOutro");
    }

    #[test]
    fn test_strip_tree_art_collapses_blank_runs() {
        let content = "a\n\n\n\nb";
        assert_eq!(strip_tree_art(content), "a\n\nb");
    }

    #[test]
    fn test_is_collection_page_mostly_links() {
        let content = "# NPCs\n- [Mayor Hobbs](<Mayor Hobbs 0a1b2c3d.md?n>)\n- [Old Wren](<Old Wren 1a2b3c4d.md?n>)\n- [Sister Maeve](<Sister Maeve 2a3b4c5d.md?n>)";
        let links = extract_links(content);
        assert_eq!(links.len(), 3);
        assert!(is_collection_page(content, &links));
    }

    #[test]
    fn test_is_collection_page_too_few_links() {
        let content = "- [a](<a 0a1b2c3d.md?n>)\n- [b](<b 1a2b3c4d.md?n>)";
        let links = extract_links(content);
        assert!(!is_collection_page(content, &links));
    }

    #[test]
    fn test_is_collection_page_substantial_prose() {
        let content = "The town of Thistle Hollow sits in a valley carved by the slow Meander. \
            Its people are wary of strangers, and the mill has not turned since the flood. \
            Rumors speak of lights beneath the water and a debt owed to something old. \
            [the mill](<The Mill 0a1b2c3d.md?n>) [the flood](<The Flood 1a2b3c4d.md?n>) \
            [the debt](<The Debt 2a3b4c5d.md?n>)";
        let links = extract_links(content);
        assert_eq!(links.len(), 3);
        assert!(!is_collection_page(content, &links));
    }

    #[test]
    fn test_detect_collection_type_families() {
        assert_eq!(
            detect_collection_type("Notable People"),
            CollectionType::NotablePeople
        );
        assert_eq!(detect_collection_type("NPCs"), CollectionType::NotablePeople);
        assert_eq!(detect_collection_type("Places"), CollectionType::Places);
        assert_eq!(detect_collection_type("Known Locations"), CollectionType::Places);
        assert_eq!(detect_collection_type("TODO"), CollectionType::Todo);
        assert_eq!(detect_collection_type("Open Quests"), CollectionType::Todo);
        assert_eq!(detect_collection_type("Done"), CollectionType::Done);
        assert_eq!(detect_collection_type("Completed Quests"), CollectionType::Done);
        assert_eq!(detect_collection_type("Misc"), CollectionType::Other);
    }

    #[test]
    fn test_is_session_log_title_setting_exclusion() {
        assert!(is_session_log_title("Scene 1"));
        assert!(!is_session_log_title("Scene Setting"));
        assert!(!is_session_log_title("Setting the Scene"));
    }

    #[test]
    fn test_is_session_log_title_patterns() {
        assert!(is_session_log_title("Session 12"));
        assert!(is_session_log_title("Journey to the Coast"));
        assert!(is_session_log_title("2024-03-17 Downtime"));
        assert!(is_session_log_title("We find the body"));
        assert!(!is_session_log_title("Thistle Hollow"));
    }

    #[test]
    fn test_parse_export_skips_non_markdown() {
        let entries = vec![
            ExportEntry {
                filename: "Page One 0a1b2c3d.md".into(),
                content: "hello".into(),
                last_modified: None,
            },
            ExportEntry {
                filename: "image.png".into(),
                content: String::new(),
                last_modified: None,
            },
        ];
        let pages = parse_export(&entries);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].title, "Page One");
        assert!(!pages[0].is_empty);
    }

    #[test]
    fn test_parse_export_marks_empty_pages() {
        let entries = vec![ExportEntry {
            filename: "Blank 0a1b2c3d.md".into(),
            content: "  \n├── noise\n ".into(),
            last_modified: None,
        }];
        let pages = parse_export(&entries);
        assert!(pages[0].is_empty);
        assert_eq!(pages[0].content_raw, "  \n├── noise\n ");
    }

    #[test]
    fn test_detect_collections_memberships() {
        let entries = vec![
            ExportEntry {
                filename: "Notable People 0000aaaa.md".into(),
                content: "- [A](<A 0a000001.md?n>)\n- [B](<B 0a000002.md?n>)\n- [C](<C 0a000003.md?n>)".into(),
                last_modified: None,
            },
            ExportEntry {
                filename: "Done 0000bbbb.md".into(),
                content: "- [A](<A 0a000001.md?n>)\n- [X](<X 0a000004.md?n>)\n- [Y](<Y 0a000005.md?n>)".into(),
                last_modified: None,
            },
        ];
        let pages = parse_export(&entries);
        let (collections, memberships) = detect_collections(&pages);

        assert_eq!(collections.len(), 2);
        // Page A belongs to both collections.
        let a = &memberships["0a000001"];
        assert!(a.contains(&CollectionType::NotablePeople));
        assert!(a.contains(&CollectionType::Done));
        assert_eq!(memberships["0a000004"], vec![CollectionType::Done]);
    }
}
