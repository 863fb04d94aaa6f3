use std::cmp::Ordering;
use std::collections::HashMap;

use ego_tree::{NodeId, NodeRef};
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Node, Selector};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use seo_core::document::PageDocument;

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").unwrap();
    static ref BODY: Selector = Selector::parse("body").unwrap();
    static ref HTML_TAG: Selector = Selector::parse("html").unwrap();
    static ref ARTICLE: Selector = Selector::parse("article").unwrap();
    static ref MAIN_REGION: Selector = Selector::parse("main").unwrap();
    static ref ROLE_MAIN: Selector = Selector::parse(r#"[role="main"]"#).unwrap();
    static ref PARAGRAPH: Selector = Selector::parse("p").unwrap();
    static ref ANCHOR: Selector = Selector::parse("a").unwrap();
    static ref CANONICAL: Selector = Selector::parse(r#"link[rel~="canonical"]"#).unwrap();
    static ref META_DESCRIPTION: Selector = Selector::parse(r#"meta[name="description"]"#).unwrap();
    static ref META_KEYWORDS: Selector = Selector::parse(r#"meta[name="keywords"]"#).unwrap();
    static ref OG_TITLE: Selector = Selector::parse(r#"meta[property="og:title"]"#).unwrap();
    static ref OG_DESCRIPTION: Selector =
        Selector::parse(r#"meta[property="og:description"]"#).unwrap();
    static ref TWITTER_DESCRIPTION: Selector =
        Selector::parse(r#"meta[property="twitter:description"]"#).unwrap();
    static ref H1: Selector = Selector::parse("h1").unwrap();
    static ref H2: Selector = Selector::parse("h2").unwrap();
    static ref H3: Selector = Selector::parse("h3").unwrap();
}

/// Subtrees that never contribute readable page text.
const SKIPPED_TEXT_TAGS: [&str; 6] = ["script", "style", "noscript", "link", "nav", "footer"];

/// A semantic container with less text than this is decoration, not the
/// main content.
const MIN_REGION_CHARS: usize = 140;
/// Paragraphs shorter than this carry no weight in the block scoring.
const MIN_PARAGRAPH_CHARS: usize = 25;

const CODE_KEYWORDS: [&str; 19] = [
    "function ",
    "var ",
    "let ",
    "const ",
    "=>",
    "if(",
    "for(",
    "while(",
    "return ",
    "{",
    "}",
    ";",
    "/*",
    "*/",
    ".class",
    "background:",
    "color:",
    "margin:",
    "padding:",
];

/// Parse raw HTML into a clean, SEO-oriented document: title and meta tags
/// with their open-graph fallbacks, canonical URL, headings in document
/// order, and the main-content text with script/style/navigation junk
/// stripped out. Content comes from the region [`main_content`] singles
/// out, so sidebars and banners elsewhere in the body stay out of the
/// index. Pure function of its inputs apart from the `crawled_at` stamp.
pub fn parse_page(url: &str, html: &str) -> PageDocument {
    let document = Html::parse_document(html);

    let mut title = document
        .select(&TITLE)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();
    if title.is_empty() {
        title = first_meta(&document, &[&OG_TITLE]).unwrap_or_default();
    }

    let mut meta_description = first_meta(
        &document,
        &[&META_DESCRIPTION, &OG_DESCRIPTION, &TWITTER_DESCRIPTION],
    )
    .unwrap_or_default();
    let meta_keywords = first_meta(&document, &[&META_KEYWORDS]).unwrap_or_default();

    let lang = document
        .select(&HTML_TAG)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .unwrap_or("")
        .trim()
        .to_string();

    let canonical_url = document
        .select(&CANONICAL)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .unwrap_or_else(|| url.to_string());

    let mut parts = Vec::new();
    let region = main_content(&document).or_else(|| document.select(&BODY).next());
    if let Some(region) = region {
        collect_text(*region, &mut parts);
    }
    let content = parts
        .iter()
        .flat_map(|part| part.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !looks_like_code_or_css(line))
        .collect::<Vec<_>>()
        .join(" ");
    let content = content.split_whitespace().collect::<Vec<_>>().join(" ");
    let content_length = content.chars().count() as i64;

    let headings_h1 = collect_headings(&document, &H1);
    let headings_h2 = collect_headings(&document, &H2);
    let headings_h3 = collect_headings(&document, &H3);
    let h1 = headings_h1.first().cloned().unwrap_or_default();

    if meta_description.is_empty() && !content.is_empty() {
        meta_description = truncate_chars(&content, 160);
    }
    let summary = truncate_chars(&content, 250);

    PageDocument {
        url: url.to_string(),
        canonical_url,
        title,
        content,
        summary,
        h1,
        headings_h1,
        headings_h2,
        headings_h3,
        meta_description,
        meta_keywords,
        lang,
        crawled_at: Some(
            OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
        ),
        content_length: Some(content_length),
        ..Default::default()
    }
}

fn first_meta(document: &Html, selectors: &[&Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        document
            .select(selector)
            .filter_map(|el| el.value().attr("content"))
            .map(str::trim)
            .find(|content| !content.is_empty())
            .map(str::to_string)
    })
}

fn collect_headings(document: &Html, selector: &Selector) -> Vec<String> {
    document
        .select(selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .collect()
}

/// Single out the block most likely to hold the page's main content before
/// any text is collected. A semantic `article`/`main`/`role=main` container
/// wins when it carries real text. Otherwise each paragraph's text mass is
/// credited to its parent (and half to its grandparent) and the best block
/// wins, discounted by link density so menus, breadcrumbs, and related-link
/// widgets lose to prose. `None` when nothing stands out; callers fall back
/// to the whole `<body>`.
fn main_content(document: &Html) -> Option<ElementRef<'_>> {
    for selector in [&*ARTICLE, &*MAIN_REGION, &*ROLE_MAIN] {
        if let Some(region) = document.select(selector).max_by_key(|el| text_len(*el)) {
            if text_len(region) >= MIN_REGION_CHARS {
                return Some(region);
            }
        }
    }

    let mut candidates: HashMap<NodeId, (ElementRef<'_>, f64)> = HashMap::new();
    for paragraph in document.select(&PARAGRAPH) {
        let text = paragraph.text().collect::<String>();
        let text = text.trim();
        let chars = text.chars().count();
        if chars < MIN_PARAGRAPH_CHARS {
            continue;
        }
        let score = 1.0 + text.matches(',').count() as f64 + (chars.min(300) as f64 / 100.0);

        let Some(parent) = paragraph.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        if parent.value().name() == "html" {
            continue;
        }
        let mut credits = vec![(parent, score)];
        if let Some(grandparent) = parent.parent().and_then(ElementRef::wrap) {
            if grandparent.value().name() != "html" {
                credits.push((grandparent, score / 2.0));
            }
        }
        for (el, credit) in credits {
            candidates.entry(el.id()).or_insert((el, 0.0)).1 += credit;
        }
    }

    candidates
        .into_values()
        .map(|(el, score)| (el, score * (1.0 - link_density(el))))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        .filter(|(_, score)| *score > 0.0)
        .map(|(el, _)| el)
}

fn text_len(el: ElementRef<'_>) -> usize {
    el.text().map(|chunk| chunk.trim().chars().count()).sum()
}

fn link_density(el: ElementRef<'_>) -> f64 {
    let total = text_len(el);
    if total == 0 {
        return 0.0;
    }
    let linked: usize = el.select(&ANCHOR).map(text_len).sum();
    (linked as f64 / total as f64).min(1.0)
}

fn collect_text(node: NodeRef<'_, Node>, parts: &mut Vec<String>) {
    for child in node.children() {
        match child.value() {
            Node::Element(element) => {
                if !SKIPPED_TEXT_TAGS.contains(&element.name()) {
                    collect_text(child, parts);
                }
            }
            Node::Text(text) => parts.push(text.text.to_string()),
            _ => {}
        }
    }
}

/// Heuristic to drop lines that are mostly JS/CSS/minified code rather than
/// readable text, so stray inline junk never lands in `content`.
fn looks_like_code_or_css(line: &str) -> bool {
    if line.is_empty() {
        return false;
    }
    let len = line.chars().count();
    if len > 400 {
        return true;
    }
    let special = line
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count();
    if len > 80 && special as f64 / len as f64 > 0.35 {
        return true;
    }
    let hits = CODE_KEYWORDS
        .iter()
        .filter(|keyword| line.contains(*keyword))
        .count();
    hits >= 3
}

fn truncate_chars(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}
