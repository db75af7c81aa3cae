//! Page shells for the generated site.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::record::Record;
use crate::views::{SearchEntry, TagEntry};

const STYLE: &str = "body{font-family:sans-serif;max-width:60rem;margin:0 auto;padding:1rem;line-height:1.5}\
pre{overflow-x:auto}ul.listing{list-style:none;padding-left:0}ul.listing li.dir a{font-weight:bold}\
nav.tags a{margin-right:.5rem}footer{margin-top:2rem;font-size:.85rem;color:#555}";

const FILTER_SCRIPT: &str = r#"<script>
document.getElementById("search").addEventListener("input", (event) => {
  const query = event.target.value.toLowerCase();
  for (const item of document.querySelectorAll("ul.listing li")) {
    item.hidden = !item.textContent.toLowerCase().includes(query);
  }
});
</script>"#;

const HOME_SEARCH_SCRIPT: &str = r#"<script>
const results = document.getElementById("results");
document.getElementById("search").addEventListener("input", (event) => {
  const query = event.target.value.toLowerCase().trim();
  results.replaceChildren();
  if (!query) return;
  for (const entry of searchData) {
    const haystack = [entry.title, ...entry.tags].join(" ").toLowerCase();
    if (!haystack.includes(query)) continue;
    const item = document.createElement("li");
    const link = document.createElement("a");
    link.href = entry.path;
    link.textContent = entry.title + (entry.is_dir ? "/" : "");
    item.append(link);
    results.append(item);
  }
});
</script>"#;

const PERMALINK_SCRIPT: &str = r#"<script>
const id = new URLSearchParams(window.location.search).get("uuid");
const status = document.getElementById("status");
if (id && Object.hasOwn(permalinks, id)) {
  window.location.replace(permalinks[id]);
} else {
  status.textContent = id ? "No note has permalink " + id : "No permalink given";
}
</script>"#;

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Serialize `value` for embedding in an inline `<script>`. A literal `</`
/// would end the script element early, so it is escaped.
pub fn script_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

/// Directory name for a tag page. Path separators and leading dots are
/// replaced so a tag can never escape `tags/`.
pub fn tag_slug(tag: &str) -> String {
    let slug: String = tag
        .trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '?' | '#' | '%' => '_',
            ch if ch.is_whitespace() => '-',
            ch => ch,
        })
        .collect();
    let slug = slug.trim_start_matches('.');
    if slug.is_empty() {
        "_".to_string()
    } else {
        slug.to_string()
    }
}

fn shell(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
<title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        title = escape_html(title),
    )
}

fn license_footer(license: Option<&str>) -> String {
    match license {
        Some(text) => format!(
            "<footer class=\"license\"><pre>{}</pre></footer>",
            escape_html(text.trim_end())
        ),
        None => String::new(),
    }
}

fn tag_links(tags: &[String]) -> String {
    if tags.is_empty() {
        return String::new();
    }
    let mut out = String::from("<nav class=\"tags\">");
    for tag in tags {
        let _ = write!(
            out,
            "<a href=\"/tags/{}/\">#{}</a>",
            escape_html(&tag_slug(tag)),
            escape_html(tag)
        );
    }
    out.push_str("</nav>");
    out
}

fn article_header(record: &Record) -> String {
    let mut out = format!("<header>\n<h1>{}</h1>\n", escape_html(&record.title));
    if let Some(author) = record.extra_string("author") {
        let _ = writeln!(out, "<p class=\"author\">{}</p>", escape_html(&author));
    }
    for (key, label) in [("lecture_slides", "slides"), ("lecture_notes", "notes")] {
        if let Some(target) = record.extra_string(key) {
            let _ = writeln!(
                out,
                "<p><a href=\"{}\">{label}</a></p>",
                escape_html(&target)
            );
        }
    }
    out.push_str(&tag_links(&record.tags));
    if let Some(identifier) = &record.identifier {
        let _ = write!(
            out,
            "\n<p class=\"permalink\"><a href=\"/permalink/?uuid={id}\">permalink</a></p>",
            id = escape_html(identifier)
        );
    }
    out.push_str("\n</header>");
    out
}

/// Rendered Markdown note.
pub fn article_page(record: &Record, content_html: &str, license: Option<&str>) -> String {
    let body = format!(
        "{}\n<article>\n{content_html}\n</article>\n{}",
        article_header(record),
        license_footer(license)
    );
    shell(&record.title, &body)
}

/// Preview page for a plaintext file, linking to the raw copy.
pub fn text_page(record: &Record, text: &str, license: Option<&str>) -> String {
    let raw_name = record
        .output
        .raw
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let body = format!(
        "{}\n<p><a href=\"{raw}\">raw</a></p>\n<pre>{}</pre>\n{}",
        article_header(record),
        escape_html(text),
        license_footer(license),
        raw = escape_html(&raw_name),
    );
    shell(&record.title, &body)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingFlags {
    pub automatic_index: bool,
    pub search_bar: bool,
    pub content_after_search: bool,
}

impl Default for ListingFlags {
    fn default() -> Self {
        Self {
            automatic_index: true,
            search_bar: true,
            content_after_search: false,
        }
    }
}

impl ListingFlags {
    pub fn from_record(record: &Record) -> Self {
        let defaults = Self::default();
        Self {
            automatic_index: record.extra_bool("automatic_index", defaults.automatic_index),
            search_bar: record.extra_bool("search_bar", defaults.search_bar),
            content_after_search: record
                .extra_bool("content_after_search", defaults.content_after_search),
        }
    }
}

/// Directory or tag listing. `entries` is `(title, is_dir, href)`.
pub fn listing_page(
    title: &str,
    content_html: &str,
    entries: &[(&str, bool, &str)],
    flags: ListingFlags,
) -> String {
    let mut body = format!("<h1>{}</h1>\n", escape_html(title));
    let content = if content_html.trim().is_empty() {
        String::new()
    } else {
        format!("<section class=\"content\">\n{content_html}\n</section>\n")
    };
    if !flags.content_after_search {
        body.push_str(&content);
    }
    if flags.search_bar {
        body.push_str("<input id=\"search\" type=\"search\" placeholder=\"filter\">\n");
    }
    if flags.content_after_search {
        body.push_str(&content);
    }
    if flags.automatic_index {
        body.push_str("<ul class=\"listing\">\n");
        for (entry_title, is_dir, href) in entries {
            let _ = writeln!(
                body,
                "<li class=\"{class}\"><a href=\"{href}\">{title}{slash}</a></li>",
                class = if *is_dir { "dir" } else { "file" },
                href = escape_html(href),
                title = escape_html(entry_title),
                slash = if *is_dir { "/" } else { "" },
            );
        }
        body.push_str("</ul>\n");
    }
    if flags.search_bar {
        body.push_str(FILTER_SCRIPT);
    }
    shell(title, &body)
}

pub fn directory_page(record: &Record, content_html: &str) -> String {
    let entries: Vec<(&str, bool, &str)> = record
        .index_entries
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|entry| {
            (
                entry.title.as_str(),
                entry.is_directory,
                entry.output.web.as_str(),
            )
        })
        .collect();
    listing_page(
        &record.title,
        content_html,
        &entries,
        ListingFlags::from_record(record),
    )
}

pub fn tag_page(tag: &str, entries: &[TagEntry]) -> String {
    let entries: Vec<(&str, bool, &str)> = entries
        .iter()
        .map(|entry| (entry.title.as_str(), entry.is_dir, entry.path.as_str()))
        .collect();
    listing_page(tag, "", &entries, ListingFlags::default())
}

/// Index of every tag. `tags` maps slug to display name.
pub fn tags_index_page(tags: &BTreeMap<String, String>) -> String {
    let hrefs: Vec<(String, &str)> = tags
        .iter()
        .map(|(slug, name)| (format!("{slug}/"), name.as_str()))
        .collect();
    let entries: Vec<(&str, bool, &str)> = hrefs
        .iter()
        .map(|(href, name)| (*name, false, href.as_str()))
        .collect();
    listing_page("tags", "", &entries, ListingFlags::default())
}

pub fn home_page(
    title: &str,
    content_html: &str,
    base_url: &str,
    search: &[SearchEntry],
) -> serde_json::Result<String> {
    let body = format!(
        "<h1>{title}</h1>\n<nav><a href=\"{base}/\">browse</a> <a href=\"/tags/\">tags</a></nav>\n\
<section class=\"content\">\n{content_html}\n</section>\n\
<input id=\"search\" type=\"search\" placeholder=\"search notes\">\n<ul id=\"results\"></ul>\n\
<script>const searchData = {data};</script>\n{HOME_SEARCH_SCRIPT}",
        title = escape_html(title),
        base = escape_html(base_url.trim_end_matches('/')),
        data = script_json(&search)?,
    );
    Ok(shell(title, &body))
}

pub fn permalink_page(permalinks: &BTreeMap<String, String>) -> serde_json::Result<String> {
    let body = format!(
        "<h1>permalink</h1>\n<p id=\"status\">redirecting...</p>\n\
<script>const permalinks = {data};</script>\n{PERMALINK_SCRIPT}",
        data = script_json(permalinks)?,
    );
    Ok(shell("permalink", &body))
}
