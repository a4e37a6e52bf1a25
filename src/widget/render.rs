// src/widget/render.rs
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html};
use pulldown_cmark_escape::escape_html;

const SAFE_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Render model output (untrusted markdown) to HTML. Raw HTML in the input is
/// emitted as escaped text, never as markup, and link or image targets with a
/// scheme other than http, https or mailto are dropped.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link { link_type, dest_url, title, id }) => Event::Start(Tag::Link {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image { link_type, dest_url, title, id }) => Event::Start(Tag::Image {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    // Browsers ignore whitespace and control characters inside a scheme.
    let compact: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    let scheme = compact
        .find(|c| matches!(c, ':' | '/' | '?' | '#'))
        .filter(|&i| compact[i..].starts_with(':'))
        .map(|i| &compact[..i]);

    match scheme {
        Some(scheme) if !SAFE_SCHEMES.contains(&scheme) => CowStr::Borrowed(""),
        _ => url,
    }
}

/// Escape plain text for insertion into HTML.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing into a String cannot fail.
    let _ = escape_html(&mut out, text);
    out
}
