//! HTML for listing pages, detail pages and their cards.
//!
//! Output is deterministic for a given working set so that republishing an
//! unchanged site writes nothing. Text and attributes are escaped; embed
//! markup is inserted verbatim.

use std::fmt::Write as _;

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use crate::config::SiteSettings;
use crate::record::VideoRecord;
use crate::scrape::PLAYER_ELEMENT_ID;

pub const INDEX_FILE: &str = "index.html";
pub const DETAIL_DIR: &str = "videos";
const EMBED_PLACEHOLDER: &str = "<!-- Video embed will be here -->";

/// Page 1 is `index.html`; later pages are `page{n}.html`.
pub fn listing_file_name(page: usize) -> String {
    if page <= 1 {
        INDEX_FILE.to_string()
    } else {
        format!("page{page}.html")
    }
}

/// Site-relative path of a detail page file.
pub fn detail_path(file_name: &str) -> String {
    format!("{DETAIL_DIR}/{file_name}")
}

/// A record together with the detail file it is published under.
#[derive(Debug, Clone, Copy)]
pub struct Card<'a> {
    pub record: &'a VideoRecord,
    pub file_name: &'a str,
}

/// An entry in a detail page's "More Like This" block.
#[derive(Debug, Clone, Copy)]
pub struct RelatedCard<'a> {
    pub card: Card<'a>,
    pub matched_tags: &'a [String],
}

fn page_head(out: &mut String, title: &str, description: &str, tags: &str, asset_prefix: &str) {
    let _ = write!(
        out,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>{title}</title>
    <meta name="description" content="{description}" />
"#,
        title = text(title),
        description = attr(description),
    );
    if !tags.is_empty() {
        let _ = writeln!(out, r#"    <meta name="tags" content="{}" />"#, attr(tags));
    }
    let _ = write!(
        out,
        r#"    <link rel="stylesheet" href="{asset_prefix}assets/styles.css" />
</head>
<body>
"#
    );
}

fn site_header(out: &mut String, settings: &SiteSettings, home: &str) {
    let _ = write!(
        out,
        r#"    <header class="site-header">
        <div class="container">
            <a class="brand" href="{home}">{name}</a>
            <nav class="nav">
                <a href="{home}">Home</a>
            </nav>
        </div>
    </header>
"#,
        name = text(&settings.site_name),
    );
}

fn site_footer(out: &mut String, settings: &SiteSettings) {
    let _ = write!(
        out,
        r#"    <footer class="site-footer">
        <div class="container">
            <p>&copy; {name}</p>
        </div>
    </footer>
</body>
</html>
"#,
        name = text(&settings.site_name),
    );
}

/// One `.video-card` as it appears on a listing page.
///
/// The data attributes let the importer rebuild the record without guessing.
pub fn render_card(card: Card<'_>) -> String {
    let record = card.record;
    let created = record
        .created
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    format!(
        r#"        <div class="video-card" data-id="{id}" data-created="{created}" data-title="{title_attr}" data-description="{description_attr}" data-tags="{tags}">
            <a href="{href}">
                <div class="thumb-container"><img src="{thumbnail}" alt="{title_attr}" loading="lazy" /></div>
                <div class="card-content">
                    <h2>{title}</h2>
                    <p>{description}</p>
                </div>
            </a>
        </div>
"#,
        id = attr(&record.id),
        title_attr = attr(&record.title),
        description_attr = attr(&record.description),
        tags = attr(&record.tags),
        href = attr(&detail_path(card.file_name)),
        thumbnail = attr(&record.thumbnail),
        title = text(&record.title),
        description = text(&record.description),
    )
}

/// Previous / numbered / next links. The ends render as disabled spans and
/// the current page as `span.current`.
pub fn render_pagination(current: usize, total: usize) -> String {
    let mut out = String::from("        <nav class=\"pagination\">\n");
    if current > 1 {
        let _ = writeln!(
            out,
            r#"            <a class="prev" href="{}">&larr; Previous</a>"#,
            listing_file_name(current - 1)
        );
    } else {
        out.push_str("            <span class=\"prev disabled\">&larr; Previous</span>\n");
    }
    for page in 1..=total {
        if page == current {
            let _ = writeln!(out, r#"            <span class="current">{page}</span>"#);
        } else {
            let _ = writeln!(
                out,
                r#"            <a href="{}">{page}</a>"#,
                listing_file_name(page)
            );
        }
    }
    if current < total {
        let _ = writeln!(
            out,
            r#"            <a class="next" href="{}">Next &rarr;</a>"#,
            listing_file_name(current + 1)
        );
    } else {
        out.push_str("            <span class=\"next disabled\">Next &rarr;</span>\n");
    }
    out.push_str("        </nav>\n");
    out
}

/// A complete listing page. `page` is 1-indexed.
pub fn render_listing_page(
    settings: &SiteSettings,
    cards: &[Card<'_>],
    page: usize,
    total_pages: usize,
) -> String {
    let title = if page <= 1 {
        settings.site_name.clone()
    } else {
        format!("{} - Page {page}", settings.site_name)
    };
    let mut out = String::new();
    page_head(&mut out, &title, &settings.site_name, "", "");
    site_header(&mut out, settings, INDEX_FILE);
    out.push_str("    <main class=\"container\">\n        <div class=\"video-grid\">\n");
    if cards.is_empty() {
        out.push_str("        <p class=\"empty\">No videos yet.</p>\n");
    }
    for card in cards {
        out.push_str(&render_card(*card));
    }
    out.push_str("        </div>\n");
    out.push_str(&render_pagination(page, total_pages.max(1)));
    out.push_str("    </main>\n");
    site_footer(&mut out, settings);
    out
}

fn render_related(out: &mut String, related: &[RelatedCard<'_>]) {
    out.push_str(
        "            <section class=\"related\">\n                <h2>More Like This</h2>\n                <div class=\"grid\">\n",
    );
    for entry in related {
        let record = entry.card.record;
        let _ = write!(
            out,
            r#"                    <a class="card" href="{href}" data-id="{id}">
                        <div class="thumb"><img src="{thumbnail}" alt="{title_attr}" loading="lazy" /></div>
                        <div class="card-body">
                            <h3>{title}</h3>
"#,
            href = attr(entry.card.file_name),
            id = attr(&record.id),
            thumbnail = attr(&record.thumbnail),
            title_attr = attr(&record.title),
            title = text(&record.title),
        );
        if !entry.matched_tags.is_empty() {
            out.push_str("                            <p class=\"matched-tags\">");
            for (i, tag) in entry.matched_tags.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                let _ = write!(out, r#"<span class="tag">{}</span>"#, text(tag));
            }
            out.push_str("</p>\n");
        }
        out.push_str("                        </div>\n                    </a>\n");
    }
    out.push_str("                </div>\n            </section>\n");
}

/// A complete detail page for `record`, with its embed inside the
/// `.responsive-embed` container and `related` below it.
pub fn render_detail_page(
    settings: &SiteSettings,
    record: &VideoRecord,
    related: &[RelatedCard<'_>],
) -> String {
    let mut out = String::new();
    page_head(
        &mut out,
        &format!("Watch - {}", record.title),
        &record.description,
        &record.tags,
        "../",
    );
    site_header(&mut out, settings, "../");
    let embed = if record.has_embed() {
        record.embed.as_str()
    } else {
        EMBED_PLACEHOLDER
    };
    let _ = write!(
        out,
        r#"    <main class="container">
        <article class="player-article" data-id="{id}">
            <h1>{title}</h1>
            <p class="meta">Posted {posted}</p>
            <div class="player-wrap">
                <div class="responsive-embed">
                    <button class="fullscreen-btn" type="button" data-target="{player_id}">Fullscreen</button>
                    {embed}
                </div>
            </div>
            <p class="description">{description}</p>
"#,
        id = attr(&record.id),
        title = text(&record.title),
        posted = record.posted_on(),
        player_id = PLAYER_ELEMENT_ID,
        description = text(&record.description),
    );
    let tags = record.tag_list();
    if !tags.is_empty() {
        out.push_str("            <p class=\"tags\">");
        for (i, tag) in tags.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, r#"<span class="tag">{}</span>"#, text(tag));
        }
        out.push_str("</p>\n");
    }
    render_related(&mut out, related);
    out.push_str("        </article>\n    </main>\n");
    site_footer(&mut out, settings);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::{extract_detail_title, extract_embed, scrape_listing};
    use chrono::{TimeZone, Utc};

    fn record(id: &str, title: &str) -> VideoRecord {
        VideoRecord {
            id: id.into(),
            title: title.into(),
            description: "A <short> clip".into(),
            tags: "cats, Naps".into(),
            thumbnail: "https://img.test/a.jpg?x=1&y=2".into(),
            embed: r#"<iframe id="videoPlayer" src="https://p.test/1"></iframe>"#.into(),
            created: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            source_file: None,
            featured: false,
            draft: false,
        }
    }

    #[test]
    fn listing_file_names() {
        assert_eq!(listing_file_name(1), "index.html");
        assert_eq!(listing_file_name(2), "page2.html");
        assert_eq!(detail_path("a.html"), "videos/a.html");
    }

    #[test]
    fn pagination_disables_the_ends() {
        let first = render_pagination(1, 3);
        assert!(first.contains(r#"<span class="prev disabled">"#));
        assert!(first.contains(r#"<span class="current">1</span>"#));
        assert!(first.contains(r#"<a class="next" href="page2.html">"#));

        let middle = render_pagination(2, 3);
        assert!(middle.contains(r#"<a class="prev" href="index.html">"#));
        assert!(middle.contains(r#"<a href="page3.html">3</a>"#));

        let last = render_pagination(3, 3);
        assert!(last.contains(r#"<span class="next disabled">"#));
        assert!(last.contains(r#"<a href="index.html">1</a>"#));
    }

    #[test]
    fn listing_cards_scrape_back_to_the_same_fields() {
        let rec = record("cat-nap-1700000000000", "Cat & Nap");
        let html = render_listing_page(
            &SiteSettings::default(),
            &[Card { record: &rec, file_name: "cat-nap.html" }],
            1,
            1,
        );
        let cards = scrape_listing(&html);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].title, "Cat & Nap");
        assert_eq!(cards[0].description, "A <short> clip");
        assert_eq!(cards[0].thumbnail, rec.thumbnail);
        assert_eq!(cards[0].detail_file, "cat-nap.html");
        assert_eq!(cards[0].id.as_deref(), Some(rec.id.as_str()));
        assert_eq!(cards[0].created, Some(rec.created));
    }

    #[test]
    fn detail_page_carries_embed_title_and_related() {
        let rec = record("a", "Alpha");
        let other = record("b", "Beta <b>");
        let matched = vec!["cats".to_string()];
        let html = render_detail_page(
            &SiteSettings::default(),
            &rec,
            &[RelatedCard {
                card: Card { record: &other, file_name: "beta-b.html" },
                matched_tags: &matched,
            }],
        );
        assert_eq!(extract_detail_title(&html).as_deref(), Some("Alpha"));
        assert!(extract_embed(&html).unwrap().contains("https://p.test/1"));
        assert!(html.contains(r#"<meta name="tags" content="cats, Naps" />"#));
        assert!(html.contains(r#"<a class="card" href="beta-b.html" data-id="b">"#));
        assert!(html.contains("Beta &lt;b&gt;"));
        assert!(html.contains(r#"<span class="tag">cats</span>"#));
    }

    #[test]
    fn blank_embed_renders_placeholder_that_extracts_as_missing() {
        let mut rec = record("a", "Alpha");
        rec.embed.clear();
        let html = render_detail_page(&SiteSettings::default(), &rec, &[]);
        assert!(html.contains(EMBED_PLACEHOLDER));
        assert_eq!(extract_embed(&html), None);
    }

    #[test]
    fn empty_listing_still_renders_an_index() {
        let html = render_listing_page(&SiteSettings::default(), &[], 1, 0);
        assert!(html.contains("No videos yet."));
        assert!(html.contains(r#"<span class="current">1</span>"#));
    }
}
