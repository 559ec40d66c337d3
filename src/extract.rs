use crate::address::{AddressRules, ONION_SUFFIX};
use select::document::Document;
use select::predicate::{Attr, Name, Predicate};
use std::collections::BTreeSet;
use url::Url;

const TEXT_TAGS: [&str; 10] = ["p", "h1", "h2", "h3", "h4", "h5", "h6", "span", "div", "a"];

/// Collects every anchor target that resolves to an acceptable hidden-service
/// address. Relative references are resolved against `base`.
pub fn extract_links(html: &str, base: &Url, rules: &AddressRules) -> BTreeSet<String> {
    let document = Document::from(html);

    document
        .find(Name("a").and(Attr("href", ())))
        .filter_map(|node| node.attr("href"))
        .filter(|href| href.contains(ONION_SUFFIX))
        .filter_map(|href| base.join(href.trim()).ok())
        .map(|url| url.to_string())
        .filter(|url| rules.is_valid(url))
        .collect()
}

/// Case-insensitive search for `keyword` in the page title, meta contents
/// and the visible text of headings, paragraphs, containers and links.
pub fn contains_keyword(html: &str, keyword: &str) -> bool {
    let keyword = keyword.trim().to_lowercase();
    if html.is_empty() || keyword.is_empty() {
        return false;
    }

    let document = Document::from(html);
    let mut sources: Vec<String> = Vec::new();

    if let Some(title) = document.find(Name("title")).next() {
        sources.push(title.text());
    }

    sources.extend(
        document
            .find(Name("meta"))
            .filter_map(|node| node.attr("content"))
            .map(str::to_string),
    );

    for tag in TEXT_TAGS {
        sources.extend(
            document
                .find(Name(tag))
                .map(|node| node.text().trim().to_string())
                .filter(|text| !text.is_empty()),
        );
    }

    sources.join(" ").to_lowercase().contains(&keyword)
}
