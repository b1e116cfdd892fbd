//! Chunking and merging of provenance references.
//!
//! The store caps string values at [`FRAGMENT_MAX`] characters, so long
//! supporting text is wrapped at word boundaries and citation-index URLs
//! carrying comma-separated record-id batches are split into the fewest
//! under-limit groups. The split is exactly invertible: stripping the common
//! base and rejoining the id lists reproduces the original URL.

use crate::model::FRAGMENT_MAX;

/// Base URL of the citation index whose batched record-id lists get split.
pub const CITATION_BASE: &str = "https://www.ncbi.nlm.nih.gov/pubmed/";

const BOOK_SOURCES_BASE: &str = "https://www.wikidata.org/wiki/Special:BookSources/";

/// Wrap text into word-boundary-respecting chunks of at most
/// [`FRAGMENT_MAX`] characters. Words are never split; a single word longer
/// than the limit becomes its own (oversized) chunk.
pub fn chunk_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if current.chars().count() + 1 + word.chars().count() <= FRAGMENT_MAX {
            current.push(' ');
            current.push_str(word);
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Rewrite recognized special reference forms. ISBN-prefixed identifiers
/// become a canonical book-source URL; everything else passes through.
pub fn rewrite_special_url(url: &str) -> String {
    if let Some(isbn) = url.strip_prefix("ISBN") {
        let isbn = isbn
            .trim_start_matches("-13")
            .trim_start_matches("-10")
            .trim_start_matches(':')
            .trim();
        return format!("{BOOK_SOURCES_BASE}{isbn}");
    }
    url.to_string()
}

/// Whether a URL is a citation-index URL subject to batch splitting.
pub fn is_citation_url(url: &str) -> bool {
    url.starts_with(CITATION_BASE)
}

/// Split a citation-index URL carrying a comma-separated id batch into the
/// fewest ordered groups whose rendered URLs stay strictly under
/// [`FRAGMENT_MAX`] characters. Ids are never split and keep their order.
pub fn split_citation_url(url: &str) -> Vec<String> {
    let ids = url.trim_start_matches(CITATION_BASE);
    let mut pending = ids.split(',').collect::<Vec<_>>();
    pending.reverse(); // pop() takes from the front

    let mut urls = Vec::new();
    while let Some(first) = pending.pop() {
        let mut this_url = format!("{CITATION_BASE}{first}");
        while let Some(next) = pending.last() {
            if this_url.len() + next.len() + 1 < FRAGMENT_MAX {
                this_url.push(',');
                this_url.push_str(next);
                pending.pop();
            } else {
                break;
            }
        }
        urls.push(this_url);
    }
    urls
}

/// Inverse of [`split_citation_url`]: strip the common base, concatenate the
/// id lists in order, and rejoin as a single comma-separated URL.
pub fn merge_citation_urls<S: AsRef<str>>(urls: &[S]) -> String {
    let ids: Vec<&str> = urls
        .iter()
        .flat_map(|u| u.as_ref().trim_start_matches(CITATION_BASE).split(','))
        .collect();
    format!("{CITATION_BASE}{}", ids.join(","))
}

/// Render one raw reference URI into its stored fragment forms: rewrite
/// special forms, split citation batches, truncate anything else to the
/// fragment limit.
pub fn url_fragments(raw: &str) -> Vec<String> {
    let url = rewrite_special_url(raw);
    if is_citation_url(&url) {
        split_citation_url(&url)
    } else {
        vec![url.chars().take(FRAGMENT_MAX).collect()]
    }
}
