//! Checks on fetched marketplace HTML.

use scraper::{Html, Selector};

/// True if the page's first `<h1>` mentions "404" (the marketplace's not-found page).
pub fn is_404_page(html: &str) -> bool {
    let Ok(h1) = Selector::parse("h1") else {
        return false;
    };
    let doc = Html::parse_document(html);
    doc.select(&h1)
        .next()
        .map(|e| e.text().collect::<String>().contains("404"))
        .unwrap_or(false)
}
