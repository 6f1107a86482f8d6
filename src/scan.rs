//! Category discovery: walk category IDs `1..=max_cat` through the search
//! endpoint and build a catalog from the ads that come back.
//!
//! Every kind of page failure (request error, invalid JSON, no ads, a first
//! ad that is not an object) is recovered the same way: the consecutive-failure
//! counter goes up and the scan moves on. Once `max_jump` failures happen in a
//! row the scan stops early. Callers only ever see the catalog, which may be
//! short.

use crate::api::{ApiError, SearchApi};
use crate::model::{fallback_name, Ad, Category};
use crate::query::{SearchQuery, DEFAULT_SITE_URL};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_MAX_JUMP: u32 = 5;
pub const DEFAULT_MAX_CAT: u32 = 100;

/// How ads from a successful page turn into catalog entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregation {
    /// Keep every ad; the catalog is the set of distinct category IDs, sorted.
    #[default]
    CollectAll,
    /// Keep the first ad of each page; one entry per page, in scan order.
    CollectFirst,
}

/// Options for a scan run.
pub struct ScanOptions<'a> {
    /// Consecutive failures that end the scan (at least 1).
    pub max_jump: u32,
    /// Last category ID to query.
    pub max_cat: u32,
    pub aggregation: Aggregation,
    /// Marketplace root the search URLs are built on.
    pub site_url: &'a str,
    /// Called before each page with (current ID, max_cat).
    pub progress: Option<&'a dyn Fn(u32, u32)>,
}

impl Default for ScanOptions<'_> {
    fn default() -> Self {
        Self {
            max_jump: DEFAULT_MAX_JUMP,
            max_cat: DEFAULT_MAX_CAT,
            aggregation: Aggregation::default(),
            site_url: DEFAULT_SITE_URL,
            progress: None,
        }
    }
}

/// Why a page did not count as a success.
#[derive(Debug)]
enum PageFailure {
    Request(ApiError),
    InvalidJson(ApiError),
    NoAds,
    /// First ad of the page is not a JSON object.
    MalformedAd,
}

/// Mutable state of one scan. Lives for the duration of [Scanner::run].
#[derive(Debug, Default)]
pub struct ScanState {
    pub current_id: u32,
    pub consecutive_failures: u32,
    /// Ads kept so far, each tagged with the category ID of the page it came from.
    pub accumulated: Vec<(u32, Ad)>,
}

impl ScanState {
    /// Keep the page's ads and reset the failure counter. Returns how many ads were kept.
    fn record_success(&mut self, ads: Vec<Ad>, aggregation: Aggregation) -> Result<usize, PageFailure> {
        let page = self.current_id;
        let kept = match aggregation {
            Aggregation::CollectAll => {
                let n = ads.len();
                self.accumulated.extend(ads.into_iter().map(|ad| (page, ad)));
                n
            }
            Aggregation::CollectFirst => {
                let first = ads.into_iter().next().ok_or(PageFailure::NoAds)?;
                if !first.0.is_object() {
                    return Err(PageFailure::MalformedAd);
                }
                self.accumulated.push((page, first));
                1
            }
        };
        self.consecutive_failures = 0;
        Ok(kept)
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }
}

/// Drives a [SearchApi] across the category ID range.
pub struct Scanner<'a, A: SearchApi + ?Sized> {
    api: &'a mut A,
}

impl<'a, A: SearchApi + ?Sized> Scanner<'a, A> {
    pub fn new(api: &'a mut A) -> Self {
        Self { api }
    }

    /// Scan and return the catalog. Never fails: page errors only count
    /// toward the early stop.
    pub fn run(&mut self, options: &ScanOptions<'_>) -> Vec<Category> {
        let state = self.scan(options);
        build_catalog(state.accumulated, options.aggregation)
    }

    fn scan(&mut self, options: &ScanOptions<'_>) -> ScanState {
        let max_jump = options.max_jump.max(1);
        let mut state = ScanState::default();
        tracing::info!(
            max_cat = options.max_cat,
            max_jump,
            aggregation = ?options.aggregation,
            "Scanning categories"
        );

        for id in 1..=options.max_cat {
            state.current_id = id;
            if let Some(cb) = options.progress {
                cb(id, options.max_cat);
            }
            let outcome = self
                .fetch_page(id, options.site_url)
                .and_then(|ads| state.record_success(ads, options.aggregation));
            match outcome {
                Ok(kept) => {
                    tracing::info!(category = id, kept, "Category page has ads");
                }
                Err(failure) => {
                    match &failure {
                        PageFailure::Request(e) => tracing::warn!(
                            category = id,
                            transport = e.is_transport(),
                            error = %e,
                            "Request error"
                        ),
                        PageFailure::InvalidJson(e) => {
                            tracing::warn!(category = id, error = %e, "Invalid JSON")
                        }
                        PageFailure::NoAds => tracing::warn!(category = id, "No ads found"),
                        PageFailure::MalformedAd => {
                            tracing::warn!(category = id, "First ad is not an object")
                        }
                    }
                    state.record_failure();
                    if state.consecutive_failures >= max_jump {
                        tracing::info!(
                            category = id,
                            "Stopped after {} consecutive failed pages",
                            max_jump
                        );
                        break;
                    }
                }
            }
        }
        state
    }

    fn fetch_page(&mut self, id: u32, site_url: &str) -> Result<Vec<Ad>, PageFailure> {
        let url = SearchQuery::category(id).to_url(site_url);
        let response = self.api.search(&url).map_err(PageFailure::Request)?;
        let payload = response.json().map_err(PageFailure::InvalidJson)?;
        ads_in(payload).ok_or(PageFailure::NoAds)
    }
}

/// Convenience wrapper: `Scanner::new(api).run(options)`.
pub fn scan_categories<A: SearchApi + ?Sized>(api: &mut A, options: &ScanOptions<'_>) -> Vec<Category> {
    Scanner::new(api).run(options)
}

/// The non-empty `ads` array of a search payload, if there is one.
fn ads_in(payload: Value) -> Option<Vec<Ad>> {
    let Value::Object(mut map) = payload else {
        return None;
    };
    match map.remove("ads")? {
        Value::Array(ads) if !ads.is_empty() => Some(ads.into_iter().map(Ad).collect()),
        _ => None,
    }
}

fn build_catalog(accumulated: Vec<(u32, Ad)>, aggregation: Aggregation) -> Vec<Category> {
    match aggregation {
        Aggregation::CollectAll => {
            let ads: Vec<Ad> = accumulated.into_iter().map(|(_, ad)| ad).collect();
            unique_categories(&ads)
        }
        Aggregation::CollectFirst => accumulated
            .iter()
            .map(|(page, ad)| first_ad_category(*page, ad))
            .collect(),
    }
}

/// Distinct categories across `ads`, sorted by ID. The first name seen for an
/// ID wins; ads without an ID are skipped.
pub fn unique_categories(ads: &[Ad]) -> Vec<Category> {
    let mut by_id: BTreeMap<i64, String> = BTreeMap::new();
    for ad in ads {
        let Some(id) = ad.category_id() else {
            continue;
        };
        by_id.entry(id).or_insert_with(|| {
            ad.category_name()
                .or_else(|| ad.category_label())
                .map(String::from)
                .unwrap_or_else(|| fallback_name(id))
        });
    }
    by_id
        .into_iter()
        .map(|(id, name)| Category::new(Some(id), name))
        .collect()
}

/// Catalog entry for the first ad of page `page`.
///
/// Only a missing field defaults to the page (`page`, `cat_<page>`). A present
/// but null or non-numeric `category_id` gives no ID; a present `category_name`
/// is kept as is, even when empty.
pub fn first_ad_category(page: u32, ad: &Ad) -> Category {
    let id = match ad.0.get("category_id") {
        None => Some(i64::from(page)),
        Some(_) => ad.category_id(),
    };
    let name = match ad.0.get("category_name") {
        None => fallback_name(i64::from(page)),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    };
    Category::new(id, name)
}
