//! Marketplace search URLs: `https://<site>/recherche?category=<id>&...`.
//!
//! Filters are emitted in a fixed order (category, ad_type, urgent, owner_type,
//! sort, order) and omitted when unset, so the category scan produces plain
//! `recherche?category=<id>` URLs.

pub const DEFAULT_SITE_URL: &str = "https://www.leboncoin.fr";

/// Offer (default on the site) or demand listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdType {
    Offer,
    Demand,
}

/// Private sellers or professionals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerType {
    Private,
    Pro,
}

/// Result ordering. `Relevance` is the site default and is not written to the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Relevance,
    Time,
    Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// A search on the marketplace, as understood by the search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchQuery {
    pub category: Option<u32>,
    pub ad_type: Option<AdType>,
    pub urgent: bool,
    pub owner_type: Option<OwnerType>,
    pub sort: SortBy,
    pub order: Option<SortOrder>,
}

impl SearchQuery {
    /// Query for a single category with no other filters.
    pub fn category(id: u32) -> Self {
        Self {
            category: Some(id),
            ..Self::default()
        }
    }

    pub fn ad_type(mut self, ad_type: AdType) -> Self {
        self.ad_type = Some(ad_type);
        self
    }

    pub fn urgent(mut self, urgent: bool) -> Self {
        self.urgent = urgent;
        self
    }

    pub fn owner_type(mut self, owner: OwnerType) -> Self {
        self.owner_type = Some(owner);
        self
    }

    pub fn sort(mut self, sort: SortBy, order: Option<SortOrder>) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    /// Full search URL on `site` (scheme and host, e.g. `https://www.leboncoin.fr`).
    pub fn to_url(&self, site: &str) -> String {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(id) = self.category {
            params.push(("category", id.to_string()));
        }
        if let Some(t) = self.ad_type {
            let v = match t {
                AdType::Offer => "offer",
                AdType::Demand => "demand",
            };
            params.push(("ad_type", v.to_string()));
        }
        if self.urgent {
            params.push(("urgent", "1".to_string()));
        }
        if let Some(o) = self.owner_type {
            let v = match o {
                OwnerType::Private => "private",
                OwnerType::Pro => "pro",
            };
            params.push(("owner_type", v.to_string()));
        }
        match self.sort {
            SortBy::Relevance => {}
            SortBy::Time => params.push(("sort", "time".to_string())),
            SortBy::Price => params.push(("sort", "price".to_string())),
        }
        if let Some(order) = self.order {
            let v = match order {
                SortOrder::Asc => "asc",
                SortOrder::Desc => "desc",
            };
            params.push(("order", v.to_string()));
        }

        let base = format!("{}/recherche", site.trim_end_matches('/'));
        if params.is_empty() {
            return base;
        }
        let qs = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", base, qs)
    }
}
