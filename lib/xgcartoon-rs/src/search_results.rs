use crate::util;
use crate::BASE_URL;
use once_cell::sync::Lazy;
use scraper::ElementRef;
use scraper::Html;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

static DETAIL_ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href*=\"/detail/\"]").unwrap());
static LAZY_IMAGE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("lazy-image").unwrap());
static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());
static TITLE_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [".title", ".video-title", ".name", "h3", "h4"]
        .iter()
        .map(|selector| Selector::parse(selector).unwrap())
        .collect()
});
static TAG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".tag, .tags span, .label").unwrap());
static AUTHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".author, .creator").unwrap());

/// Search results
#[derive(Debug)]
pub struct SearchResults {
    /// Entries in this result
    pub entries: Vec<SearchResult>,
}

impl SearchResults {
    /// Extract search results from Html.
    ///
    /// Anchors pointing at an already-seen detail url are dropped,
    /// first occurrence wins.
    pub(crate) fn from_html(html: &Html) -> Self {
        let mut seen: HashSet<Url> = HashSet::new();
        let mut entries = Vec::new();

        for anchor in html.select(&DETAIL_ANCHOR_SELECTOR) {
            let Some(entry) = SearchResult::from_element(anchor) else {
                continue;
            };
            if seen.insert(entry.detail_url.clone()) {
                entries.push(entry);
            }
        }

        Self { entries }
    }
}

/// One title found via search
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchResult {
    /// Display title
    pub title: String,

    /// Absolute cover image url
    pub image: String,

    /// Short genre/label strings
    pub tags: Vec<String>,

    /// Author name, empty when the card carries none
    pub author: String,

    /// Absolute detail page url
    pub detail_url: Url,
}

impl SearchResult {
    /// Extract a search result from a detail-page anchor.
    ///
    /// Returns `None` when the anchor has no usable href or title,
    /// the markup is chrome rather than a result card.
    fn from_element(el: ElementRef) -> Option<Self> {
        let href = el.value().attr("href")?;
        let detail_url = util::make_absolute(&BASE_URL, href)?;

        let image = el
            .select(&LAZY_IMAGE_SELECTOR)
            .next()
            .and_then(|el| el.value().attr("src"))
            .or_else(|| {
                let img = el.select(&IMG_SELECTOR).next()?;
                img.value().attr("data-src").or_else(|| img.value().attr("src"))
            })
            .map(util::normalize_image_url)
            .unwrap_or_default();

        let title = extract_title(el);

        let tags = el
            .select(&TAG_SELECTOR)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|text| !text.contains('\n'))
            .filter(|text| {
                let len = text.chars().count();
                len > 0 && len < 10
            })
            .collect();

        let author = el
            .select(&AUTHOR_SELECTOR)
            .next()
            .map(|el| util::collapse_whitespace(&el.text().collect::<String>()))
            .unwrap_or_default();

        if title.chars().count() <= 1 {
            return None;
        }

        Some(Self {
            title,
            image,
            tags,
            author,
            detail_url,
        })
    }
}

/// Probe the title candidates and keep the longest non-empty text.
///
/// Falls back to the longest anchor-text line longer than 2 chars.
fn extract_title(el: ElementRef) -> String {
    let best = TITLE_SELECTORS
        .iter()
        .filter_map(|selector| {
            let text = el.select(selector).next()?.text().collect::<String>();
            let text = util::collapse_whitespace(&text);
            (!text.is_empty()).then_some(text)
        })
        .max_by_key(|text| text.chars().count());
    if let Some(best) = best {
        return best;
    }

    el.text()
        .collect::<String>()
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() > 2)
        .max_by_key(|line| line.chars().count())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    const SEARCH_PAGE: &str = r#"
        <html><body>
            <div class="cartoon-list">
                <a href="/detail/yimu-zhilian">
                    <img data-src="//cdn.example/covers/yimu.jpg?a=1&amp;b=2" src="blank.gif"/>
                    <h3 class="title">異夢之戀</h3>
                    <span class="tag">戀愛</span>
                    <span class="tag">這個標籤字串實在太長不應該保留</span>
                    <div class="author">貓腻</div>
                </a>
                <a href="/detail/yimu-zhilian"><h3 class="title">異夢之戀</h3></a>
                <a href="https://tw.xgcartoon.com/detail/yimu-zhilian"><h3 class="title">異夢之戀</h3></a>
                <a href="/detail/short"><h3 class="title">短</h3></a>
                <a href="/detail/no-title-element">
                    更新至第12集
                    孤獨搖滾
                </a>
            </div>
        </body></html>
    "#;

    #[test]
    fn parse_search_page() {
        let html = Html::parse_document(SEARCH_PAGE);
        let results = SearchResults::from_html(&html);

        // 3 anchors collapse to 1 result, the 1-char title is rejected.
        assert_eq!(results.entries.len(), 2);

        let first = &results.entries[0];
        assert_eq!(first.title, "異夢之戀");
        assert_eq!(
            first.detail_url.as_str(),
            "https://tw.xgcartoon.com/detail/yimu-zhilian"
        );
        assert_eq!(first.image, "https://cdn.example/covers/yimu.jpg?a=1&b=2");
        assert_eq!(first.tags, vec!["戀愛".to_string()]);
        assert_eq!(first.author, "貓腻");

        // No title element: longest anchor-text line wins.
        let second = &results.entries[1];
        assert_eq!(second.title, "更新至第12集");
    }

    #[test]
    fn pretty_printed_tags_are_kept() {
        let html = Html::parse_document(
            r#"
            <a href="/detail/maoxian">
                <h3 class="title">冒險者物語</h3>
                <span class="tag">
                    冒險
                </span>
                <span class="tag">第一行
第二行</span>
            </a>
        "#,
        );
        let results = SearchResults::from_html(&html);

        // Surrounding markup whitespace is trimmed away; only a line
        // break inside the tag text disqualifies it.
        assert_eq!(results.entries[0].tags, vec!["冒險".to_string()]);
    }

    #[test]
    fn page_without_results_is_empty() {
        let html = Html::parse_document("<html><body><a href=\"/login\">登入</a></body></html>");
        let results = SearchResults::from_html(&html);
        assert!(results.entries.is_empty());
    }
}
