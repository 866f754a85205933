use crate::util;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;
use scraper::Html;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

static H1_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static TITLE_CLASS_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[class*=\"title\"]").unwrap());
static LAZY_IMAGE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("lazy-image").unwrap());
static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());
static DESCRIPTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".introduction, .description, .synopsis, .summary, [class*=\"intro\"], [class*=\"desc\"]")
        .unwrap()
});
static PARAGRAPH_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static TAG_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".tag, .tags a, .label, [class*=\"genre\"] a, a[href*=\"/genre/\"]").unwrap()
});
static VOLUME_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".volume-title").unwrap());
static GOTO_CHAPTER_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.goto-chapter, a[href*=\"chapter_id=\"]").unwrap());

static UPDATE_DATE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"更新時間\s*[:：]?\s*(\d{4}[/.\-]\d{1,2}[/.\-]\d{1,2})").unwrap());
static STATUS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"更新至\s*第?\s*\d+\s*[集話话]").unwrap());
static EPISODE_NUMBER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*[集話话]").unwrap());
static CHAPTER_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"chapter_id=([A-Za-z0-9]+)").unwrap());
// "season N episode M" shortcut anchors duplicate the newest real episode.
static SEASON_SHORTCUT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\s*季\s*第?\s*\d+\s*[集話话]").unwrap());

/// Site chrome strings that disqualify an anchor as an episode.
const SKIP_WORDS: &[&str] = &["播放", "收藏", "分享", "舉報", "登入", "註冊"];

/// Extract the `chapter_id` query value from an episode href, when present.
pub fn chapter_id(href: &str) -> Option<&str> {
    Some(CHAPTER_ID_REGEX.captures(href)?.get(1)?.as_str())
}

/// One downloadable episode
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Episode {
    /// Episode ordinal, assigned when the title carries none
    pub number: u32,

    /// Raw display text of the episode link
    pub title: String,

    /// The link token, relative or absolute, may carry a chapter id
    pub href: String,
}

/// A named grouping of episodes, as grouped by the site
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Season {
    /// Season name, `全N集` when the site gives none
    pub name: String,

    /// Episodes, ascending by number
    pub episodes: Vec<Episode>,
}

/// Full metadata for one title
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnimeDetail {
    /// Display title
    pub title: String,

    /// Absolute cover image url
    pub image: String,

    /// Synopsis text, may be empty
    pub description: String,

    /// `YYYY/MM/DD`-form date string, may be empty
    pub update_date: String,

    /// Free-text airing status, may be empty
    pub status: String,

    /// Genre strings
    pub tags: Vec<String>,

    /// Seasons in document order
    pub seasons: Vec<Season>,

    /// Last non-empty path segment of the detail url
    pub cartoon_id: String,

    /// The absolute detail page url
    pub detail_url: Url,
}

impl AnimeDetail {
    /// Extract an [`AnimeDetail`] from Html.
    ///
    /// Extraction never fails: every field falls back to an empty value
    /// when its markup is missing or malformed.
    pub(crate) fn from_html(html: &Html, url: &Url) -> Self {
        let title = html
            .select(&H1_SELECTOR)
            .next()
            .or_else(|| html.select(&TITLE_CLASS_SELECTOR).next())
            .map(|el| util::collapse_whitespace(&el.text().collect::<String>()))
            .unwrap_or_default();

        let image = html
            .select(&LAZY_IMAGE_SELECTOR)
            .next()
            .and_then(|el| el.value().attr("src"))
            .or_else(|| {
                let img = html
                    .select(&IMG_SELECTOR)
                    .find(|el| el.value().attr("src").is_some_and(|src| src.contains("cover")))?;
                img.value().attr("data-src").or_else(|| img.value().attr("src"))
            })
            .map(util::normalize_image_url)
            .unwrap_or_default();

        let description = html
            .select(&DESCRIPTION_SELECTOR)
            .map(|el| util::collapse_whitespace(&el.text().collect::<String>()))
            .find(|text| !text.is_empty())
            .or_else(|| {
                html.select(&PARAGRAPH_SELECTOR)
                    .map(|el| util::collapse_whitespace(&el.text().collect::<String>()))
                    .find(|text| text.chars().count() > 50)
            })
            .unwrap_or_default();

        let page_text = html.root_element().text().collect::<String>();
        let update_date = UPDATE_DATE_REGEX
            .captures(&page_text)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let status = STATUS_REGEX
            .find(&page_text)
            .map(|m| util::collapse_whitespace(m.as_str()))
            .unwrap_or_default();

        let tags = html
            .select(&TAG_SELECTOR)
            .map(|el| util::collapse_whitespace(&el.text().collect::<String>()))
            .filter(|text| {
                let len = text.chars().count();
                (1..=14).contains(&len)
            })
            .collect();

        let cartoon_id = cartoon_id_from_url(url);

        let mut seasons = parse_grouped_seasons(html).unwrap_or_else(|| parse_flat_season(html));
        for season in seasons.iter_mut() {
            normalize_episode_numbers(&mut season.episodes);
        }

        Self {
            title,
            image,
            description,
            update_date,
            status,
            tags,
            seasons,
            cartoon_id,
            detail_url: url.clone(),
        }
    }
}

/// Last non-empty path segment, falling back to a raw string split.
fn cartoon_id_from_url(url: &Url) -> String {
    let from_segments = url
        .path_segments()
        .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
        .map(|segment| segment.to_string());
    match from_segments {
        Some(segment) => segment,
        None => url
            .as_str()
            .split('/')
            .filter(|token| !token.is_empty())
            .last()
            .unwrap_or_default()
            .to_string(),
    }
}

/// Grouped-season strategy: the first volume-title marker's parent is the
/// season container; headers close one season and open the next.
///
/// Returns `None` when the page has no volume-title container at all.
fn parse_grouped_seasons(html: &Html) -> Option<Vec<Season>> {
    let marker = html.select(&VOLUME_TITLE_SELECTOR).next()?;
    let container = ElementRef::wrap(marker.parent()?)?;

    let mut seasons = Vec::new();
    let mut name = String::new();
    let mut episodes = Vec::new();
    let mut seen_chapters = HashSet::new();

    for child in container.children().filter_map(ElementRef::wrap) {
        if child.value().classes().any(|class| class == "volume-title") {
            flush_season(&mut seasons, &name, std::mem::take(&mut episodes));
            name = util::collapse_whitespace(&child.text().collect::<String>());
            continue;
        }

        let link = if GOTO_CHAPTER_SELECTOR.matches(&child) {
            Some(child)
        } else {
            child.select(&GOTO_CHAPTER_SELECTOR).next()
        };
        let Some(link) = link else {
            continue;
        };
        if let Some(episode) = episode_from_anchor(link, &mut seen_chapters) {
            episodes.push(episode);
        }
    }
    flush_season(&mut seasons, &name, episodes);

    Some(seasons)
}

fn flush_season(seasons: &mut Vec<Season>, name: &str, episodes: Vec<Episode>) {
    if episodes.is_empty() {
        return;
    }
    let name = if name.is_empty() {
        format!("全{}集", episodes.len())
    } else {
        name.to_string()
    };
    seasons.push(Season { name, episodes });
}

/// Flat recovery strategy: every goto-chapter anchor on the page,
/// wrapped in a single synthetic season.
fn parse_flat_season(html: &Html) -> Vec<Season> {
    let mut seen_chapters = HashSet::new();
    let episodes: Vec<Episode> = html
        .select(&GOTO_CHAPTER_SELECTOR)
        .filter_map(|el| episode_from_anchor(el, &mut seen_chapters))
        .collect();

    if episodes.is_empty() {
        return Vec::new();
    }

    vec![Season {
        name: format!("全{}集", episodes.len()),
        episodes,
    }]
}

/// Extract one episode from a goto-chapter anchor.
///
/// Rejects chrome anchors, season shortcuts and chapter-id duplicates.
fn episode_from_anchor(el: ElementRef, seen_chapters: &mut HashSet<String>) -> Option<Episode> {
    let text = util::collapse_whitespace(&el.text().collect::<String>());
    if text.is_empty()
        || text.chars().count() < 2
        || SKIP_WORDS.iter().any(|word| text.contains(word))
    {
        return None;
    }

    let href = el.value().attr("href").unwrap_or_default().to_string();
    if let Some(chapter) = chapter_id(&href) {
        if !seen_chapters.insert(chapter.to_string()) {
            return None;
        }
    }

    if SEASON_SHORTCUT_REGEX.is_match(&text) {
        return None;
    }

    let number = EPISODE_NUMBER_REGEX
        .captures(&text)
        .and_then(|captures| captures.get(1)?.as_str().parse().ok())
        .unwrap_or(0);

    Some(Episode {
        number,
        title: text,
        href,
    })
}

/// Assign unresolved (zero) ordinals as previous-resolved + 1 in encounter
/// order, then sort ascending. Repairs episodes whose link text carried no
/// parseable ordinal.
fn normalize_episode_numbers(episodes: &mut Vec<Episode>) {
    let mut previous = 0;
    for episode in episodes.iter_mut() {
        if episode.number == 0 {
            episode.number = previous + 1;
        }
        previous = episode.number;
    }
    episodes.sort_by_key(|episode| episode.number);
}
