use crate::AnimeDetail;
use crate::Error;
use crate::SearchResults;
use crate::BASE_URL;
use crate::REDIRECT_LIMIT;
use crate::SEARCH_URL;
use reqwest::header::ACCEPT_ENCODING;
use reqwest::header::ACCEPT_LANGUAGE;
use reqwest::header::LOCATION;
use reqwest::StatusCode;
use scraper::Html;
use std::time::Duration;
use url::Url;

pub(crate) const USER_AGENT_VALUE: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT_LANGUAGE_VALUE: &str = "zh-TW,zh;q=0.9,en;q=0.8";
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// The xgcartoon client
#[derive(Debug, Clone)]
pub struct Client {
    /// The inner http client
    pub client: reqwest::Client,
}

impl Client {
    /// Make a new client.
    ///
    /// Redirects are followed manually in [`Self::get_text`]
    /// so `Location` resolution matches the site's relative forms.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT_VALUE)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("failed to build client");
        Self { client }
    }

    /// Fetch a url as text, following up to [`REDIRECT_LIMIT`] redirects.
    pub async fn get_text(&self, url: &str) -> Result<String, Error> {
        let mut url = Url::parse(url)?;

        for _ in 0..REDIRECT_LIMIT {
            let response = self
                .client
                .get(url.clone())
                .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
                .header(ACCEPT_ENCODING, "identity")
                .send()
                .await?;

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .ok_or(Error::MissingLocation)?;
                url = crate::util::resolve_location(&url, location)?;
                continue;
            }

            if status != StatusCode::OK {
                return Err(Error::HttpStatus(status));
            }

            return Ok(response.text().await?);
        }

        Err(Error::TooManyRedirects)
    }

    /// Get the url as html, then transform it
    async fn get_html<F, T>(&self, url: &str, transform: F) -> Result<T, Error>
    where
        F: FnOnce(Html) -> T + Send + 'static,
        T: Send + 'static,
    {
        let text = self.get_text(url).await?;
        Ok(tokio::task::spawn_blocking(move || {
            let html = Html::parse_document(&text);
            transform(html)
        })
        .await?)
    }

    /// Search with the given query.
    pub async fn search(&self, query: &str) -> Result<SearchResults, Error> {
        let url = Url::parse_with_params(SEARCH_URL, &[("keyword", query)])?;
        let results = self
            .get_html(url.as_str(), |html| SearchResults::from_html(&html))
            .await?;
        Ok(results)
    }

    /// Get the detail page for a title.
    ///
    /// The url may be relative to the site origin.
    pub async fn get_detail(&self, url: &str) -> Result<AnimeDetail, Error> {
        let url = crate::util::make_absolute(&BASE_URL, url).ok_or(Error::MissingLocation)?;
        let detail_url = url.clone();
        let detail = self
            .get_html(url.as_str(), move |html| {
                AnimeDetail::from_html(&html, &detail_url)
            })
            .await?;
        Ok(detail)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
