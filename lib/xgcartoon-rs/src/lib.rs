mod client;
mod detail;
mod search_results;
mod util;

pub use self::client::Client;
pub use self::detail::chapter_id;
pub use self::detail::AnimeDetail;
pub use self::detail::Episode;
pub use self::detail::Season;
pub use self::search_results::SearchResult;
pub use self::search_results::SearchResults;
pub use self::util::decode_entities;
use once_cell::sync::Lazy;
use url::Url;

pub(crate) static BASE_URL: Lazy<Url> =
    Lazy::new(|| Url::parse("https://tw.xgcartoon.com/").unwrap());
pub(crate) static IMAGE_BASE_URL: Lazy<Url> =
    Lazy::new(|| Url::parse("https://static-a.xgcartoon.com/").unwrap());
pub(crate) const SEARCH_URL: &str = "https://tw.xgcartoon.com/search";

/// The maximum number of redirects the client will follow for one request.
pub(crate) const REDIRECT_LIMIT: usize = 10;

/// Make a site-relative link absolute against the site origin.
///
/// Handles already-absolute, protocol-relative and root-relative forms.
pub fn absolutize(href: &str) -> Option<Url> {
    crate::util::make_absolute(&BASE_URL, href)
}

/// The library error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A HTTP error
    #[error(transparent)]
    Reqwest(reqwest::Error),

    /// The request hit the fetch timeout
    #[error("request timed out")]
    Timeout,

    /// The server responded with a non-200, non-redirect status
    #[error("http status {0}")]
    HttpStatus(reqwest::StatusCode),

    /// A redirect chain exceeded [`REDIRECT_LIMIT`]
    #[error("exceeded the redirect limit of {REDIRECT_LIMIT}")]
    TooManyRedirects,

    /// A redirect response carried no usable `Location` header
    #[error("redirect response is missing a location header")]
    MissingLocation,

    /// A tokio join error
    #[error(transparent)]
    TokioJoin(#[from] tokio::task::JoinError),

    /// Failed to parse a url
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Reqwest(error)
        }
    }
}
