use async_trait::async_trait;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use reqwest::Client as HttpClient;
use url::Url;

use super::{ SearchError, SearchProvider };
use crate::models::chat::SearchResult;

pub const DEFAULT_BASE_URL: &str = "https://html.duckduckgo.com";
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

lazy_static! {
    static ref ANCHOR: Regex = Regex::new(r#"(?s)<a\b([^>]*)>(.*?)</a>"#).unwrap();
    static ref CLASS_ATTR: Regex = Regex::new(r#"class="([^"]*)""#).unwrap();
    static ref HREF_ATTR: Regex = Regex::new(r#"href="([^"]*)""#).unwrap();
    static ref TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref SPACES: Regex = Regex::new(r"\s+").unwrap();
}

/// Scrapes the no-JavaScript DuckDuckGo results page.
pub struct DuckDuckGoProvider {
    http: HttpClient,
    base_url: String,
}

impl DuckDuckGoProvider {
    pub fn new(base_url: Option<String>) -> Result<Self, SearchError> {
        let http = HttpClient::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    async fn search(
        &self,
        query: &str,
        max_results: usize
    ) -> Result<Vec<SearchResult>, SearchError> {
        let url = format!("{}/html/", self.base_url.trim_end_matches('/'));
        let resp = self.http.get(&url).query(&[("q", query)]).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SearchError::Status { status });
        }

        let page = resp.text().await?;
        let mut results = parse_results(&page);
        debug!("DuckDuckGo page parsed into {} result(s)", results.len());
        results.truncate(max_results);
        Ok(results)
    }
}

pub fn parse_results(page: &str) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = Vec::new();
    let mut current: Option<SearchResult> = None;

    for anchor in ANCHOR.captures_iter(page) {
        let attrs = &anchor[1];
        let class = CLASS_ATTR.captures(attrs)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        let mut classes = class.split_whitespace();

        if classes.clone().any(|c| c == "result__a") {
            if let Some(done) = current.take() {
                results.push(done);
            }
            let href = HREF_ATTR.captures(attrs)
                .map(|c| decode_entities(&c[1]))
                .unwrap_or_default();
            let Some(url) = resolve_link(&href) else {
                continue;
            };
            current = Some(SearchResult {
                title: clean_text(&anchor[2]),
                body: String::new(),
                url,
            });
        } else if classes.any(|c| c == "result__snippet") {
            if let Some(result) = current.as_mut() {
                result.body = clean_text(&anchor[2]);
            }
        }
    }

    if let Some(done) = current.take() {
        results.push(done);
    }
    results
}

/// Unwraps `//duckduckgo.com/l/?uddg=` redirects and drops ad links.
fn resolve_link(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    let parsed = Url::parse(&absolute).ok()?;

    if parsed.host_str().map(|h| h.ends_with("duckduckgo.com")).unwrap_or(false) {
        if parsed.path() == "/y.js" {
            return None;
        }
        return parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned());
    }

    Some(absolute)
}

fn clean_text(html: &str) -> String {
    let stripped = TAG.replace_all(html, "");
    let decoded = decode_entities(&stripped);
    SPACES.replace_all(decoded.trim(), " ").into_owned()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{ method, path, query_param };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    const PAGE: &str = r#"
<div class="result results_links result--ad">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="https://duckduckgo.com/y.js?ad_provider=x&amp;u3=1">Sponsored</a>
  </h2>
  <a class="result__snippet" href="https://duckduckgo.com/y.js?ad_provider=x">Buy now</a>
</div>
<div class="result results_links results_links_deep web-result">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Farxiv.org%2Fabs%2F1234.5678&amp;rut=abc">Quantum <b>Entanglement</b> Review</a>
  </h2>
  <a class="result__snippet" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Farxiv.org%2Fabs%2F1234.5678">A survey of <b>entanglement</b> &amp; non-locality.</a>
</div>
<div class="result results_links results_links_deep web-result">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="https://www.nature.com/articles/qe">Bell tests</a>
  </h2>
</div>
"#;

    #[test]
    fn parses_titles_snippets_and_links() {
        let results = parse_results(PAGE);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Quantum Entanglement Review");
        assert_eq!(results[0].body, "A survey of entanglement & non-locality.");
        assert_eq!(results[0].url, "https://arxiv.org/abs/1234.5678");
        assert_eq!(results[1].title, "Bell tests");
        assert_eq!(results[1].body, "");
        assert_eq!(results[1].url, "https://www.nature.com/articles/qe");
    }

    #[test]
    fn page_without_results_parses_empty() {
        assert!(parse_results("<html><body>No results.</body></html>").is_empty());
    }

    #[tokio::test]
    async fn fetches_and_caps_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/html/"))
            .and(query_param("q", "entanglement research paper scientific article scholarly"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let provider = DuckDuckGoProvider::new(Some(server.uri())).unwrap();
        let results = provider
            .search("entanglement research paper scientific article scholarly", 1).await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://arxiv.org/abs/1234.5678");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/html/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = DuckDuckGoProvider::new(Some(server.uri())).unwrap();
        let err = provider.search("anything", 5).await.unwrap_err();

        assert!(matches!(err, SearchError::Status { .. }));
    }
}
