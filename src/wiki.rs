use crate::config::WikiConfig;
use crate::error::{LorevatError, Result};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// One page listed in a category
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CategoryMember {
    #[serde(default)]
    pub pageid: Option<u64>,
    #[serde(default)]
    pub ns: i64,
    pub title: String,
}

#[derive(Deserialize)]
struct CategoryMembersResponse {
    #[serde(default)]
    query: Option<CategoryMembersQuery>,
    #[serde(rename = "continue", default)]
    cont: Option<CategoryMembersContinue>,
}

#[derive(Deserialize)]
struct CategoryMembersQuery {
    #[serde(default)]
    categorymembers: Vec<CategoryMember>,
}

#[derive(Deserialize)]
struct CategoryMembersContinue {
    #[serde(default)]
    cmcontinue: Option<String>,
}

#[derive(Deserialize)]
struct ParseResponse {
    #[serde(default)]
    parse: Option<ParseData>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ParseData {
    #[serde(default)]
    sections: Vec<ParseSection>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    missing: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ParseSection {
    #[serde(default)]
    line: String,
    #[serde(default)]
    index: String,
}

/// Minimal MediaWiki client for Fandom-style wikis.
///
/// Lists category members (paginated), fetches rendered article HTML via the
/// REST endpoint, and pulls per-section plain text via the parse API. All
/// calls share one rate gate and retry transient failures (429/5xx, timeouts,
/// connection errors) with bounded exponential backoff. A 404 is a legitimate
/// "page does not exist" result, returned as `Ok(None)`.
pub struct WikiClient {
    client: Client,
    base_url: String,
    api_url: String,
    rest_url: String,
    max_retries: usize,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl WikiClient {
    pub fn new(config: &WikiConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| LorevatError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let min_interval = if config.rate_limit_rps > 0.0 {
            Duration::from_secs_f64(1.0 / config.rate_limit_rps)
        } else {
            Duration::ZERO
        };

        Ok(Self {
            client,
            api_url: format!("{}/api.php", base_url),
            rest_url: format!("{}/rest.php/v1", base_url),
            base_url,
            max_retries: config.max_retries.max(1),
            min_interval,
            last_request: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sleep until the minimum inter-request interval has elapsed.
    async fn respect_rate_limit(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let last = *self.last_request.lock().await;
        if let Some(last) = last {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
    }

    async fn mark_request(&self) {
        *self.last_request.lock().await = Some(Instant::now());
    }

    /// GET with rate limiting and retries on transient failures.
    ///
    /// Returns the final response for any non-transient status (including
    /// 404, which callers map to "not found" rather than an error).
    async fn get_with_retries(&self, url: &str, params: &[(&str, &str)]) -> Result<Response> {
        let mut last_err = String::new();

        for attempt in 1..=self.max_retries {
            self.respect_rate_limit().await;
            let result = self.client.get(url).query(params).send().await;
            self.mark_request().await;

            let backoff = Duration::from_secs_f64((0.6 * 2f64.powi(attempt as i32 - 1)).min(20.0));

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        last_err = format!("HTTP {}", status);
                        // No point sleeping after the last attempt
                        if attempt < self.max_retries {
                            log::warn!(
                                "Transient {} on GET {} (attempt {}/{}); backing off {:.1}s",
                                status,
                                url,
                                attempt,
                                self.max_retries,
                                backoff.as_secs_f64()
                            );
                            tokio::time::sleep(backoff).await;
                        }
                        continue;
                    }
                    return Ok(resp);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_err = e.to_string();
                    if attempt < self.max_retries {
                        log::warn!(
                            "Network error on GET {} (attempt {}/{}): {}; backing off {:.1}s",
                            url,
                            attempt,
                            self.max_retries,
                            e,
                            backoff.as_secs_f64()
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
                Err(e) => {
                    return Err(LorevatError::Fetch(format!("GET {} failed: {}", url, e)));
                }
            }
        }

        Err(LorevatError::Fetch(format!(
            "Failed after {} retries: {}",
            self.max_retries, last_err
        )))
    }

    /// Enumerate pages in a category, following `cmcontinue` pagination.
    ///
    /// `category_title` is the full wiki title, e.g. "Category:Books".
    /// `max_pages` is an optional hard cap for tests and dev runs.
    pub async fn category_members(
        &self,
        category_title: &str,
        max_pages: Option<usize>,
    ) -> Result<Vec<CategoryMember>> {
        let mut out: Vec<CategoryMember> = Vec::new();
        let mut cmcontinue: Option<String> = None;

        loop {
            let mut params: Vec<(&str, &str)> = vec![
                ("action", "query"),
                ("format", "json"),
                ("list", "categorymembers"),
                ("cmtitle", category_title),
                ("cmlimit", "500"),
                ("cmnamespace", "0"),
            ];
            if let Some(token) = cmcontinue.as_deref() {
                params.push(("cmcontinue", token));
            }

            let resp = self.get_with_retries(&self.api_url, &params).await?;
            let resp = resp
                .error_for_status()
                .map_err(|e| LorevatError::Fetch(format!("category_members: {}", e)))?;
            let data: CategoryMembersResponse = resp
                .json()
                .await
                .map_err(|e| LorevatError::Parse(format!("category_members response: {}", e)))?;

            if let Some(query) = data.query {
                out.extend(query.categorymembers);
            }

            if let Some(cap) = max_pages {
                if out.len() >= cap {
                    out.truncate(cap);
                    return Ok(out);
                }
            }

            match data.cont.and_then(|c| c.cmcontinue) {
                Some(token) => cmcontinue = Some(token),
                None => break,
            }
        }

        Ok(out)
    }

    /// Fetch rendered article HTML via REST.
    ///
    /// Returns `Ok(None)` if the page does not exist.
    pub async fn page_html(&self, title: &str) -> Result<Option<String>> {
        let url = format!("{}/page/{}/html", self.rest_url, urlencoding::encode(title));
        let resp = self.get_with_retries(&url, &[]).await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let resp = resp
            .error_for_status()
            .map_err(|e| LorevatError::Fetch(format!("page_html {}: {}", title, e)))?;
        let html = resp
            .text()
            .await
            .map_err(|e| LorevatError::Fetch(format!("page_html {} body: {}", title, e)))?;
        Ok(Some(html))
    }

    /// List `(heading text, section index)` pairs for a page, in document
    /// order.
    ///
    /// Returns `Ok(None)` for missing pages.
    pub async fn page_sections(&self, title: &str) -> Result<Option<Vec<(String, String)>>> {
        let params = [
            ("action", "parse"),
            ("page", title),
            ("prop", "sections"),
            ("format", "json"),
            ("formatversion", "2"),
        ];
        let resp = self.get_with_retries(&self.api_url, &params).await?;
        let resp = resp
            .error_for_status()
            .map_err(|e| LorevatError::Fetch(format!("page_sections {}: {}", title, e)))?;
        let data: ParseResponse = resp
            .json()
            .await
            .map_err(|e| LorevatError::Parse(format!("page_sections response: {}", e)))?;

        if data.error.is_some() {
            return Ok(None);
        }
        let parse = match data.parse {
            Some(p) if p.missing.is_none() => p,
            _ => return Ok(None),
        };

        let mut sections = Vec::new();
        for sec in parse.sections {
            let line = sec.line.trim();
            if !line.is_empty() && !sec.index.is_empty() {
                sections.push((line.to_string(), sec.index));
            }
        }
        Ok(Some(sections))
    }

    /// Fetch one section's rendered HTML and reduce it to plain text.
    ///
    /// Returns `Ok(None)` for missing pages or empty sections.
    pub async fn page_section_text(
        &self,
        title: &str,
        section_index: &str,
    ) -> Result<Option<String>> {
        let params = [
            ("action", "parse"),
            ("page", title),
            ("prop", "text"),
            ("section", section_index),
            ("format", "json"),
            ("formatversion", "2"),
        ];
        let resp = self.get_with_retries(&self.api_url, &params).await?;
        let resp = resp
            .error_for_status()
            .map_err(|e| LorevatError::Fetch(format!("page_section_text {}: {}", title, e)))?;
        let data: ParseResponse = resp
            .json()
            .await
            .map_err(|e| LorevatError::Parse(format!("page_section_text response: {}", e)))?;

        if data.error.is_some() {
            return Ok(None);
        }
        let html = match data.parse.filter(|p| p.missing.is_none()).and_then(|p| p.text) {
            Some(html) if !html.is_empty() => html,
            _ => return Ok(None),
        };

        let fragment = scraper::Html::parse_fragment(&html);
        let text = fragment
            .root_element()
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Some(text))
    }

    /// Normalize a wiki title to MediaWiki conventions: trim, underscores to
    /// spaces, first character uppercased.
    pub fn normalize_title(title: &str) -> String {
        let s = title.trim().replace('_', " ");
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => s,
        }
    }

    /// Build the canonical /wiki/<Title_With_Underscores> URL.
    pub fn canonical_url(base_url: &str, title: &str) -> String {
        let slug = title.replace(' ', "_");
        let encoded: String = slug
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/wiki/{}", base_url.trim_end_matches('/'), encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn test_client(base_url: &str, max_retries: usize) -> WikiClient {
        WikiClient::new(&WikiConfig {
            base_url: base_url.to_string(),
            user_agent: "lorevat/0.3 (test)".to_string(),
            timeout_secs: 5,
            max_retries,
            rate_limit_rps: 0.0, // no rate gate in tests
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_category_members_paginates() {
        let server = MockServer::start_async().await;

        let first = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api.php")
                    .query_param("list", "categorymembers")
                    .query_param_exists("cmtitle")
                    .matches(|req| {
                        !req.query_params
                            .as_ref()
                            .map(|qp| qp.iter().any(|(k, _)| k == "cmcontinue"))
                            .unwrap_or(false)
                    });
                then.status(200).json_body(json!({
                    "query": {"categorymembers": [
                        {"pageid": 1, "ns": 0, "title": "Teyvat"},
                        {"pageid": 2, "ns": 0, "title": "Mondstadt"}
                    ]},
                    "continue": {"cmcontinue": "page|next"}
                }));
            })
            .await;

        let second = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api.php")
                    .query_param("cmcontinue", "page|next");
                then.status(200).json_body(json!({
                    "query": {"categorymembers": [
                        {"pageid": 3, "ns": 0, "title": "Liyue"}
                    ]}
                }));
            })
            .await;

        let client = test_client(&server.base_url(), 2);
        let members = client
            .category_members("Category:Locations", None)
            .await
            .unwrap();

        assert_eq!(members.len(), 3);
        assert_eq!(members[2].title, "Liyue");
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_page_html_not_found_is_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest.php/v1/page/Nonexistent/html");
                then.status(404).body("not found");
            })
            .await;

        let client = test_client(&server.base_url(), 2);
        let html = client.page_html("Nonexistent").await.unwrap();
        assert!(html.is_none());
    }

    #[tokio::test]
    async fn test_transient_errors_exhaust_retries() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/rest.php/v1/page/Teyvat/html");
                then.status(503).body("busy");
            })
            .await;

        let client = test_client(&server.base_url(), 2);
        let start = Instant::now();
        let err = client.page_html("Teyvat").await.unwrap_err();
        assert!(matches!(err, LorevatError::Fetch(_)));
        assert_eq!(mock.hits_async().await, 2);
        // One 0.6s backoff between the attempts; no sleep after the last one
        // (which would add another 1.2s)
        assert!(
            start.elapsed() < Duration::from_millis(1100),
            "backed off after the final attempt"
        );
    }

    #[tokio::test]
    async fn test_page_sections_missing_page() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api.php").query_param("prop", "sections");
                then.status(200)
                    .json_body(json!({"error": {"code": "missingtitle"}}));
            })
            .await;

        let client = test_client(&server.base_url(), 2);
        let sections = client.page_sections("Gone").await.unwrap();
        assert!(sections.is_none());
    }

    #[tokio::test]
    async fn test_page_section_text_strips_markup() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api.php").query_param("prop", "text");
                then.status(200).json_body(json!({
                    "parse": {"text": "<div><p>Seven nations.</p><p>One sky.</p></div>"}
                }));
            })
            .await;

        let client = test_client(&server.base_url(), 2);
        let text = client.page_section_text("Teyvat", "1").await.unwrap().unwrap();
        assert!(text.contains("Seven nations."));
        assert!(text.contains("One sky."));
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(WikiClient::normalize_title(" archon_quest "), "Archon quest");
        assert_eq!(WikiClient::normalize_title("teyvat"), "Teyvat");
        assert_eq!(WikiClient::normalize_title(""), "");
    }

    #[test]
    fn test_canonical_url() {
        assert_eq!(
            WikiClient::canonical_url("https://wiki.example.org", "Hu Tao"),
            "https://wiki.example.org/wiki/Hu_Tao"
        );
        // Sub-pages keep their slash; unsafe characters are percent-encoded
        assert_eq!(
            WikiClient::canonical_url("https://wiki.example.org/", "Hu Tao/Profile"),
            "https://wiki.example.org/wiki/Hu_Tao/Profile"
        );
        assert_eq!(
            WikiClient::canonical_url("https://wiki.example.org", "Alchemy?"),
            "https://wiki.example.org/wiki/Alchemy%3F"
        );
    }
}
