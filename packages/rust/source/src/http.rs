//! HTTP source provider.

use std::net::IpAddr;
use std::sync::LazyLock;

use chrono::Utc;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use docpipe_shared::{DocpipeError, FetchConfig, Metadata, Result, content_hash};

use crate::{RawSource, SourceProvider};

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("docpipe/", env!("CARGO_PKG_VERSION"));

static H1_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("valid selector"));

/// Fetches source units over HTTP(S). `source_ref` is the page URL.
#[derive(Debug, Clone)]
pub struct HttpSourceProvider {
    client: Client,
    allow_private_hosts: bool,
}

impl HttpSourceProvider {
    /// Build a provider from the runtime fetch config.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(config.timeout)
            .build()
            .map_err(|e| DocpipeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            allow_private_hosts: config.allow_private_hosts,
        })
    }
}

impl SourceProvider for HttpSourceProvider {
    #[instrument(skip(self), fields(url = %source_ref))]
    async fn fetch(&self, source_ref: &str) -> Result<RawSource> {
        let url = Url::parse(source_ref)
            .map_err(|e| DocpipeError::validation(format!("invalid source URL {source_ref:?}: {e}")))?;

        if !self.allow_private_hosts && is_ssrf_target(&url) {
            return Err(DocpipeError::validation(format!(
                "refusing to fetch private or non-http target {url}"
            )));
        }

        debug!("fetching source");
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| DocpipeError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocpipeError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DocpipeError::Network(format!("{url}: body read failed: {e}")))?;

        let mut metadata = Metadata::new();
        metadata.insert("url".into(), url.as_str().into());
        metadata.insert("status_code".into(), status.as_u16().into());
        metadata.insert("content_len".into(), body.len().into());
        metadata.insert("raw_hash".into(), content_hash(&body).into());
        metadata.insert("fetched_at".into(), Utc::now().to_rfc3339().into());
        if let Some(title) = first_heading(&body) {
            metadata.insert("title".into(), title.into());
        }

        Ok(RawSource {
            content: body,
            metadata,
        })
    }
}

/// Text of the first `<h1>`, if any.
fn first_heading(body: &str) -> Option<String> {
    let doc = Html::parse_document(body);
    doc.select(&H1_SEL)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Whether a URL targets a non-HTTP scheme, a private address, or a local host name.
pub fn is_ssrf_target(url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return true;
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 carrier-grade NAT
                || (a == 100 && (b & 0xC0) == 64)
                || (a == 192 && b == 0 && c == 0)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn test_config() -> FetchConfig {
        FetchConfig {
            timeout: Duration::from_secs(5),
            max_redirects: 2,
            allow_private_hosts: true,
        }
    }

    #[test]
    fn ssrf_blocks_file_scheme() {
        let url = Url::parse("file:///etc/passwd").unwrap();
        assert!(is_ssrf_target(&url));
    }

    #[test]
    fn ssrf_blocks_private_and_loopback() {
        for raw in [
            "http://192.168.1.1/admin",
            "http://10.0.0.1/",
            "http://127.0.0.1:8080/",
            "http://[::1]/",
            "http://localhost:3000/api",
            "http://build.internal/",
        ] {
            let url = Url::parse(raw).unwrap();
            assert!(is_ssrf_target(&url), "{raw} should be blocked");
        }
    }

    #[test]
    fn ssrf_allows_public() {
        let url = Url::parse("https://docs.example.com/page").unwrap();
        assert!(!is_ssrf_target(&url));
    }

    #[tokio::test]
    async fn fetch_returns_body_and_metadata() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/v1.2.0/endpoint"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string("<html><body><h1> Endpoint </h1><p>GET /items</p></body></html>"),
            )
            .mount(&server)
            .await;

        let provider = HttpSourceProvider::new(&test_config()).unwrap();
        let source_ref = format!("{}/v1.2.0/endpoint", server.uri());
        let raw = provider.fetch(&source_ref).await.expect("fetch");

        assert!(raw.content.contains("GET /items"));
        assert_eq!(raw.metadata["status_code"], 200);
        assert_eq!(raw.metadata["title"], "Endpoint");
        assert_eq!(raw.metadata["url"], source_ref.as_str());
        assert_eq!(raw.metadata["raw_hash"], content_hash(&raw.content).as_str());
    }

    #[tokio::test]
    async fn fetch_reports_http_errors() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/missing"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let provider = HttpSourceProvider::new(&test_config()).unwrap();
        let err = provider
            .fetch(&format!("{}/missing", server.uri()))
            .await
            .expect_err("404 is an error");
        assert!(matches!(err, DocpipeError::Network(ref m) if m.contains("404")));
    }

    #[tokio::test]
    async fn fetch_refuses_private_hosts_by_default() {
        let config = FetchConfig {
            allow_private_hosts: false,
            ..test_config()
        };
        let provider = HttpSourceProvider::new(&config).unwrap();
        let err = provider
            .fetch("http://127.0.0.1:9/page")
            .await
            .expect_err("blocked");
        assert!(err.to_string().contains("refusing"));
    }

    #[tokio::test]
    async fn fetch_rejects_unparseable_refs() {
        let provider = HttpSourceProvider::new(&test_config()).unwrap();
        assert!(provider.fetch("not a url").await.is_err());
    }
}
