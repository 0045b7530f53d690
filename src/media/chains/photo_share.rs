use super::{
    browser_headers, get_json, probe_api, ApiPayload, ChainContext, MultiEntryPolicy,
    PlatformChain,
};
use crate::media::attempt_log::Attempt;
use crate::media::error::{AcquireError, SourceError};
use crate::media::platform::Platform;
use crate::media::types::{AcquisitionRequest, AcquisitionResult};
use crate::utils::truncate;
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::HeaderMap;
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;
use url::Url;

const PREFIX: &str = "insta";
const EXTRACTOR_FORMAT: &str = "best[ext=mp4]/best";
const GRAPHQL_QUERY_HASH: &str = "d5d763b1e2acf209d62d22cf2957d710";
const CDN_MARKER: &str = "scontent";
/// Scraped CDN hits smaller than this are placeholders, not media.
const MIN_CDN_BYTES: u64 = 10 * 1024;

static SHORTCODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?:p|reel|reels|tv)/([A-Za-z0-9_-]+)").expect("shortcode pattern is valid")
});

static SHARED_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)window\._sharedData = (\{.*?\});</script>")
        .expect("shared data pattern is valid")
});

static CDN_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)"display_url":"(https?://[^"]+scontent[^"]+\.(?:jpg|jpeg)[^"]*)""#,
        r#"(?i)"display_resources":\[[^\]]*?"src":"(https?://[^"]+scontent[^"]+\.jpg[^"]*)""#,
        r#"(?i)"video_url":"(https?://[^"]+scontent[^"]+\.mp4[^"]*)""#,
        r#"(?i)"edge_sidecar_to_children":\{"edges":\[\{"node":\{"display_url":"(https?://[^"]+)""#,
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("cdn pattern is valid"))
    .collect()
});

/// Endpoints and timeouts of the photo-share chain.
#[derive(Debug, Clone)]
pub struct PhotoShareSources {
    pub apis: Vec<String>,
    /// Host serving post pages and the GraphQL endpoint.
    pub page_base: String,
    pub oembed_base: String,
    pub api_timeout: Duration,
    pub scrape_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PostMedia {
    Image(String),
    /// First image of a multi-image post.
    Carousel(String),
    Video(String),
}

/// Photo-share chain: ranked APIs, page scrape, GraphQL, oEmbed thumbnail,
/// then the generic extractor. The first structural match wins.
pub struct PhotoShareChain {
    ctx: ChainContext,
    sources: PhotoShareSources,
}

impl PhotoShareChain {
    pub fn new(ctx: ChainContext, sources: PhotoShareSources) -> Self {
        Self { ctx, sources }
    }

    async fn try_apis(&self, url: &str) -> Option<AcquisitionResult> {
        let log = &self.ctx.log;
        let headers = HeaderMap::new();

        for (index, api) in self.sources.apis.iter().enumerate() {
            let label = format!("API {}", index + 1);
            let source = truncate(api, 40);
            log.record(url, Attempt::new(&label, "probing").source(source));

            let outcome = match probe_api(&self.ctx.fetcher, api, url, self.sources.api_timeout).await
            {
                Ok(ApiPayload::Slideshow { images, .. }) => {
                    self.ctx.download_image(&images[0], PREFIX, &headers).await
                }
                Ok(ApiPayload::Photo(image)) => {
                    self.ctx.download_image(&image, PREFIX, &headers).await
                }
                Ok(ApiPayload::Video(video)) => {
                    self.ctx.download_video(&video, PREFIX, &headers).await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(result) => {
                    log.record(
                        url,
                        Attempt::new(&label, format!("{} OK", result.kind())).source(source),
                    );
                    return Some(result);
                }
                Err(e) => log.record(url, Attempt::new(&label, "FAIL").source(source).error(e)),
            }
        }
        None
    }

    fn page_url(&self, url: &str) -> String {
        match shortcode(url) {
            Some(code) => format!("{}/p/{}/", self.sources.page_base.trim_end_matches('/'), code),
            None => url.to_string(),
        }
    }

    async fn scrape_html(&self, url: &str) -> Result<AcquisitionResult, SourceError> {
        let log = &self.ctx.log;
        log.record(url, Attempt::new("Instagram HTML", "scraping..."));

        let headers = browser_headers();
        let response = self
            .ctx
            .fetcher
            .client()
            .get(self.page_url(url))
            .headers(headers.clone())
            .timeout(self.sources.scrape_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SourceError::Status(response.status()));
        }
        let html = response.text().await?;

        if let Some(media) = shared_data_media(&html) {
            let (label, outcome) = match &media {
                PostMedia::Image(image) => (
                    "JSON Image",
                    self.ctx.download_image(image, PREFIX, &headers).await,
                ),
                PostMedia::Carousel(image) => (
                    "Carousel IMG",
                    self.ctx.download_image(image, PREFIX, &headers).await,
                ),
                PostMedia::Video(video) => (
                    "JSON Video",
                    self.ctx.download_video(video, PREFIX, &headers).await,
                ),
            };
            match outcome {
                Ok(result) => {
                    log.record(url, Attempt::new(label, "OK"));
                    return Ok(result);
                }
                Err(e) => log.record(url, Attempt::new("JSON parse", "fail").error(e)),
            }
        }

        for media_url in cdn_urls(&html) {
            let is_image = media_url.contains(".jpg") || media_url.contains(".jpeg");
            let dest = self
                .ctx
                .new_path(PREFIX, if is_image { "jpg" } else { "mp4" });
            let path = match self
                .ctx
                .fetcher
                .fetch_at_least(&media_url, &dest, &headers, MIN_CDN_BYTES)
                .await
            {
                Ok(path) => path,
                Err(e) => {
                    debug!("CDN candidate {} failed: {}", truncate(&media_url, 60), e);
                    continue;
                }
            };

            let result = if is_image {
                AcquisitionResult::Image { path }
            } else {
                match self.ctx.normalizer.normalize(path).await {
                    Ok((path, size_bytes)) => AcquisitionResult::Video { path, size_bytes },
                    Err(e) => {
                        debug!("CDN video could not be normalized: {}", e);
                        continue;
                    }
                }
            };
            let status = if is_image { "IMAGE OK" } else { "VIDEO OK" };
            log.record(url, Attempt::new("HTML CDN", status).source(truncate(&media_url, 40)));
            return Ok(result);
        }

        Err(SourceError::Missing("media in page"))
    }

    async fn graphql(&self, url: &str) -> Result<AcquisitionResult, SourceError> {
        self.ctx.log.record(url, Attempt::new("GraphQL", "trying..."));
        let code = shortcode(url).ok_or(SourceError::Missing("shortcode"))?;

        let variables = json!({
            "shortcode": code,
            "child_index": 0,
            "fetch_comment_count": 3,
            "fetch_comment_cursor": "",
            "fetch_mutual": true,
        });
        let endpoint = Url::parse_with_params(
            &format!(
                "{}/graphql/query/",
                self.sources.page_base.trim_end_matches('/')
            ),
            &[
                ("query_hash", GRAPHQL_QUERY_HASH.to_string()),
                ("variables", variables.to_string()),
            ],
        )
        .map_err(|e| SourceError::Parse(e.to_string()))?;

        let headers = browser_headers();
        let body = get_json(
            &self.ctx.fetcher,
            endpoint.as_str(),
            &headers,
            self.sources.api_timeout,
        )
        .await?;
        let media = post_media(&body["data"]["shortcode_media"])
            .ok_or(SourceError::Missing("shortcode_media"))?;

        let (label, result) = match media {
            PostMedia::Image(image) | PostMedia::Carousel(image) => (
                "GraphQL IMG",
                self.ctx.download_image(&image, PREFIX, &headers).await?,
            ),
            PostMedia::Video(video) => (
                "GraphQL VID",
                self.ctx.download_video(&video, PREFIX, &headers).await?,
            ),
        };
        self.ctx.log.record(url, Attempt::new(label, "OK"));
        Ok(result)
    }

    async fn oembed(&self, url: &str) -> Result<AcquisitionResult, SourceError> {
        self.ctx.log.record(url, Attempt::new("oEmbed", "FINAL"));
        let endpoint = Url::parse_with_params(
            &format!(
                "{}/oembed/",
                self.sources.oembed_base.trim_end_matches('/')
            ),
            &[("url", url)],
        )
        .map_err(|e| SourceError::Parse(e.to_string()))?;

        let headers = HeaderMap::new();
        let body = get_json(
            &self.ctx.fetcher,
            endpoint.as_str(),
            &headers,
            self.sources.api_timeout,
        )
        .await?;
        let thumbnail = body["thumbnail_url"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or(SourceError::Missing("thumbnail_url"))?;

        let result = self.ctx.download_image(thumbnail, PREFIX, &headers).await?;
        self.ctx.log.record(url, Attempt::new("oEmbed THUMB", "OK"));
        Ok(result)
    }
}

#[async_trait]
impl PlatformChain for PhotoShareChain {
    fn platform(&self) -> Platform {
        Platform::PhotoShare
    }

    async fn acquire(
        &self,
        request: &AcquisitionRequest,
    ) -> Result<AcquisitionResult, AcquireError> {
        let url = request.url.as_str();
        let log = &self.ctx.log;
        self.ctx.prepare(request).await?;

        if let Some(result) = self.try_apis(url).await {
            return Ok(result);
        }

        match self.scrape_html(url).await {
            Ok(result) => return Ok(result),
            Err(e @ SourceError::Missing(_)) => {
                log.record(url, Attempt::new("HTML parse", "no media").error(e))
            }
            Err(e) => log.record(url, Attempt::new("HTML fetch", "ERR").error(e)),
        }

        match self.graphql(url).await {
            Ok(result) => return Ok(result),
            Err(e) => log.record(url, Attempt::new("GraphQL", "fail").error(e)),
        }

        match self.oembed(url).await {
            Ok(result) => return Ok(result),
            Err(e) => log.record(url, Attempt::new("oEmbed", "fail").error(e)),
        }

        let extractor = self.ctx.extractor.name();
        log.record(url, Attempt::new("Extractor", "fallback").source(extractor));
        match self
            .ctx
            .generic_fallback(url, EXTRACTOR_FORMAT, PREFIX, MultiEntryPolicy::FirstItem)
            .await
        {
            Ok(result) => {
                log.record(
                    url,
                    Attempt::new("Extractor", format!("{} OK", result.kind())).source(extractor),
                );
                Ok(result)
            }
            Err(e) => {
                log.record(url, Attempt::new("Extractor", "FAIL").source(extractor).error(e));
                Err(AcquireError::failed(Platform::PhotoShare))
            }
        }
    }
}

pub(crate) fn shortcode(url: &str) -> Option<String> {
    SHORTCODE_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Media of a `shortcode_media` node: single image, first carousel image, or video.
/// Image links off the CDN are ignored.
fn post_media(node: &Value) -> Option<PostMedia> {
    match node["__typename"].as_str() {
        Some("GraphImage") => node["display_url"]
            .as_str()
            .filter(|u| u.contains(CDN_MARKER))
            .map(|u| PostMedia::Image(u.to_string())),
        Some("GraphSidecar") => node["edge_sidecar_to_children"]["edges"][0]["node"]
            ["display_url"]
            .as_str()
            .filter(|u| u.contains(CDN_MARKER))
            .map(|u| PostMedia::Carousel(u.to_string())),
        _ => node["video_url"]
            .as_str()
            .map(|u| PostMedia::Video(u.to_string())),
    }
}

fn shared_data_media(html: &str) -> Option<PostMedia> {
    let blob = SHARED_DATA_RE.captures(html)?.get(1)?.as_str();
    let data: Value = serde_json::from_str(blob).ok()?;
    post_media(&data["entry_data"]["PostPage"][0]["graphql"]["shortcode_media"])
}

/// CDN media links found anywhere in the page, in pattern order, deduplicated.
fn cdn_urls(html: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for re in CDN_RES.iter() {
        for caps in re.captures_iter(html) {
            let Some(m) = caps.get(1) else { continue };
            let candidate = m.as_str().replace("\\u0026", "&").replace("\\/", "/");
            if candidate.contains(CDN_MARKER) && !urls.contains(&candidate) {
                urls.push(candidate);
            }
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::chains::tests::context;
    use crate::media::extractor::tests::{FakeExtractor, Script};
    use crate::media::normalize::tests::FakeTranscoder;
    use httpmock::prelude::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn chain(
        dir: &std::path::Path,
        server: &MockServer,
        apis: Vec<String>,
        extractor: Arc<FakeExtractor>,
    ) -> PhotoShareChain {
        let ctx = context(dir, extractor, Arc::new(FakeTranscoder::default()), 10_000_000);
        PhotoShareChain::new(
            ctx,
            PhotoShareSources {
                apis,
                page_base: server.base_url(),
                oembed_base: server.base_url(),
                api_timeout: Duration::from_secs(5),
                scrape_timeout: Duration::from_secs(5),
            },
        )
    }

    #[test]
    fn test_shortcode() {
        assert_eq!(
            shortcode("https://www.instagram.com/p/ABC12345678/").as_deref(),
            Some("ABC12345678")
        );
        assert_eq!(
            shortcode("https://instagram.com/reel/Cx_y-Z12345?igsh=1").as_deref(),
            Some("Cx_y-Z12345")
        );
        assert_eq!(shortcode("https://instagram.com/someone"), None);
    }

    #[test]
    fn test_shared_data_media() {
        let html = r#"<script>window._sharedData = {"entry_data":{"PostPage":[{"graphql":{"shortcode_media":{"__typename":"GraphSidecar","edge_sidecar_to_children":{"edges":[{"node":{"display_url":"https://scontent.example/1.jpg"}}]}}}}]}};</script>"#;
        assert_eq!(
            shared_data_media(html),
            Some(PostMedia::Carousel("https://scontent.example/1.jpg".into()))
        );
        assert_eq!(shared_data_media("<html></html>"), None);
    }

    #[test]
    fn test_post_media_video() {
        let node = json!({"__typename": "GraphVideo", "video_url": "https://scontent.example/v.mp4"});
        assert_eq!(
            post_media(&node),
            Some(PostMedia::Video("https://scontent.example/v.mp4".into()))
        );
        assert_eq!(post_media(&json!({})), None);
    }

    #[test]
    fn test_post_media_images_need_cdn_host() {
        let image = json!({"__typename": "GraphImage", "display_url": "https://other.example/1.jpg"});
        assert_eq!(post_media(&image), None);

        let html = r#"<script>window._sharedData = {"entry_data":{"PostPage":[{"graphql":{"shortcode_media":{"__typename":"GraphImage","display_url":"https://static.example/placeholder.jpg"}}}]}};</script>"#;
        assert_eq!(shared_data_media(html), None);

        let image = json!({"__typename": "GraphImage", "display_url": "https://scontent.example/1.jpg"});
        assert_eq!(
            post_media(&image),
            Some(PostMedia::Image("https://scontent.example/1.jpg".into()))
        );
    }

    #[test]
    fn test_cdn_urls_require_marker_and_unescape() {
        let html = r#"{"display_url":"https://scontent-a.example/v/t51/123.jpg?stp=1&x=2"}
            {"display_url":"https://other.example/v/123.jpg"}
            {"video_url":"https://scontent-b.example/o1/v.mp4"}"#;
        assert_eq!(
            cdn_urls(html),
            vec![
                "https://scontent-a.example/v/t51/123.jpg?stp=1&x=2".to_string(),
                "https://scontent-b.example/o1/v.mp4".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_html_cdn_image_after_failed_apis() {
        let server = MockServer::start_async().await;
        for i in 1..=5 {
            server
                .mock_async(|when, then| {
                    when.method(GET).path(format!("/api{}/", i));
                    then.status(500);
                })
                .await;
        }
        let image_url = server.url("/scontent/v/t51/post.jpg");
        let page = format!(
            r#"<html><script>{{"display_url":"{}"}}</script></html>"#,
            image_url
        );
        let page_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/p/ABC12345678/");
                then.status(200).body(page.as_str());
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/scontent/v/t51/post.jpg");
                then.status(200).body(vec![0xFFu8; 20 * 1024]);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let apis = (1..=5).map(|i| server.url(format!("/api{}/?url=", i))).collect();
        let extractor = Arc::new(FakeExtractor::new(Script::Fail));
        let chain = chain(dir.path(), &server, apis, extractor.clone());
        let url = "https://photoshare.example/p/ABC12345678";

        let result = chain
            .acquire(&AcquisitionRequest::new(url, Platform::PhotoShare))
            .await
            .unwrap();

        match &result {
            AcquisitionResult::Image { path } => {
                assert_eq!(std::fs::metadata(path).unwrap().len(), 20 * 1024)
            }
            other => panic!("expected image, got {:?}", other),
        }
        page_mock.assert_hits_async(1).await;
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);

        let records = chain.ctx.log.query(url);
        let failures = records
            .iter()
            .filter(|r| r.action.starts_with("API ") && r.status == "FAIL")
            .count();
        assert_eq!(failures, 5);
        let last = records.last().unwrap();
        assert_eq!(last.action, "HTML CDN");
        assert_eq!(last.status, "IMAGE OK");
    }

    #[tokio::test]
    async fn test_first_api_match_wins() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api1/");
                then.status(200).json_body(json!({
                    "code": 0,
                    "data": {"play": server.url("/media/reel.mp4")}
                }));
            })
            .await;
        let api2 = server
            .mock_async(|when, then| {
                when.method(GET).path("/api2/");
                then.status(200).json_body(json!({
                    "code": 0,
                    "data": {"images": [server.url("/media/1.jpg")]}
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/media/reel.mp4");
                then.status(200).body(vec![1u8; 2048]);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let apis = (1..=2).map(|i| server.url(format!("/api{}/?url=", i))).collect();
        let chain = chain(
            dir.path(),
            &server,
            apis,
            Arc::new(FakeExtractor::new(Script::Fail)),
        );

        let result = chain
            .acquire(&AcquisitionRequest::new(
                "https://www.instagram.com/reel/ABC12345678/",
                Platform::PhotoShare,
            ))
            .await
            .unwrap();

        assert!(matches!(result, AcquisitionResult::Video { size_bytes: 2048, .. }));
        api2.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_graphql_then_oembed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/p/ABC12345678/");
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/graphql/query/")
                    .query_param("query_hash", GRAPHQL_QUERY_HASH);
                then.status(200).json_body(json!({"data": {"shortcode_media": null}}));
            })
            .await;
        let oembed = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/oembed/")
                    .query_param("url", "https://www.instagram.com/p/ABC12345678/");
                then.status(200)
                    .json_body(json!({"thumbnail_url": server.url("/thumb.jpg")}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/thumb.jpg");
                then.status(200).body(vec![4u8; 512]);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let chain = chain(
            dir.path(),
            &server,
            Vec::new(),
            Arc::new(FakeExtractor::new(Script::Fail)),
        );
        let url = "https://www.instagram.com/p/ABC12345678/";

        let result = chain
            .acquire(&AcquisitionRequest::new(url, Platform::PhotoShare))
            .await
            .unwrap();

        assert!(matches!(result, AcquisitionResult::Image { .. }));
        oembed.assert_hits_async(1).await;
        let actions: Vec<_> = chain.ctx.log.query(url).into_iter().map(|r| r.action).collect();
        assert!(actions.contains(&"GraphQL".to_string()));
        assert_eq!(actions.last().map(String::as_str), Some("oEmbed THUMB"));
    }

    fn graphql_variables(code: &str) -> String {
        json!({
            "shortcode": code,
            "child_index": 0,
            "fetch_comment_count": 3,
            "fetch_comment_cursor": "",
            "fetch_mutual": true,
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_graphql_image() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/p/ABC12345678/");
                then.status(404);
            })
            .await;
        let graphql = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/graphql/query/")
                    .query_param("query_hash", GRAPHQL_QUERY_HASH)
                    .query_param("variables", graphql_variables("ABC12345678"));
                then.status(200).json_body(json!({
                    "data": {"shortcode_media": {
                        "__typename": "GraphImage",
                        "display_url": server.url("/scontent/img.jpg")
                    }}
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/scontent/img.jpg");
                then.status(200).body(vec![7u8; 1024]);
            })
            .await;
        let oembed = server
            .mock_async(|when, then| {
                when.method(GET).path("/oembed/");
                then.status(200).json_body(json!({"thumbnail_url": server.url("/thumb.jpg")}));
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let chain = chain(
            dir.path(),
            &server,
            Vec::new(),
            Arc::new(FakeExtractor::new(Script::Fail)),
        );
        let url = "https://www.instagram.com/p/ABC12345678/";

        let result = chain
            .acquire(&AcquisitionRequest::new(url, Platform::PhotoShare))
            .await
            .unwrap();

        match &result {
            AcquisitionResult::Image { path } => {
                assert_eq!(std::fs::metadata(path).unwrap().len(), 1024)
            }
            other => panic!("expected image, got {:?}", other),
        }
        graphql.assert_hits_async(1).await;
        oembed.assert_hits_async(0).await;

        let records = chain.ctx.log.query(url);
        let html_fetch = records.iter().filter(|r| r.action == "HTML fetch").count();
        assert_eq!(html_fetch, 1);
        let last = records.last().unwrap();
        assert_eq!(last.action, "GraphQL IMG");
        assert_eq!(last.status, "OK");
    }

    #[tokio::test]
    async fn test_shared_data_video() {
        let server = MockServer::start_async().await;
        let page = format!(
            r#"<html><script>window._sharedData = {{"entry_data":{{"PostPage":[{{"graphql":{{"shortcode_media":{{"__typename":"GraphVideo","video_url":"{}"}}}}}}]}}}};</script></html>"#,
            server.url("/scontent/v.mp4")
        );
        server
            .mock_async(|when, then| {
                when.method(GET).path("/p/ABC12345678/");
                then.status(200).body(page.as_str());
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/scontent/v.mp4");
                then.status(200).body(vec![3u8; 2048]);
            })
            .await;
        let graphql = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/graphql/query/")
                    .query_param("query_hash", GRAPHQL_QUERY_HASH)
                    .query_param("variables", graphql_variables("ABC12345678"));
                then.status(200).json_body(json!({"data": {"shortcode_media": null}}));
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let chain = chain(
            dir.path(),
            &server,
            Vec::new(),
            Arc::new(FakeExtractor::new(Script::Fail)),
        );
        let url = "https://www.instagram.com/reel/ABC12345678/";

        let result = chain
            .acquire(&AcquisitionRequest::new(url, Platform::PhotoShare))
            .await
            .unwrap();

        assert!(matches!(result, AcquisitionResult::Video { size_bytes: 2048, .. }));
        graphql.assert_hits_async(0).await;
        let last = chain.ctx.log.query(url).last().cloned().unwrap();
        assert_eq!(last.action, "JSON Video");
        assert_eq!(last.status, "OK");
    }

    #[tokio::test]
    async fn test_page_without_media_is_logged_once() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/p/ABC12345678/");
                then.status(200).body("<html><body>nothing here</body></html>");
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let chain = chain(
            dir.path(),
            &server,
            Vec::new(),
            Arc::new(FakeExtractor::new(Script::Fail)),
        );
        let url = "https://www.instagram.com/p/ABC12345678/";

        assert!(chain
            .acquire(&AcquisitionRequest::new(url, Platform::PhotoShare))
            .await
            .is_err());

        let page_failures: Vec<_> = chain
            .ctx
            .log
            .query(url)
            .into_iter()
            .filter(|r| r.action == "HTML parse" || r.action == "HTML fetch")
            .map(|r| (r.action, r.status))
            .collect();
        assert_eq!(
            page_failures,
            vec![("HTML parse".to_string(), "no media".to_string())]
        );
    }

    #[tokio::test]
    async fn test_extractor_output_remuxed_to_mp4() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            dir.path(),
            Arc::new(FakeExtractor::new(Script::Single {
                ext: "webm",
                bytes: 4096,
            })),
            Arc::new(FakeTranscoder {
                remux_ok: true,
                ..Default::default()
            }),
            10_000_000,
        );
        let chain = PhotoShareChain::new(
            ctx,
            PhotoShareSources {
                apis: Vec::new(),
                page_base: server.base_url(),
                oembed_base: server.base_url(),
                api_timeout: Duration::from_secs(5),
                scrape_timeout: Duration::from_secs(5),
            },
        );

        let result = chain
            .acquire(&AcquisitionRequest::new(
                "https://www.instagram.com/reel/ABC12345678/",
                Platform::PhotoShare,
            ))
            .await
            .unwrap();

        match result {
            AcquisitionResult::Video { path, size_bytes } => {
                assert_eq!(path.extension().unwrap(), "mp4");
                assert_eq!(size_bytes, 4096);
            }
            other => panic!("expected video, got {:?}", other),
        }
        let webm_left = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .any(|e| e.path().extension().is_some_and(|x| x == "webm"));
        assert!(!webm_left);
    }

    #[tokio::test]
    async fn test_everything_failing_is_platform_failure() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let chain = chain(
            dir.path(),
            &server,
            Vec::new(),
            Arc::new(FakeExtractor::new(Script::Fail)),
        );

        let err = chain
            .acquire(&AcquisitionRequest::new(
                "https://www.instagram.com/p/ABC12345678/",
                Platform::PhotoShare,
            ))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AcquireError::AcquisitionFailed {
                platform: Platform::PhotoShare
            }
        ));
    }
}
