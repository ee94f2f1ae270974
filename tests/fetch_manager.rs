//! Fetch manager integration tests
//!
//! Each test scripts a datastore with one claimable domain, serves the pages
//! from a wiremock server, runs the manager briefly, and asserts on the
//! recorded datastore writes and handler calls.

mod common;

use chrono::{TimeZone, Utc};
use common::{parse, run_fetcher, test_config, RecordingHandler, ScriptedDatastore};
use std::sync::Arc;
use std::time::Duration;
use trawler::storage::fnv1_64;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HTML_BODY: &str = r#"<!DOCTYPE html>
<html>
<head>
<title>Test norobots site</title>
</head>
<div id="menu">
    <a href="/dir1/">Dir1</a>
    <a href="/dir2/">Dir2</a>
    <a id="other" href="http://other.com/" title="stuff">Other</a>
</div>
</html>"#;

async fn mount_page(server: &MockServer, page_path: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_basic_fetch_without_robots() {
    let server = MockServer::start().await;
    let uri = server.uri();

    mount_page(&server, "/page1.html", 200, HTML_BODY).await;
    mount_page(&server, "/page2.html", 200, "<html></html>").await;
    mount_page(&server, "/page3.html", 200, "<html></html>").await;

    let datastore = Arc::new(ScriptedDatastore::new());
    datastore.script_host(
        "norobots.com",
        vec![
            parse(&format!("{}/page1.html", uri)),
            parse(&format!("{}/page2.html", uri)),
            parse(&format!("{}/page3.html", uri)),
        ],
    );
    let handler = Arc::new(RecordingHandler::new());

    run_fetcher(
        test_config(),
        datastore.clone(),
        handler.clone(),
        Duration::from_millis(800),
    )
    .await;

    let called = handler.called_urls();
    assert_eq!(called.len(), 3);
    for page in ["/page1.html", "/page2.html", "/page3.html"] {
        assert!(
            called.contains(&format!("{}{}", uri, page)),
            "handler missing {}",
            page
        );
    }

    let page1 = handler
        .calls()
        .into_iter()
        .find(|r| r.url.as_str().ends_with("/page1.html"))
        .unwrap();
    assert_eq!(page1.body.as_deref(), Some(HTML_BODY));

    let parsed = datastore.parsed_urls();
    let parsed_strings: Vec<String> = parsed.iter().map(|(u, _)| u.as_str().to_string()).collect();
    for expected in [
        format!("{}/dir1/", uri),
        format!("{}/dir2/", uri),
        "http://other.com/".to_string(),
    ] {
        assert!(parsed_strings.contains(&expected), "missing {}", expected);
    }
    for (_, source) in &parsed {
        assert_eq!(source.as_deref(), Some(format!("{}/page1.html", uri).as_str()));
    }

    assert_eq!(datastore.unclaimed(), vec!["norobots.com".to_string()]);
}

#[tokio::test]
async fn test_robots_crawl_delay_honored() {
    let server = MockServer::start().await;
    let uri = server.uri();

    mount_page(&server, "/robots.txt", 200, "User-agent: *\nCrawl-delay: 1\n").await;
    mount_page(&server, "/page4.html", 200, "<html></html>").await;
    mount_page(&server, "/page5.html", 200, "<html></html>").await;
    mount_page(&server, "/page6.html", 200, "<html></html>").await;

    let datastore = Arc::new(ScriptedDatastore::new());
    datastore.script_host(
        "robotsdelay1.com",
        vec![
            parse(&format!("{}/page4.html", uri)),
            parse(&format!("{}/page5.html", uri)),
            parse(&format!("{}/page6.html", uri)),
        ],
    );
    let handler = Arc::new(RecordingHandler::new());

    // With a one second delay between requests, only two of the three links
    // fit into this window
    run_fetcher(
        test_config(),
        datastore.clone(),
        handler.clone(),
        Duration::from_millis(1_500),
    )
    .await;

    assert_eq!(handler.calls().len(), 2, "crawl delay was not honored");
    assert_eq!(datastore.stored_results().len(), 2);
}

#[tokio::test]
async fn test_max_crawl_delay_caps_robots_delay() {
    let server = MockServer::start().await;
    let uri = server.uri();

    mount_page(
        &server,
        "/robots.txt",
        200,
        "User-agent: *\nCrawl-delay: 120\n",
    )
    .await;
    for page in ["/page1.html", "/page2.html", "/page3.html"] {
        mount_page(&server, page, 200, "<html></html>").await;
    }

    let datastore = Arc::new(ScriptedDatastore::new());
    datastore.script_host(
        "a.com",
        vec![
            parse(&format!("{}/page1.html", uri)),
            parse(&format!("{}/page2.html", uri)),
            parse(&format!("{}/page3.html", uri)),
        ],
    );
    let handler = Arc::new(RecordingHandler::new());

    let mut config = test_config();
    config.fetcher.max_crawl_delay_ms = 100;

    run_fetcher(
        config,
        datastore.clone(),
        handler.clone(),
        Duration::from_millis(1_000),
    )
    .await;

    // A 120 second Crawl-delay clamped to 100ms lets all three through
    assert_eq!(datastore.stored_results().len(), 3);
}

#[tokio::test]
async fn test_content_type_gate() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/accept_html.html"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><div id=\"menu\"></div></html>")
                .insert_header("content-type", "text/html; charset=ISO-8859-4"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/accept_text.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("plain text")
                .insert_header("content-type", "text/plain"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/donthandle"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("mystery bytes")
                .insert_header("content-type", "foo/bar"),
        )
        .mount(&server)
        .await;

    let datastore = Arc::new(ScriptedDatastore::new());
    datastore.script_host(
        "accept.com",
        vec![
            parse(&format!("{}/accept_html.html", uri)),
            parse(&format!("{}/accept_text.txt", uri)),
            parse(&format!("{}/donthandle", uri)),
        ],
    );
    let handler = Arc::new(RecordingHandler::new());

    run_fetcher(
        test_config(),
        datastore.clone(),
        handler.clone(),
        Duration::from_millis(800),
    )
    .await;

    let called = handler.called_urls();
    assert!(called.iter().any(|u| u.ends_with("/accept_html.html")));
    assert!(called.iter().any(|u| u.ends_with("/accept_text.txt")));
    assert!(
        !called.iter().any(|u| u.ends_with("/donthandle")),
        "handler must not see rejected content types"
    );

    // The rejection is still recorded, with its mime type
    let stored = datastore.stored_results();
    let expectations = [
        ("/accept_html.html", "text/html"),
        ("/accept_text.txt", "text/plain"),
        ("/donthandle", "foo/bar"),
    ];
    for (page, mime) in expectations {
        let result = stored
            .iter()
            .find(|r| r.url.as_str().ends_with(page))
            .unwrap_or_else(|| panic!("no stored result for {}", page));
        assert_eq!(result.mime_type.as_deref(), Some(mime), "mime for {}", page);
    }
}

#[tokio::test]
async fn test_redirect_chain_capture() {
    let server = MockServer::start().await;
    let uri = server.uri();
    let link = |index: u32| format!("{}/page{}.html", uri, index);

    Mock::given(method("GET"))
        .and(path("/page1.html"))
        .respond_with(ResponseTemplate::new(307).insert_header("location", link(2).as_str()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2.html"))
        .respond_with(ResponseTemplate::new(307).insert_header("location", link(3).as_str()))
        .mount(&server)
        .await;
    mount_page(&server, "/page3.html", 200, "<html>final</html>").await;

    let datastore = Arc::new(ScriptedDatastore::new());
    datastore.script_host("dom.com", vec![parse(&link(1))]);
    let handler = Arc::new(RecordingHandler::new());

    run_fetcher(
        test_config(),
        datastore.clone(),
        handler.clone(),
        Duration::from_millis(500),
    )
    .await;

    let calls = handler.calls();
    assert_eq!(calls.len(), 1);
    let result = &calls[0];

    // The result keeps the original request URL; the chain records the hops
    assert_eq!(result.url.as_str(), link(1));
    let hops: Vec<String> = result
        .redirected_from
        .iter()
        .map(|u| u.as_str().to_string())
        .collect();
    assert_eq!(hops, vec![link(2), link(3)]);
    assert_eq!(result.status, Some(200));
    assert_eq!(result.body.as_deref(), Some("<html>final</html>"));
}

#[tokio::test]
async fn test_meta_robots_directives() {
    let nofollow_html = r#"<html><head><meta name="ROBOTS" content="NoFollow"></head>
<div><a href="relative-dir/">link</a><a href="/abs.html">link</a></div></html>"#;
    let noindex_html =
        r#"<html><head><meta name="ROBOTS" content="noindex"></head><div></div></html>"#;
    let both_html = r#"<html><head><meta name="ROBOTS" content="noindeX, nofoLLow"></head>
<div><a href="/hidden.html">link</a></div></html>"#;

    let server = MockServer::start().await;
    let uri = server.uri();
    mount_page(&server, "/nofollow.html", 200, nofollow_html).await;
    mount_page(&server, "/noindex.html", 200, noindex_html).await;
    mount_page(&server, "/both.html", 200, both_html).await;

    let datastore = Arc::new(ScriptedDatastore::new());
    datastore.script_host(
        "t1.com",
        vec![
            parse(&format!("{}/nofollow.html", uri)),
            parse(&format!("{}/noindex.html", uri)),
            parse(&format!("{}/both.html", uri)),
        ],
    );
    let handler = Arc::new(RecordingHandler::new());

    let mut config = test_config();
    config.fetcher.honor_meta_noindex = true;
    config.fetcher.honor_meta_nofollow = true;

    run_fetcher(
        config,
        datastore.clone(),
        handler.clone(),
        Duration::from_millis(800),
    )
    .await;

    // noindex suppresses the handler, nofollow alone does not
    let called = handler.called_urls();
    assert_eq!(called.len(), 1, "only nofollow.html should reach the handler");
    assert!(called[0].ends_with("/nofollow.html"));

    // nofollow suppresses link storage entirely
    assert!(
        datastore.parsed_urls().is_empty(),
        "nofollow pages must store no links"
    );

    // All three fetches are still recorded
    assert_eq!(datastore.stored_results().len(), 3);
}

#[tokio::test]
async fn test_fnv_fingerprint_of_body() {
    let body = r#"<html><div>Roses are red, violets are blue.</div></html>"#;

    let server = MockServer::start().await;
    let uri = server.uri();
    mount_page(&server, "/page1.html", 200, body).await;

    let datastore = Arc::new(ScriptedDatastore::new());
    datastore.script_host("a.com", vec![parse(&format!("{}/page1.html", uri))]);
    let handler = Arc::new(RecordingHandler::new());

    run_fetcher(
        test_config(),
        datastore.clone(),
        handler.clone(),
        Duration::from_millis(500),
    )
    .await;

    let stored = datastore.stored_results();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].fnv_fingerprint, fnv1_64(body.as_bytes()));
}

#[tokio::test]
async fn test_if_modified_since_sent_and_304_recorded() {
    let last_crawled = Utc.with_ymd_and_hms(2024, 5, 4, 10, 30, 0).unwrap();
    let expected_header = "Sat, 04 May 2024 10:30:00 GMT";

    let server = MockServer::start().await;
    let uri = server.uri();

    // Only a request carrying the correctly formatted header gets the 304;
    // anything else falls through to a 500 so the assertion below fails
    Mock::given(method("GET"))
        .and(path("/page1.html"))
        .and(header("if-modified-since", expected_header))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page1.html"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let datastore = Arc::new(ScriptedDatastore::new());
    datastore.script_host(
        "a.com",
        vec![parse(&format!("{}/page1.html", uri)).with_last_crawled(last_crawled)],
    );
    let handler = Arc::new(RecordingHandler::new());

    run_fetcher(
        test_config(),
        datastore.clone(),
        handler.clone(),
        Duration::from_millis(500),
    )
    .await;

    let stored = datastore.stored_results();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, Some(304));
    assert!(stored[0].body.is_none());

    // A 304 is a completed exchange, so the handler still runs
    let calls = handler.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].status, Some(304));
}

#[tokio::test]
async fn test_nested_hosts_use_their_own_robots() {
    let ok_server = MockServer::start().await;
    let blocked_server = MockServer::start().await;

    mount_page(&ok_server, "/page1.html", 200, "<html></html>").await;
    mount_page(
        &blocked_server,
        "/robots.txt",
        200,
        "User-agent: *\nDisallow: /\n",
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/page1.html"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&blocked_server)
        .await;

    let ok_link = parse(&format!("{}/page1.html", ok_server.uri()));
    let blocked_link = parse(&format!("{}/page1.html", blocked_server.uri()));

    let datastore = Arc::new(ScriptedDatastore::new());
    datastore.script_host("dom.com", vec![ok_link.clone(), blocked_link.clone()]);
    let handler = Arc::new(RecordingHandler::new());

    run_fetcher(
        test_config(),
        datastore.clone(),
        handler.clone(),
        Duration::from_millis(800),
    )
    .await;

    let stored = datastore.stored_results();
    assert_eq!(stored.len(), 2);

    let ok_result = stored.iter().find(|r| r.url == ok_link).unwrap();
    assert_eq!(ok_result.status, Some(200));
    assert!(!ok_result.excluded_by_robots);

    let blocked_result = stored.iter().find(|r| r.url == blocked_link).unwrap();
    assert!(blocked_result.excluded_by_robots);
    assert_eq!(blocked_result.status, None);

    // Robots exclusion never reaches the handler
    assert_eq!(handler.calls().len(), 1);
    assert_eq!(handler.calls()[0].url, ok_link);
}

#[tokio::test]
async fn test_max_content_size() {
    let server = MockServer::start().await;
    let uri = server.uri();

    mount_page(&server, "/page1.html", 200, "a body well over ten bytes").await;
    mount_page(&server, "/page2.html", 200, "0123456789 ").await;

    let datastore = Arc::new(ScriptedDatastore::new());
    datastore.script_host(
        "a.com",
        vec![
            parse(&format!("{}/page1.html", uri)),
            parse(&format!("{}/page2.html", uri)),
        ],
    );
    let handler = Arc::new(RecordingHandler::new());

    let mut config = test_config();
    config.fetcher.max_content_size_bytes = 10;

    run_fetcher(
        config,
        datastore.clone(),
        handler.clone(),
        Duration::from_millis(800),
    )
    .await;

    assert!(
        handler.calls().is_empty(),
        "oversize bodies must not reach the handler"
    );

    let stored = datastore.stored_results();
    assert_eq!(stored.len(), 2);
    for result in &stored {
        assert_eq!(result.status, Some(200));
        assert!(result.body.is_none(), "no body may be stored for {}", result.url);
    }
}

#[tokio::test]
async fn test_fast_shutdown_mid_segment() {
    let server = MockServer::start().await;
    let uri = server.uri();
    mount_page(&server, "/page1.html", 200, "<html></html>").await;
    mount_page(&server, "/page2.html", 200, "<html></html>").await;

    let datastore = Arc::new(ScriptedDatastore::new());
    datastore.script_host(
        "test.com",
        vec![
            parse(&format!("{}/page1.html", uri)),
            parse(&format!("{}/page2.html", uri)),
        ],
    );
    let handler = Arc::new(RecordingHandler::new());

    let mut config = test_config();
    config.fetcher.default_crawl_delay_ms = 1_000;

    // Stop while the fetcher is still waiting out the delay before page2
    run_fetcher(
        config,
        datastore.clone(),
        handler.clone(),
        Duration::from_millis(200),
    )
    .await;

    let stored = datastore.stored_results();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].url.as_str().ends_with("/page1.html"));

    // The claim was released despite the early stop
    assert_eq!(datastore.unclaimed(), vec!["test.com".to_string()]);
}

#[tokio::test]
async fn test_private_ip_blacklist_skips_host() {
    let datastore = Arc::new(ScriptedDatastore::new());
    datastore.script_host("10.0.0.1", vec![parse("http://10.0.0.1/page1.html")]);
    let handler = Arc::new(RecordingHandler::new());

    let mut config = test_config();
    config.fetcher.blacklist_private_ips = true;

    run_fetcher(
        config,
        datastore.clone(),
        handler.clone(),
        Duration::from_millis(300),
    )
    .await;

    assert!(handler.calls().is_empty());
    assert!(datastore.stored_results().is_empty());
    assert!(
        datastore.links_queried().is_empty(),
        "the segment of a private host must never be read"
    );
    assert_eq!(datastore.unclaimed(), vec!["10.0.0.1".to_string()]);
}

#[tokio::test]
async fn test_exclude_patterns_filter_extracted_links() {
    let body = r#"<html><body><div id="menu">
        <a href="/foo/bar.html">yes</a>
        <a href="/foo/bar.mov">no</a>
        <a href="/foo/mov.bar">yes</a>
        <a href="/janky/page.html">no</a>
        <a href="/foo/janky.html">no</a>
        <a href="/foo/bang/baz.html">no</a>
        <a href="/root">no</a>
        <a href="/root/more">yes</a>
    </div></body></html>"#;

    let server = MockServer::start().await;
    let uri = server.uri();
    mount_page(&server, "/target.html", 200, body).await;

    let datastore = Arc::new(ScriptedDatastore::new());
    datastore.script_host("t1.com", vec![parse(&format!("{}/target.html", uri))]);
    let handler = Arc::new(RecordingHandler::new());

    let mut config = test_config();
    config.fetcher.exclude_link_patterns = vec![
        r"\.mov$".to_string(),
        "janky".to_string(),
        r"\/foo\/bang".to_string(),
        r"^\/root$".to_string(),
    ];

    run_fetcher(
        config,
        datastore.clone(),
        handler.clone(),
        Duration::from_millis(500),
    )
    .await;

    let mut parsed: Vec<String> = datastore
        .parsed_urls()
        .iter()
        .map(|(u, _)| u.request_uri())
        .collect();
    parsed.sort();
    assert_eq!(parsed, vec!["/foo/bar.html", "/foo/mov.bar", "/root/more"]);
}

#[tokio::test]
async fn test_filtered_segment_link_skipped_without_record() {
    let datastore = Arc::new(ScriptedDatastore::new());
    datastore.script_host("t1.com", vec![parse("http://t1.com/skipped/page.html")]);
    let handler = Arc::new(RecordingHandler::new());

    let mut config = test_config();
    config.fetcher.exclude_link_patterns = vec!["skipped".to_string()];

    run_fetcher(
        config,
        datastore.clone(),
        handler.clone(),
        Duration::from_millis(300),
    )
    .await;

    // Unlike a robots exclusion, a filtered link leaves no trace at all
    assert!(datastore.stored_results().is_empty());
    assert!(handler.calls().is_empty());
    assert_eq!(datastore.unclaimed(), vec!["t1.com".to_string()]);
}

#[tokio::test]
async fn test_transport_error_recorded_without_handler() {
    // Nothing listens on port 9; connection is refused immediately
    let datastore = Arc::new(ScriptedDatastore::new());
    datastore.script_host("t1.com", vec![parse("http://127.0.0.1:9/page1.html")]);
    let handler = Arc::new(RecordingHandler::new());

    run_fetcher(
        test_config(),
        datastore.clone(),
        handler.clone(),
        Duration::from_millis(800),
    )
    .await;

    let stored = datastore.stored_results();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].fetch_error.is_some());
    assert_eq!(stored[0].status, None);
    assert!(
        handler.calls().is_empty(),
        "transport failures must not reach the handler"
    );
    assert_eq!(datastore.unclaimed(), vec!["t1.com".to_string()]);
}

#[tokio::test]
async fn test_handler_called_for_error_statuses() {
    let server = MockServer::start().await;
    let uri = server.uri();
    mount_page(&server, "/gone.html", 404, "<html>not here</html>").await;

    let datastore = Arc::new(ScriptedDatastore::new());
    datastore.script_host("a.com", vec![parse(&format!("{}/gone.html", uri))]);
    let handler = Arc::new(RecordingHandler::new());

    run_fetcher(
        test_config(),
        datastore.clone(),
        handler.clone(),
        Duration::from_millis(500),
    )
    .await;

    // The exchange completed, so the handler sees the 404
    let calls = handler.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].status, Some(404));

    // No extraction happens for non-2xx responses
    assert!(datastore.parsed_urls().is_empty());
}
