use media_ingestion_application::change_feed::DEFAULT_FEED_TTL;
use media_ingestion_application::{
    CacheManager, ChangeFeedFetcher, DetailsSource, ProviderError, RateLimiter,
    RateLimiterError, WaitPolicy,
};
use media_ingestion_domain::ProviderKind;
use media_ingestion_infrastructure::providers::{
    HttpSettings, TmdbChangedIds, TmdbClient, TmdbConfig, TmdbDetails, TmdbMediaKind,
};
use media_ingestion_infrastructure::{InMemoryCacheStore, InMemoryRateLimiter};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn limiter(points: u32, policy: WaitPolicy) -> Arc<dyn RateLimiter> {
    let budget = ProviderKind::Tmdb
        .budget(points, Duration::from_secs(60))
        .expect("valid budget");
    Arc::new(InMemoryRateLimiter::new(budget, policy))
}

fn client(server: &MockServer, limiter: Arc<dyn RateLimiter>) -> Arc<TmdbClient> {
    let config = TmdbConfig {
        api_key: "test-key".to_string(),
        http: HttpSettings::default(),
    };
    Arc::new(TmdbClient::with_base_url(server.uri(), &config, limiter).expect("client"))
}

async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or(0)
}

#[tokio::test]
async fn tv_details_sends_api_key_and_credits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tv/1399"))
        .and(query_param("api_key", "test-key"))
        .and(query_param("append_to_response", "credits"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": 1399, "name": "Dark" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let details = TmdbDetails::new(
        client(&server, limiter(30, WaitPolicy::FailFast)),
        TmdbMediaKind::Tv,
    );
    let raw = details.fetch_details("1399").await.unwrap();

    assert_eq!(raw["name"], "Dark");
    assert_eq!(details.provider(), ProviderKind::Tmdb);
}

#[tokio::test]
async fn non_numeric_id_is_rejected_before_any_request() {
    let server = MockServer::start().await;
    let details = TmdbDetails::new(
        client(&server, limiter(30, WaitPolicy::FailFast)),
        TmdbMediaKind::Movie,
    );

    let err = details.fetch_details("tt0111161").await.unwrap_err();

    assert!(matches!(err, ProviderError::InvalidId(id) if id == "tt0111161"));
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn error_status_maps_to_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/movie/404"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let err = client(&server, limiter(30, WaitPolicy::FailFast))
        .movie_details(404)
        .await
        .unwrap_err();

    match err {
        ProviderError::Api { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, "not found");
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn exhausted_budget_fails_fast_without_sending() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/movie/603"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 603 })))
        .mount(&server)
        .await;

    let tmdb = client(&server, limiter(2, WaitPolicy::FailFast));
    tmdb.movie_details(603).await.unwrap();
    tmdb.movie_details(603).await.unwrap();
    let err = tmdb.movie_details(603).await.unwrap_err();

    assert!(matches!(
        err,
        ProviderError::RateLimit(RateLimiterError::RateLimitExceeded { .. })
    ));
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn search_multi_decodes_mixed_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/multi"))
        .and(query_param("query", "dune"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "page": 2,
            "total_pages": 3,
            "results": [
                { "id": 438631, "media_type": "movie", "title": "Dune" },
                { "id": 90228, "media_type": "tv", "name": "Dune: Prophecy" }
            ]
        })))
        .mount(&server)
        .await;

    let page = client(&server, limiter(30, WaitPolicy::FailFast))
        .search_multi("dune", 2)
        .await
        .unwrap();

    assert_eq!(page.total_pages, Some(3));
    assert_eq!(page.results.len(), 2);
    assert_eq!(page.results[1].name.as_deref(), Some("Dune: Prophecy"));
}

fn changes_page(ids: &[i64], total_pages: u32) -> ResponseTemplate {
    let results: Vec<_> = ids.iter().map(|id| json!({ "id": id, "adult": false })).collect();
    ResponseTemplate::new(200).set_body_json(json!({
        "page": 1,
        "results": results,
        "total_pages": total_pages,
    }))
}

#[tokio::test]
async fn change_feed_keeps_pages_read_before_a_failure() {
    let server = MockServer::start().await;
    for (page, ids) in [("1", vec![1, 2]), ("2", vec![2, 3])] {
        Mock::given(method("GET"))
            .and(path("/tv/changes"))
            .and(query_param("page", page))
            .respond_with(changes_page(&ids, 5))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/tv/changes"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let source = TmdbChangedIds::new(
        client(&server, limiter(30, WaitPolicy::FailFast)),
        TmdbMediaKind::Tv,
    );
    let cache = Arc::new(InMemoryCacheStore::new());
    let fetcher = ChangeFeedFetcher::new(CacheManager::new(cache.clone()), DEFAULT_FEED_TTL);

    let result = fetcher.fetch(source.feed_key(), &source).await.unwrap();

    assert_eq!(source.feed_key(), "tmdb:tvChangedIds");
    assert_eq!(result.ids, vec![1, 2, 3]);
    assert_eq!(result.pages_fetched, 2);
    assert!(!result.complete);
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn change_feed_stops_at_twenty_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/movie/changes"))
        .respond_with(changes_page(&[42], 40))
        .mount(&server)
        .await;

    let source = TmdbChangedIds::new(
        client(&server, limiter(30, WaitPolicy::FailFast)),
        TmdbMediaKind::Movie,
    );
    let fetcher = ChangeFeedFetcher::new(
        CacheManager::new(Arc::new(InMemoryCacheStore::new())),
        DEFAULT_FEED_TTL,
    );

    let result = fetcher.fetch(source.feed_key(), &source).await.unwrap();

    assert_eq!(result.ids, vec![42]);
    assert_eq!(result.pages_fetched, 20);
    assert!(result.complete);
    assert_eq!(request_count(&server).await, 20);
}
