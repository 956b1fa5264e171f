use chrono::{TimeZone, Utc};
use history_ingestor::{
    models::commit::Commit,
    providers::{
        HistoryProvider, ProviderError,
        github_rest::{GithubConfig, GithubProvider},
    },
};
use httpmock::Method::GET;
use httpmock::MockServer;
use nonzero_ext::nonzero;
use secrecy::SecretString;
use serde_json::json;

fn provider_for(server: &MockServer, token: Option<&str>) -> GithubProvider {
    let config = GithubConfig {
        api_base: server.base_url(),
        owner: "NixOS".to_string(),
        repo: "nixpkgs".to_string(),
        requests_per_second: nonzero!(100u32),
    };
    GithubProvider::new(config, token.map(|t| SecretString::from(t.to_string())))
        .expect("build provider")
}

#[tokio::test]
async fn lists_commits_for_branch_until_time() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/repos/NixOS/nixpkgs/commits")
                .query_param("sha", "nixos-unstable")
                .query_param("until", "2024-05-06T00:00:00Z")
                .query_param("per_page", "30")
                .header("authorization", "Bearer ghp_test");
            then.status(200).json_body(json!([
                {
                    "sha": "a3f9c2e",
                    "commit": { "committer": { "date": "2024-05-05T21:13:07Z" } }
                },
                {
                    "sha": "77be0d1",
                    "commit": { "committer": null }
                }
            ]));
        })
        .await;

    let provider = provider_for(&server, Some("ghp_test"));
    let before = Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap();
    let got = provider
        .commits_until("nixos-unstable", before, 30)
        .await
        .expect("commits");

    mock.assert_async().await;
    assert_eq!(got, vec![Commit::new("a3f9c2e"), Commit::new("77be0d1")]);
}

#[tokio::test]
async fn anonymous_provider_sends_no_authorization() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/repos/NixOS/nixpkgs/commits")
                .header_missing("authorization");
            then.status(200).json_body(json!([]));
        })
        .await;

    let provider = provider_for(&server, None);
    let before = Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap();
    let got = provider
        .commits_until("nixos-unstable", before, 30)
        .await
        .expect("commits");

    mock.assert_async().await;
    assert!(got.is_empty());
}

#[tokio::test]
async fn retry_after_maps_to_rate_limited() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/NixOS/nixpkgs/commits");
            then.status(403)
                .header("retry-after", "2")
                .body("You have exceeded a secondary rate limit");
        })
        .await;

    let provider = provider_for(&server, None);
    let err = provider
        .commits_until("nixpkgs-unstable", Utc::now(), 30)
        .await
        .unwrap_err();

    match err {
        ProviderError::RateLimited { wait } => assert_eq!(wait.as_secs(), 2),
        other => panic!("expected rate limit, got {other}"),
    }
}

#[tokio::test]
async fn other_statuses_are_api_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/NixOS/nixpkgs/commits");
            then.status(422).body("No commit found for SHA: nixos-99.99");
        })
        .await;

    let provider = provider_for(&server, None);
    let err = provider
        .commits_until("nixos-99.99", Utc::now(), 30)
        .await
        .unwrap_err();

    match err {
        ProviderError::Api { status, message, .. } => {
            assert_eq!(status, 422);
            assert!(message.contains("nixos-99.99"));
        }
        other => panic!("expected api error, got {other}"),
    }
}

#[tokio::test]
async fn oversized_page_is_rejected_before_any_request() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(200).json_body(json!([]));
        })
        .await;

    let provider = provider_for(&server, None);
    let err = provider
        .commits_until("nixos-unstable", Utc::now(), 101)
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Validation { .. }));
    mock.assert_hits_async(0).await;
}
