mod common;

use anyhow::{Context, Result};
use async_trait::async_trait;
use common::{GatedProvider, TokenCheckingTransport, eventually, meal_request};
use console_sync::domain::entities::MealRequest;
use console_sync::{
    CollectionHandle, Credential, CredentialError, CredentialProvider, FetchError, QueryFilter,
    QueryKey, RefreshPhase, SessionStatus, SyncConfig, SyncSession,
};
use mockall::mock;
use serde_json::json;
use std::sync::Arc;

mock! {
    pub Provider {}

    #[async_trait]
    impl CredentialProvider for Provider {
        async fn refresh(&self) -> Result<Credential, CredentialError>;
    }
}

fn key() -> QueryKey {
    QueryKey::first_page("meal-requests", QueryFilter::new())
}

fn page() -> Result<serde_json::Value> {
    Ok(json!({ "items": [serde_json::to_value(meal_request(1, 1))?], "total": 1 }))
}

fn spawn_refreshes(
    requests: &CollectionHandle<MealRequest>,
    callers: usize,
) -> Vec<tokio::task::JoinHandle<Result<console_sync::Snapshot<MealRequest>, FetchError>>> {
    (0..callers)
        .map(|_| {
            let requests = requests.clone();
            tokio::spawn(async move { requests.refresh(&key()).await })
        })
        .collect()
}

#[tokio::test]
async fn concurrent_unauthorized_requests_share_one_refresh() -> Result<()> {
    console_sync::init_logging();
    let provider = GatedProvider::issuing("fresh");
    let session = SyncSession::new(SyncConfig::default(), provider.clone())?;
    session.sign_in(Credential::new("stale")).await;
    let transport = TokenCheckingTransport::new("fresh", page()?);
    let requests: CollectionHandle<MealRequest> =
        session.collection("meal-requests", transport.clone());

    let tasks = spawn_refreshes(&requests, 5);
    assert!(eventually(|| std::future::ready(session.metrics().refresh_joins == 4)).await);
    assert_eq!(session.credentials().phase().await, RefreshPhase::RefreshInFlight);
    provider.gate.add_permits(1);

    for task in tasks {
        let snapshot = task.await??;
        assert_eq!(snapshot.total(), 1);
    }
    assert_eq!(provider.calls(), 1);
    assert_eq!(session.metrics().refreshes_started, 1);
    assert_eq!(session.credentials().phase().await, RefreshPhase::Idle);
    let current = session.credentials().current().await.context("credential stored")?;
    assert_eq!(current.token(), "fresh");
    assert_eq!(transport.requests.lock().await.len(), 10);
    Ok(())
}

#[tokio::test]
async fn failed_refresh_is_shared_and_requires_reauthentication() -> Result<()> {
    let provider = GatedProvider::failing(CredentialError::RefreshFailed("refresh token revoked".into()));
    let session = SyncSession::new(SyncConfig::default(), provider.clone())?;
    session.sign_in(Credential::new("stale")).await;
    let mut status = session.credentials().subscribe_status();
    let transport = TokenCheckingTransport::new("fresh", page()?);
    let requests: CollectionHandle<MealRequest> = session.collection("meal-requests", transport);

    let tasks = spawn_refreshes(&requests, 4);
    assert!(eventually(|| std::future::ready(session.metrics().refresh_joins == 3)).await);
    provider.gate.add_permits(1);

    for task in tasks {
        assert_eq!(task.await?, Err(FetchError::ReauthenticationRequired));
    }
    assert_eq!(provider.calls(), 1);
    assert!(session.credentials().current().await.is_none());
    status.changed().await?;
    assert_eq!(*status.borrow(), SessionStatus::ReauthenticationRequired);
    assert_eq!(session.status(), SessionStatus::ReauthenticationRequired);
    Ok(())
}

#[tokio::test]
async fn provider_error_surfaces_once_per_rejection() -> Result<()> {
    let mut provider = MockProvider::new();
    provider
        .expect_refresh()
        .times(1)
        .returning(|| Err(CredentialError::ReauthenticationRequired));
    let session = SyncSession::new(SyncConfig::default(), Arc::new(provider))?;
    session.sign_in(Credential::new("stale")).await;
    let requests: CollectionHandle<MealRequest> =
        session.collection("meal-requests", TokenCheckingTransport::new("fresh", page()?));

    let result = requests.refresh(&key()).await;

    assert_eq!(result, Err(FetchError::ReauthenticationRequired));
    assert_eq!(session.status(), SessionStatus::ReauthenticationRequired);
    Ok(())
}

#[tokio::test]
async fn disabled_retry_does_not_refresh() -> Result<()> {
    let mut provider = MockProvider::new();
    provider.expect_refresh().never();
    let mut config = SyncConfig::default();
    config.remote.retry_on_unauthorized = false;
    let session = SyncSession::new(config, Arc::new(provider))?;
    session.sign_in(Credential::new("stale")).await;
    let requests: CollectionHandle<MealRequest> =
        session.collection("meal-requests", TokenCheckingTransport::new("fresh", page()?));

    let result = requests.refresh(&key()).await;

    assert_eq!(result, Err(FetchError::ReauthenticationRequired));
    assert_eq!(session.status(), SessionStatus::Active);
    Ok(())
}

#[tokio::test]
async fn closed_session_never_refreshes() -> Result<()> {
    let mut provider = MockProvider::new();
    provider.expect_refresh().never();
    let session = SyncSession::new(SyncConfig::default(), Arc::new(provider))?;
    session.sign_in(Credential::new("fresh")).await;
    let transport = TokenCheckingTransport::new("fresh", page()?);
    let requests: CollectionHandle<MealRequest> =
        session.collection("meal-requests", transport.clone());
    requests.refresh(&key()).await?;

    session.close().await;
    let result = requests.refresh(&key()).await;

    assert_eq!(result, Err(FetchError::ReauthenticationRequired));
    assert_eq!(session.status(), SessionStatus::Closed);
    assert_eq!(transport.unauthorized_count().await, 1);
    Ok(())
}
