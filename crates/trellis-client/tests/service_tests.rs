//! Service tests (relocated from the `service` module so they link a single
//! instance of `trellis-client` alongside the `trellis-test-utils`
//! dev-dependency).

use std::sync::Arc;

use trellis_client::{ClientConfig, TrellisClient};
use trellis_core::CoreError;
use trellis_test_utils::{MockEngine, MockHistory};

#[tokio::test]
async fn test_poll_failure_surfaces_as_retryable() {
    let mut engine = MockEngine::new();
    engine
        .expect_get_active_execution()
        .returning(|| Err(CoreError::Transport("channel down".to_string())));

    let mut client = TrellisClient::new(
        ClientConfig::default(),
        Arc::new(engine),
        Arc::new(MockHistory::new()),
    );

    let error = client.poll_now().await.unwrap_err();
    assert!(error.is_retryable());
    // Local state untouched by the failed poll
    assert!(client.active_execution().is_none());
}

#[tokio::test]
async fn test_reconnect_polls_exactly_once() {
    let mut engine = MockEngine::new();
    engine
        .expect_get_active_execution()
        .times(1)
        .returning(|| Ok(None));

    let mut client = TrellisClient::new(
        ClientConfig::default(),
        Arc::new(engine),
        Arc::new(MockHistory::new()),
    );

    client.on_reconnected().await.unwrap();
    assert!(client.active_execution().is_none());
}
