//! Integration tests for session operations and event forwarding.

mod common;

use std::time::Duration;

use common::{eventually, fast_settings, manager_with, ready_manager};
use payterm_core::{CurrencyCode, PaymentRequest, PaymentStatus};
use payterm_device::{
    DeviceAmount, DeviceEvent, DeviceStatus, HostAuthorizationEvent, HostDecision,
    PaymentCompletedEvent,
};
use payterm_terminal::TerminalError;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_operations_fail_fast_when_not_initialized() {
    let (manager, handle) = manager_with(fast_settings(500, 500));

    assert!(matches!(
        manager.login(),
        Err(TerminalError::NotInitialized { operation: "login" })
    ));
    assert!(matches!(
        manager.start_session(),
        Err(TerminalError::NotInitialized { .. })
    ));
    assert!(matches!(
        manager.submit_payment(dec!(12.50), Some("DKK")),
        Err(TerminalError::NotInitialized { operation: "submit payment" })
    ));
    assert!(matches!(
        manager.end_session(),
        Err(TerminalError::NotInitialized { .. })
    ));

    assert_eq!(handle.created_count(), 0);
    assert!(handle.logins().is_empty());
    assert!(handle.sessions().is_empty());
    assert!(handle.payments().is_empty());
    assert_eq!(handle.sessions_ended(), 0);
}

#[tokio::test]
async fn test_submit_payment_after_failed_initialization() {
    let (manager, handle) = manager_with(fast_settings(20, 20));
    handle.set_default_init(payterm_device::mock::InitResponse::Silent);
    manager.initialize_terminal().wait().await;

    let result = manager.submit_payment(dec!(10), None);

    assert!(matches!(result, Err(TerminalError::NotInitialized { .. })));
    assert!(handle.payments().is_empty());
}

#[tokio::test]
async fn test_payment_amount_reaches_driver_exactly() {
    let (manager, handle) = ready_manager().await;

    let submission = manager.submit_payment(dec!(12.50), Some("DKK")).unwrap();

    let payments = handle.payments();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].total, DeviceAmount { mantissa: 1250, scale: 2 });
    assert_eq!(payments[0].total.to_decimal().unwrap(), dec!(12.50));
    assert_eq!(payments[0].total.to_string(), "12.50");
    assert_eq!(payments[0].currency, "DKK");
    assert_eq!(payments[0].payment_id, submission.payment_id);
    assert_eq!(submission.amount, dec!(12.50));
}

#[tokio::test]
async fn test_currency_defaults_to_configured_code() {
    let mut settings = fast_settings(500, 500);
    settings.default_currency = CurrencyCode::new("EUR").unwrap();
    let (manager, handle) = manager_with(settings);
    manager.initialize_terminal().wait().await;

    let submission = manager.submit_payment(dec!(99.95), None).unwrap();

    assert_eq!(submission.currency.as_str(), "EUR");
    assert_eq!(handle.payments()[0].currency, "EUR");
}

#[tokio::test]
async fn test_currency_is_normalized() {
    let (manager, handle) = ready_manager().await;

    manager.submit_payment(dec!(5), Some("sek")).unwrap();

    assert_eq!(handle.payments()[0].currency, "SEK");
}

#[tokio::test]
async fn test_invalid_payment_input_never_reaches_driver() {
    let (manager, handle) = ready_manager().await;

    for amount in [dec!(0), dec!(-1.00)] {
        assert!(matches!(
            manager.submit_payment(amount, None),
            Err(TerminalError::Validation(payterm_core::Error::InvalidAmount(_)))
        ));
    }
    assert!(matches!(
        manager.submit_payment(dec!(1), Some("DK")),
        Err(TerminalError::Validation(payterm_core::Error::InvalidCurrency(_)))
    ));

    assert!(handle.payments().is_empty());
}

#[tokio::test]
async fn test_payment_ids_are_unique() {
    let (manager, _handle) = ready_manager().await;

    let first = manager.submit_payment(dec!(1), None).unwrap();
    let second = manager.submit_payment(dec!(1), None).unwrap();

    assert_ne!(first.payment_id, second.payment_id);
}

#[tokio::test]
async fn test_rejected_payment_carries_driver_message() {
    let (manager, handle) = ready_manager().await;
    handle.set_payment_status(DeviceStatus::new(-12, "Card reader busy"));

    let error = manager.submit_payment(dec!(12.50), None).unwrap_err();

    match error {
        TerminalError::DeviceRejected { code, message, .. } => {
            assert_eq!(code, Some(-12));
            assert_eq!(message, "Card reader busy");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_login_uses_configured_username() {
    let (manager, handle) = ready_manager().await;

    manager.login().unwrap();

    assert_eq!(handle.logins()[0].username, "username");
}

#[tokio::test]
async fn test_login_rejected() {
    let (manager, handle) = ready_manager().await;
    handle.set_default_login(DeviceStatus::new(-3, "Invalid operator"));

    let error = manager.login().unwrap_err();

    assert!(matches!(
        error,
        TerminalError::DeviceRejected { operation: "login", code: Some(-3), .. }
    ));
    assert_eq!(error.to_string(), "login rejected by terminal: Invalid operator");
}

#[tokio::test]
async fn test_session_uses_default_currency() {
    let (manager, handle) = ready_manager().await;

    manager.start_session().unwrap();
    manager.end_session().unwrap();

    assert_eq!(handle.sessions()[0].currency, "DKK");
    assert_eq!(handle.sessions_ended(), 1);
}

#[tokio::test]
async fn test_session_rejections() {
    let (manager, handle) = ready_manager().await;
    handle.set_session_results(false, false);

    assert!(matches!(
        manager.start_session(),
        Err(TerminalError::DeviceRejected { operation: "start session", code: None, .. })
    ));
    assert!(matches!(
        manager.end_session(),
        Err(TerminalError::DeviceRejected { operation: "end session", .. })
    ));
}

#[tokio::test]
async fn test_initiate_payment_responses() {
    let (manager, _handle) = manager_with(fast_settings(500, 500));
    let request = PaymentRequest::new(dec!(12.50)).with_currency("DKK");

    let failed = manager.initiate_payment(&request);
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert!(failed.transaction_id.is_none());
    assert!(failed.message.contains("not initialized"));

    manager.initialize_terminal().wait().await;
    let processing = manager.initiate_payment(&request);
    assert_eq!(processing.status, PaymentStatus::Processing);
    assert!(processing.transaction_id.is_some());
}

#[tokio::test]
async fn test_teardown_failure_still_resets_readiness() {
    let (manager, handle) = ready_manager().await;
    handle.set_fail_teardown(true);

    let error = manager.tear_down().unwrap_err();

    assert!(matches!(error, TerminalError::DeviceFault { operation: "tear down", .. }));
    assert!(!manager.is_ready());
    assert!(matches!(
        manager.submit_payment(dec!(1), None),
        Err(TerminalError::NotInitialized { .. })
    ));

    // Nothing left to release.
    manager.tear_down().unwrap();
}

#[tokio::test]
async fn test_host_authorization_pass_through() {
    let (manager, handle) = ready_manager().await;

    handle.emit(DeviceEvent::HostAuthorization(HostAuthorizationEvent {
        status: DeviceStatus::success("Authorization requested"),
        total_amount: Some("12.50".to_string()),
    }));

    assert!(eventually(|| !handle.host_responses().is_empty()).await);
    let responses = handle.host_responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].authorization_code, "123456");
    assert_eq!(responses[0].decision, HostDecision::Authorized);
    assert_eq!(responses[0].emv_data.get("8A").map(String::as_str), Some("3030"));
    assert_eq!(responses[0].amount.to_decimal().unwrap(), dec!(12.50));
    drop(manager);
}

#[tokio::test]
async fn test_payment_completed_is_broadcast() {
    let (manager, handle) = ready_manager().await;
    let mut payments = manager.subscribe_payments();
    let submission = manager.submit_payment(dec!(12.50), None).unwrap();

    handle.emit(DeviceEvent::PaymentCompleted(PaymentCompletedEvent {
        status: DeviceStatus::success("Approved"),
        payment_id: submission.payment_id.clone(),
    }));

    let update = tokio::time::timeout(Duration::from_secs(1), payments.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.payment_id, submission.payment_id);
    assert_eq!(update.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_payment_status_follows_completion() {
    let (manager, handle) = ready_manager().await;
    let submission = manager.submit_payment(dec!(80.00), None).unwrap();

    let pending = manager.payment_status(&submission.payment_id);
    assert_eq!(pending.status, PaymentStatus::Processing);
    assert_eq!(pending.transaction_id.as_deref(), Some(submission.payment_id.as_str()));

    handle.emit(DeviceEvent::PaymentCompleted(PaymentCompletedEvent {
        status: DeviceStatus::new(-8, "Card declined"),
        payment_id: submission.payment_id.clone(),
    }));

    let settled = manager.payment_status(&submission.payment_id);
    assert_eq!(settled.status, PaymentStatus::Failed);
    assert_eq!(settled.message, "Card declined");
    assert_eq!(settled.transaction_id.as_deref(), Some(submission.payment_id.as_str()));
}

#[tokio::test]
async fn test_full_payment_session() {
    let (manager, handle) = manager_with(fast_settings(500, 500));
    handle.queue_init(payterm_device::mock::InitResponse::status(
        -30,
        "Device configuration required",
    ));

    manager.initialize_terminal().wait().await;
    manager.login().unwrap();
    manager.start_session().unwrap();
    manager.submit_payment(dec!(249.00), Some("DKK")).unwrap();
    manager.end_session().unwrap();
    manager.tear_down().unwrap();

    // One login from pairing, one explicit.
    assert_eq!(handle.logins().len(), 2);
    assert_eq!(handle.payments()[0].total.to_decimal().unwrap(), dec!(249.00));
    assert_eq!(handle.live_count(), 0);
    assert!(!manager.is_ready());
}
