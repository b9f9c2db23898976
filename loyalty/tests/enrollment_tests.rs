//! Enrollment and card deletion tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{Fixture, ada, config};
use futures::future::join_all;
use stampcard_core::error::StoreError;
use stampcard_core::ids::{ProgramId, UserId};
use stampcard_loyalty::model::{CodeReservation, EnrollmentGuard};
use stampcard_loyalty::{LoyaltyConfig, LoyaltyError, StampRequest, paths};
use stampcard_testing::Operation;
use std::collections::HashSet;

/// A fresh card has zero stamps, an in-range code, and a reservation and
/// guard that both point at it.
#[tokio::test]
async fn test_enroll_creates_card_reservation_and_guard() {
    let fx = Fixture::new(8).await;

    let card = fx.service.enroll(&ada(), "Ada", &fx.program.id).await.unwrap();

    assert_eq!(card.stamps, 0);
    assert!(!card.reward_claimed);
    assert_eq!(card.business_id, fx.business.id);
    let code: u32 = card.code.parse().unwrap();
    assert!((100..=999).contains(&code));

    let reservation: CodeReservation = serde_json::from_value(serde_json::Value::Object(
        fx.store
            .snapshot(&paths::code_reservation(&fx.business.id, &card.code))
            .unwrap(),
    ))
    .unwrap();
    assert_eq!(reservation.card_id, card.id);
    assert_eq!(reservation.customer_id, ada());

    let guard: EnrollmentGuard = serde_json::from_value(serde_json::Value::Object(
        fx.store
            .snapshot(&paths::enrollment_guard(&ada(), &fx.program.id))
            .unwrap(),
    ))
    .unwrap();
    assert_eq!(guard.card_id, card.id);
}

#[tokio::test]
async fn test_second_enrollment_is_rejected() {
    let fx = Fixture::new(8).await;
    fx.service.enroll(&ada(), "Ada", &fx.program.id).await.unwrap();

    let err = fx.service.enroll(&ada(), "Ada", &fx.program.id).await.unwrap_err();

    assert_eq!(
        err,
        LoyaltyError::AlreadyEnrolled {
            customer_id: ada(),
            program_id: fx.program.id.clone(),
        }
    );
    assert_eq!(fx.store.count(paths::CUSTOMER_CARDS), 1);
}

#[tokio::test]
async fn test_enroll_validates_program() {
    let fx = Fixture::new(8).await;

    let err = fx
        .service
        .enroll(&ada(), "Ada", &ProgramId::new("missing"))
        .await
        .unwrap_err();
    assert_eq!(err, LoyaltyError::ProgramNotFound(ProgramId::new("missing")));

    fx.service.deactivate_program(&fx.owner, &fx.program.id).await.unwrap();
    let err = fx.service.enroll(&ada(), "Ada", &fx.program.id).await.unwrap_err();
    assert_eq!(err, LoyaltyError::ProgramInactive(fx.program.id.clone()));
    assert!(fx.store.count(paths::CUSTOMER_CARDS) == 0);
}

/// Provider failures surface unchanged and are never retried.
#[tokio::test]
async fn test_permission_denied_is_not_retried() {
    let fx = Fixture::new(8).await;
    fx.store
        .fail_next(Operation::Commit, StoreError::PermissionDenied("rules".into()));

    let err = fx.service.enroll(&ada(), "Ada", &fx.program.id).await.unwrap_err();

    assert_eq!(err, LoyaltyError::Store(StoreError::PermissionDenied("rules".into())));
    assert_eq!(err.user_message(), "You don't have permission to do that.");
    assert!(!err.is_retryable());
    assert_eq!(fx.store.count(paths::CUSTOMER_CARDS), 0);
}

/// Every active card of a business holds a distinct code, even when the
/// code space is small and enrollments race for it.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enrollments_get_unique_codes() {
    let config = LoyaltyConfig {
        code_min: 1,
        code_max: 40,
        ..config()
    };
    let fx = Fixture::with_config(8, &config).await;
    let customers = 25;

    let handles = (0..customers).map(|i| {
        let service = fx.service.clone();
        let program_id = fx.program.id.clone();
        tokio::spawn(async move {
            service
                .enroll(&UserId::new(format!("customer-{i}")), "Customer", &program_id)
                .await
        })
    });
    let cards: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("enrollment failed"))
        .collect();

    let codes: HashSet<_> = cards.iter().map(|card| card.code.clone()).collect();
    assert_eq!(codes.len(), customers);
    assert_eq!(
        fx.store.count(&paths::code_reservations(&fx.business.id)),
        customers
    );
}

/// Concurrent enrollments of one customer in one program yield exactly one card.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enrollments_of_one_customer_create_one_card() {
    let fx = Fixture::new(8).await;
    let attempts = 8;

    let handles = (0..attempts).map(|_| {
        let service = fx.service.clone();
        let program_id = fx.program.id.clone();
        tokio::spawn(async move { service.enroll(&ada(), "Ada", &program_id).await })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let enrolled = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(enrolled, 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|err| matches!(err, LoyaltyError::AlreadyEnrolled { .. }))
    );
    assert_eq!(fx.store.count(paths::CUSTOMER_CARDS), 1);
    assert_eq!(fx.store.count(&paths::code_reservations(&fx.business.id)), 1);
}

#[tokio::test]
async fn test_exhausted_code_space_fails_cleanly() {
    let config = LoyaltyConfig {
        code_min: 7,
        code_max: 7,
        code_max_attempts: 3,
        ..config()
    };
    let fx = Fixture::with_config(8, &config).await;
    fx.service.enroll(&ada(), "Ada", &fx.program.id).await.unwrap();

    let err = fx
        .service
        .enroll(&UserId::new("grace"), "Grace", &fx.program.id)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        LoyaltyError::CodeGenerationExhausted {
            business_id: fx.business.id.clone(),
            attempts: 3,
        }
    );
    assert_eq!(fx.store.count(paths::CUSTOMER_CARDS), 1);
}

/// Deleting a card removes its events, reservation and guard, and frees its
/// code for the next customer.
#[tokio::test]
async fn test_delete_card_cascades_and_frees_code() {
    let config = LoyaltyConfig {
        code_min: 7,
        code_max: 7,
        code_max_attempts: 3,
        ..config()
    };
    let fx = Fixture::with_config(3, &config).await;
    let card = fx.service.enroll(&ada(), "Ada", &fx.program.id).await.unwrap();
    fx.service
        .add_stamps(StampRequest::for_card(&card).with_count(3))
        .await
        .unwrap();
    assert_eq!(fx.store.count(paths::STAMP_EVENTS), 3);

    fx.service.delete_card(&card.id).await.unwrap();

    assert_eq!(fx.store.count(paths::CUSTOMER_CARDS), 0);
    assert_eq!(fx.store.count(paths::STAMP_EVENTS), 0);
    assert!(fx.store.snapshot(&paths::code_reservation(&fx.business.id, "7")).is_none());
    assert!(fx.store.snapshot(&paths::enrollment_guard(&ada(), &fx.program.id)).is_none());

    let grace = fx
        .service
        .enroll(&UserId::new("grace"), "Grace", &fx.program.id)
        .await
        .unwrap();
    assert_eq!(grace.code, "7");
}

#[tokio::test]
async fn test_delete_card_requires_the_owner() {
    let fx = Fixture::new(3).await;
    let card = fx.service.enroll(&ada(), "Ada", &fx.program.id).await.unwrap();

    let err = fx.as_user(None).delete_card(&card.id).await.unwrap_err();
    assert_eq!(err, LoyaltyError::Unauthenticated);

    let mallory = UserId::new("mallory");
    let err = fx
        .as_user(Some(mallory.clone()))
        .delete_card(&card.id)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LoyaltyError::NotCardOwner {
            card_id: card.id.clone(),
            user_id: mallory,
        }
    );
    assert_eq!(fx.store.count(paths::CUSTOMER_CARDS), 1);
}
