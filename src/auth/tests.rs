//! Tests for the authentication core: tokens, activation codes, credentials

use super::activation::{
    generate_code, ActivationConfig, ActivationService, ActivationStore, CODE_LENGTH,
};
use super::jwt::TokenService;
use super::users::{
    Account, Argon2Hasher, AuthenticateRequest, RegisterRequest, UserService, UserStore,
};
use super::AuthError;
use crate::email::{testing::RecordingMailer, ActivationEmail, MailDispatcher};
use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const ACTIVATION_URL: &str = "http://localhost:4200/activate-account";

struct Harness {
    users: UserService,
    user_store: UserStore,
    activation: ActivationService,
    tokens: Arc<TokenService>,
    sent: Arc<Mutex<Vec<ActivationEmail>>>,
}

fn harness() -> Harness {
    harness_with(UserStore::memory(), 600)
}

fn harness_with(user_store: UserStore, activation_ttl_secs: i64) -> Harness {
    let mailer = Arc::new(RecordingMailer::default());
    let sent = mailer.sent.clone();
    let dispatcher = MailDispatcher::spawn(mailer);

    let tokens = Arc::new(TokenService::new(b"test-secret", 3600));
    let users = UserService::new(user_store.clone(), Arc::new(Argon2Hasher), tokens.clone());
    let activation = ActivationService::new(
        ActivationStore::memory(),
        user_store.clone(),
        dispatcher,
        ActivationConfig::new(activation_ttl_secs, ACTIVATION_URL.to_string()),
    );

    Harness {
        users,
        user_store,
        activation,
        tokens,
        sent,
    }
}

fn register_request() -> RegisterRequest {
    RegisterRequest {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: "ada@x.com".to_string(),
        password: "secret1".to_string(),
    }
}

async fn registered_account(harness: &Harness) -> Account {
    harness.users.register(register_request()).await.unwrap()
}

// --- Token codec ---

#[tokio::test]
async fn test_token_subject_round_trip() {
    let harness = harness();
    let account = registered_account(&harness).await;

    let claims = HashMap::from([("full_name".to_string(), json!("Ada Lovelace"))]);
    let token = harness.tokens.issue(claims, &account).unwrap();

    assert_eq!(harness.tokens.verify_subject(&token).unwrap(), "ada@x.com");
    assert!(harness.tokens.is_valid(&token, &account));

    // Extra claims survive the round trip
    let decoded = harness.tokens.decode(&token).unwrap();
    assert_eq!(decoded.extra["full_name"], json!("Ada Lovelace"));
}

#[tokio::test]
async fn test_security_context_carries_role_authorities() {
    let harness = harness();
    let account = registered_account(&harness).await;

    let context = super::SecurityContext::for_account(&account);
    assert_eq!(context.email, "ada@x.com");
    assert_eq!(context.display_name, "Ada Lovelace");
    assert!(context.has_authority("USER"));
    assert!(!context.has_authority("ADMIN"));
}

#[tokio::test]
async fn test_token_subject_must_match_candidate() {
    let harness = harness();
    let account = registered_account(&harness).await;

    let other = Account::new(
        "Grace".to_string(),
        "Hopper".to_string(),
        "grace@x.com".to_string(),
        "hash".to_string(),
        vec!["USER".to_string()],
    );

    let token = harness.tokens.issue(HashMap::new(), &account).unwrap();
    assert!(!harness.tokens.is_valid(&token, &other));
}

#[test]
fn test_token_fails_verification_under_different_key() {
    let signer = TokenService::new(b"key-one", 3600);
    let verifier = TokenService::new(b"key-two", 3600);

    let account = Account::new(
        "Ada".to_string(),
        "Lovelace".to_string(),
        "ada@x.com".to_string(),
        "hash".to_string(),
        vec![],
    );

    let token = signer.issue(HashMap::new(), &account).unwrap();
    assert!(matches!(
        verifier.verify_subject(&token),
        Err(AuthError::InvalidToken)
    ));
    assert!(!verifier.is_valid(&token, &account));
}

#[test]
fn test_expired_token_is_rejected() {
    // Expired well past the decoder's leeway window
    let tokens = TokenService::new(b"test-secret", -3600);

    let account = Account::new(
        "Ada".to_string(),
        "Lovelace".to_string(),
        "ada@x.com".to_string(),
        "hash".to_string(),
        vec![],
    );

    let token = tokens.issue(HashMap::new(), &account).unwrap();
    assert!(matches!(
        tokens.verify_subject(&token),
        Err(AuthError::TokenExpired)
    ));
    assert!(!tokens.is_valid(&token, &account));
}

#[test]
fn test_token_expiry_is_exact_inside_leeway_window() {
    // The decoder alone would still accept this token (60s leeway); the
    // explicit expiry check must not
    let tokens = TokenService::new(b"test-secret", -10);

    let account = Account::new(
        "Ada".to_string(),
        "Lovelace".to_string(),
        "ada@x.com".to_string(),
        "hash".to_string(),
        vec![],
    );

    let token = tokens.issue(HashMap::new(), &account).unwrap();
    assert!(matches!(
        tokens.verify_subject(&token),
        Err(AuthError::TokenExpired)
    ));
}

// --- Activation code generation ---

#[test]
fn test_code_shape_is_invariant() {
    for _ in 0..200 {
        let code = generate_code();
        assert_eq!(code.len(), CODE_LENGTH);
        assert!(code.bytes().all(|b| b.is_ascii_digit()));
    }
}

#[test]
fn test_codes_are_uniform_over_digits() {
    // Chi-square over every digit position of a large sample; 9 degrees of
    // freedom put the 1e-6 quantile near 43, so 50 keeps the test stable
    // while still catching a biased generator
    let samples = 2000;
    let mut counts = [0usize; 10];

    for _ in 0..samples {
        for b in generate_code().bytes() {
            counts[(b - b'0') as usize] += 1;
        }
    }

    let total = (samples * CODE_LENGTH) as f64;
    let expected = total / 10.0;
    let chi_square: f64 = counts
        .iter()
        .map(|&count| {
            let delta = count as f64 - expected;
            delta * delta / expected
        })
        .sum();

    assert!(
        chi_square < 50.0,
        "chi-square statistic {} too large for uniform digits",
        chi_square
    );
}

// --- Activation workflow ---

#[tokio::test]
async fn test_validation_enables_account_and_stamps_code() {
    let harness = harness();
    let account = registered_account(&harness).await;
    assert!(!account.enabled);

    let code = harness
        .activation
        .issue(&account.id, &account.email, &account.full_name())
        .await
        .unwrap();

    harness.activation.validate(&code).await.unwrap();

    let account = harness
        .user_store
        .find_by_id(&account.id)
        .await
        .unwrap()
        .unwrap();
    assert!(account.enabled);

    let saved = harness.activation.store().find(&code).await.unwrap().unwrap();
    assert!(saved.validated_at.is_some());
}

#[tokio::test]
async fn test_revalidation_is_idempotent() {
    let harness = harness();
    let account = registered_account(&harness).await;

    let code = harness
        .activation
        .issue(&account.id, &account.email, &account.full_name())
        .await
        .unwrap();

    harness.activation.validate(&code).await.unwrap();
    let first_stamp = harness
        .activation
        .store()
        .find(&code)
        .await
        .unwrap()
        .unwrap()
        .validated_at
        .unwrap();

    // A second validation of the same unexpired code succeeds without
    // re-running the enable path or touching the timestamp
    harness.activation.validate(&code).await.unwrap();
    let second_stamp = harness
        .activation
        .store()
        .find(&code)
        .await
        .unwrap()
        .unwrap()
        .validated_at
        .unwrap();

    assert_eq!(first_stamp, second_stamp);
    assert_eq!(
        harness
            .activation
            .store()
            .codes_for_account(&account.id)
            .await
            .unwrap()
            .len(),
        1,
        "no replacement code should be issued"
    );
}

#[tokio::test]
async fn test_expired_code_reissues_and_never_enables() {
    let harness = harness();
    let account = registered_account(&harness).await;

    // Plant a code that expired a minute ago
    let expired = "123456";
    harness
        .activation
        .store()
        .insert(super::activation::ActivationCode {
            code: expired.to_string(),
            account_id: account.id.clone(),
            created_at: Utc::now() - Duration::minutes(11),
            expires_at: Utc::now() - Duration::minutes(1),
            validated_at: None,
        })
        .await
        .unwrap();

    let result = harness.activation.validate(expired).await;
    assert!(matches!(result, Err(AuthError::CodeExpired)));

    // The account was not enabled, and exactly one replacement exists
    let account = harness
        .user_store
        .find_by_id(&account.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!account.enabled);

    let codes = harness
        .activation
        .store()
        .codes_for_account(&account.id)
        .await
        .unwrap();
    assert_eq!(codes.len(), 2);
    let replacement = codes
        .iter()
        .find(|c| c.code != expired)
        .expect("a replacement code should exist");
    assert!(!replacement.is_expired());

    // The original code never becomes valid retroactively
    let result = harness.activation.validate(expired).await;
    assert!(result.is_err());
    let account = harness
        .user_store
        .find_by_id(&account.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!account.enabled);
}

#[tokio::test]
async fn test_issue_dispatches_activation_email() {
    let harness = harness();
    let account = registered_account(&harness).await;

    let code = harness
        .activation
        .issue(&account.id, &account.email, &account.full_name())
        .await
        .unwrap();

    // Delivery happens on the background worker
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let sent = harness.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ada@x.com");
    assert_eq!(sent[0].recipient_name, "Ada Lovelace");
    assert_eq!(sent[0].activation_code, code);
    assert_eq!(sent[0].activation_url, ACTIVATION_URL);
}

#[tokio::test]
async fn test_email_failure_does_not_roll_back_the_code() {
    let user_store = UserStore::memory();
    let activation = ActivationService::new(
        ActivationStore::memory(),
        user_store.clone(),
        MailDispatcher::disconnected(),
        ActivationConfig::new(600, ACTIVATION_URL.to_string()),
    );

    let account = Account::new(
        "Ada".to_string(),
        "Lovelace".to_string(),
        "ada@x.com".to_string(),
        "hash".to_string(),
        vec!["USER".to_string()],
    );
    user_store.insert_account(account.clone()).await.unwrap();

    let result = activation
        .issue(&account.id, &account.email, &account.full_name())
        .await;
    assert!(matches!(result, Err(AuthError::EmailDelivery)));

    // The code was persisted before the dispatch failed and still works
    let codes = activation.store().codes_for_account(&account.id).await.unwrap();
    assert_eq!(codes.len(), 1);

    activation.validate(&codes[0].code).await.unwrap();
    let account = user_store.find_by_id(&account.id).await.unwrap().unwrap();
    assert!(account.enabled);
}

#[tokio::test]
async fn test_unknown_code_is_not_found() {
    let harness = harness();
    let result = harness.activation.validate("000000").await;
    assert!(matches!(result, Err(AuthError::CodeNotFound)));
}

// --- Registration and credential authentication ---

#[tokio::test]
async fn test_registration_requires_seeded_role_catalog() {
    let unseeded = UserStore::Memory {
        accounts: Arc::new(std::sync::RwLock::new(HashMap::new())),
        accounts_by_email: Arc::new(std::sync::RwLock::new(HashMap::new())),
        roles: Arc::new(std::sync::RwLock::new(HashMap::new())),
    };
    let harness = harness_with(unseeded, 600);

    let result = harness.users.register(register_request()).await;
    assert!(matches!(result, Err(AuthError::RoleNotConfigured)));
}

#[tokio::test]
async fn test_registration_rejects_malformed_email() {
    let harness = harness();
    let result = harness
        .users
        .register(RegisterRequest {
            email: "not-an-email".to_string(),
            ..register_request()
        })
        .await;

    let Err(AuthError::Validation(fields)) = result else {
        panic!("expected a validation error");
    };
    assert!(fields.iter().any(|f| f.field == "email"));
}

#[tokio::test]
async fn test_authentication_fails_uniformly() {
    let harness = harness();
    let account = registered_account(&harness).await;

    // Unknown account
    let result = harness
        .users
        .authenticate(AuthenticateRequest {
            email: "ghost@x.com".to_string(),
            password: "secret1".to_string(),
        })
        .await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));

    // Known account, still disabled
    let result = harness
        .users
        .authenticate(AuthenticateRequest {
            email: "ada@x.com".to_string(),
            password: "secret1".to_string(),
        })
        .await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));

    // Enabled but locked
    let mut locked = account.clone();
    locked.enabled = true;
    locked.locked = true;
    harness.user_store.update_account(locked).await.unwrap();
    let result = harness
        .users
        .authenticate(AuthenticateRequest {
            email: "ada@x.com".to_string(),
            password: "secret1".to_string(),
        })
        .await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));

    // Enabled, unlocked, wrong password
    let mut unlocked = account.clone();
    unlocked.enabled = true;
    harness.user_store.update_account(unlocked).await.unwrap();
    let result = harness
        .users
        .authenticate(AuthenticateRequest {
            email: "ada@x.com".to_string(),
            password: "wrong-password".to_string(),
        })
        .await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));
}

#[tokio::test]
async fn test_register_activate_authenticate_scenario() {
    let harness = harness();

    let account = registered_account(&harness).await;
    assert!(!account.enabled);

    let code = harness
        .activation
        .issue(&account.id, &account.email, &account.full_name())
        .await
        .unwrap();

    harness.activation.validate(&code).await.unwrap();
    let account = harness
        .users
        .store()
        .find_by_id(&account.id)
        .await
        .unwrap()
        .unwrap();
    assert!(account.enabled);

    let token = harness
        .users
        .authenticate(AuthenticateRequest {
            email: "ada@x.com".to_string(),
            password: "secret1".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(harness.tokens.verify_subject(&token).unwrap(), "ada@x.com");
}
