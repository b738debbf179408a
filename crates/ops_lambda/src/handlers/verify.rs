//! Email verification endpoint.
//!
//! GET with `token` and `email` query parameters. The token is recomputed
//! from the email under the deployment secret and checked in constant time
//! before the store is consulted at all. The `pending → verified` transition
//! is a conditional update, so of two concurrent attempts exactly one wins;
//! the loser observes the conditional failure and answers 409.

use serde_json::{json, Value};

use ops_core::config::{EnvSource, VerifyConfig};
use ops_core::contract::{
    error_response, success_response, validation_error_response, ApiGatewayResponse,
};
use ops_core::token::verify_token;

use crate::adapters::subscriptions::{SubscriptionStore, VerifyOutcome};
use crate::logging::{log_error, log_info};

const COMPONENT: &str = "email_verify_handler";

pub fn handle_verify_request(
    event: &Value,
    env: &impl EnvSource,
    store: &dyn SubscriptionStore,
) -> ApiGatewayResponse {
    let params = event.get("queryStringParameters");
    let token = params.and_then(|value| value.get("token")).and_then(Value::as_str);
    let email = params.and_then(|value| value.get("email")).and_then(Value::as_str);

    let (Some(token), Some(email)) = (token, email) else {
        return validation_error_response("Query parameters 'token' and 'email' are required");
    };

    let config = match VerifyConfig::resolve(env) {
        Ok(value) => value,
        Err(error) => {
            log_error(COMPONENT, "misconfiguration", json!({"error": error.message()}));
            return error_response(
                500,
                json!({
                    "error": "misconfiguration",
                    "message": error.message(),
                }),
            );
        }
    };

    if !verify_token(config.secret.as_bytes(), email, token) {
        log_info(COMPONENT, "token_rejected", json!({"email": email}));
        return validation_error_response("Invalid verification token");
    }

    match store.verify_pending(&config.table_name, email) {
        Ok(VerifyOutcome::Verified) => {
            log_info(COMPONENT, "subscription_verified", json!({"email": email}));
            success_response(
                200,
                json!({
                    "status": "verified",
                    "email": email,
                }),
            )
        }
        Ok(VerifyOutcome::Conflict) => error_response(
            409,
            json!({
                "error": "conflict",
                "message": "Subscription is not pending verification",
            }),
        ),
        Ok(VerifyOutcome::NotFound) => error_response(
            404,
            json!({
                "error": "not_found",
                "message": "No subscription found for this email",
            }),
        ),
        Err(error) => {
            log_error(
                COMPONENT,
                "store_update_failed",
                json!({"email": email, "error": error}),
            );
            error_response(
                502,
                json!({
                    "error": "store_error",
                    "message": error,
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use ops_core::config::{SUBSCRIPTIONS_TABLE_VAR, VERIFICATION_SECRET_VAR};
    use ops_core::token::verification_token;

    use super::*;

    const SECRET: &str = "not-a-real-secret";
    const EMAIL: &str = "user@example.com";

    /// Single pending record keyed by email; the first verification wins,
    /// later attempts hit the conditional check, mirroring the table.
    struct FakeStore {
        records: Mutex<HashMap<String, &'static str>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeStore {
        fn with_pending(email: &str) -> Self {
            Self {
                records: Mutex::new(HashMap::from([(email.to_string(), "pending")])),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn empty() -> Self {
            Self {
                records: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().expect("poisoned mutex").len()
        }

        fn tables_seen(&self) -> Vec<String> {
            self.calls.lock().expect("poisoned mutex").clone()
        }
    }

    impl SubscriptionStore for FakeStore {
        fn verify_pending(&self, table_name: &str, email: &str) -> Result<VerifyOutcome, String> {
            self.calls
                .lock()
                .expect("poisoned mutex")
                .push(table_name.to_string());
            let mut records = self.records.lock().expect("poisoned mutex");
            match records.get(email) {
                None => Ok(VerifyOutcome::NotFound),
                Some(&"pending") => {
                    records.insert(email.to_string(), "verified");
                    Ok(VerifyOutcome::Verified)
                }
                Some(_) => Ok(VerifyOutcome::Conflict),
            }
        }
    }

    fn env() -> HashMap<String, String> {
        HashMap::from([
            (VERIFICATION_SECRET_VAR.to_string(), SECRET.to_string()),
            (
                SUBSCRIPTIONS_TABLE_VAR.to_string(),
                "subscriptions".to_string(),
            ),
        ])
    }

    fn request(token: &str, email: &str) -> Value {
        json!({
            "queryStringParameters": {
                "token": token,
                "email": email,
            }
        })
    }

    #[test]
    fn pending_record_with_correct_token_verifies() {
        let store = FakeStore::with_pending(EMAIL);
        let token = verification_token(SECRET.as_bytes(), EMAIL);

        let response = handle_verify_request(&request(&token, EMAIL), &env(), &store);

        assert_eq!(response.status_code, 200);
        assert!(response.body.contains("verified"));
        assert_eq!(store.tables_seen(), vec!["subscriptions".to_string()]);
    }

    #[test]
    fn second_attempt_gets_conflict_never_a_second_success() {
        let store = FakeStore::with_pending(EMAIL);
        let token = verification_token(SECRET.as_bytes(), EMAIL);

        let first = handle_verify_request(&request(&token, EMAIL), &env(), &store);
        let second = handle_verify_request(&request(&token, EMAIL), &env(), &store);

        assert_eq!(first.status_code, 200);
        assert_eq!(second.status_code, 409);
    }

    #[test]
    fn wrong_token_answers_400_without_touching_the_store() {
        let store = FakeStore::with_pending(EMAIL);
        let token = verification_token(SECRET.as_bytes(), "other@example.com");

        let response = handle_verify_request(&request(&token, EMAIL), &env(), &store);

        assert_eq!(response.status_code, 400);
        assert_eq!(store.call_count(), 0);
    }

    #[test]
    fn missing_parameters_answer_400() {
        let store = FakeStore::with_pending(EMAIL);

        let response = handle_verify_request(
            &json!({"queryStringParameters": {"email": EMAIL}}),
            &env(),
            &store,
        );

        assert_eq!(response.status_code, 400);
        assert_eq!(store.call_count(), 0);
    }

    #[test]
    fn unknown_email_answers_404() {
        let store = FakeStore::empty();
        let token = verification_token(SECRET.as_bytes(), EMAIL);

        let response = handle_verify_request(&request(&token, EMAIL), &env(), &store);

        assert_eq!(response.status_code, 404);
    }

    #[test]
    fn missing_config_answers_500_without_touching_the_store() {
        let store = FakeStore::with_pending(EMAIL);
        let token = verification_token(SECRET.as_bytes(), EMAIL);

        let response = handle_verify_request(&request(&token, EMAIL), &HashMap::new(), &store);

        assert_eq!(response.status_code, 500);
        assert!(response.body.contains(VERIFICATION_SECRET_VAR));
        assert!(response.body.contains(SUBSCRIPTIONS_TABLE_VAR));
        assert_eq!(store.call_count(), 0);
    }

    #[test]
    fn store_error_maps_to_502() {
        struct FailingStore;
        impl SubscriptionStore for FailingStore {
            fn verify_pending(&self, _table: &str, _email: &str) -> Result<VerifyOutcome, String> {
                Err("ProvisionedThroughputExceeded".to_string())
            }
        }

        let token = verification_token(SECRET.as_bytes(), EMAIL);
        let response = handle_verify_request(&request(&token, EMAIL), &env(), &FailingStore);

        assert_eq!(response.status_code, 502);
        assert!(response.body.contains("ProvisionedThroughputExceeded"));
    }
}
