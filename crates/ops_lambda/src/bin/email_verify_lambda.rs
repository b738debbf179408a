use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

use ops_core::config::ProcessEnv;
use ops_core::contract::ApiGatewayResponse;
use ops_lambda::adapters::subscriptions::{SubscriptionStore, VerifyOutcome};
use ops_lambda::handlers::verify::handle_verify_request;

struct DynamoSubscriptionStore {
    dynamodb_client: aws_sdk_dynamodb::Client,
}

impl SubscriptionStore for DynamoSubscriptionStore {
    fn verify_pending(&self, table_name: &str, email: &str) -> Result<VerifyOutcome, String> {
        let client = self.dynamodb_client.clone();
        let table_name = table_name.to_string();
        let email = email.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let existing = client
                    .get_item()
                    .table_name(&table_name)
                    .key("email", AttributeValue::S(email.clone()))
                    .send()
                    .await
                    .map_err(|error| format!("failed to read subscription: {error}"))?;

                if existing.item().is_none() {
                    return Ok(VerifyOutcome::NotFound);
                }

                let now = Utc::now();
                let update = client
                    .update_item()
                    .table_name(&table_name)
                    .key("email", AttributeValue::S(email))
                    .update_expression("SET #status = :verified, verified_at = :verified_at")
                    .condition_expression(
                        "#status = :pending AND \
                         (attribute_not_exists(expires_at) OR expires_at > :now)",
                    )
                    .expression_attribute_names("#status", "status")
                    .expression_attribute_values(
                        ":verified",
                        AttributeValue::S("verified".to_string()),
                    )
                    .expression_attribute_values(
                        ":pending",
                        AttributeValue::S("pending".to_string()),
                    )
                    .expression_attribute_values(
                        ":verified_at",
                        AttributeValue::S(now.to_rfc3339()),
                    )
                    .expression_attribute_values(
                        ":now",
                        AttributeValue::N(now.timestamp().to_string()),
                    )
                    .send()
                    .await;

                match update {
                    Ok(_) => Ok(VerifyOutcome::Verified),
                    // The loser of a concurrent verification, an already
                    // verified record, or an expired one.
                    Err(error) if error.code() == Some("ConditionalCheckFailedException") => {
                        Ok(VerifyOutcome::Conflict)
                    }
                    Err(error) => Err(format!("failed to update subscription: {error}")),
                }
            })
        })
    }
}

async fn handle_request(event: LambdaEvent<Value>) -> Result<ApiGatewayResponse, Error> {
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let store = DynamoSubscriptionStore {
        dynamodb_client: aws_sdk_dynamodb::Client::new(&aws_config),
    };

    Ok(handle_verify_request(&event.payload, &ProcessEnv, &store))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}
