use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

use ops_core::config::ProcessEnv;
use ops_core::contract::ApiGatewayResponse;
use ops_lambda::adapters::deploy::ServiceRedeployer;
use ops_lambda::handlers::redeploy::handle_ecr_event;

struct EcsServiceRedeployer {
    ecs_client: aws_sdk_ecs::Client,
}

impl ServiceRedeployer for EcsServiceRedeployer {
    fn force_new_deployment(&self, cluster: &str, service: &str) -> Result<(), String> {
        let client = self.ecs_client.clone();
        let cluster = cluster.to_string();
        let service = service.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .update_service()
                    .cluster(cluster)
                    .service(service)
                    .force_new_deployment(true)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to update service: {error}"))
            })
        })
    }
}

async fn handle_request(event: LambdaEvent<Value>) -> Result<ApiGatewayResponse, Error> {
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let redeployer = EcsServiceRedeployer {
        ecs_client: aws_sdk_ecs::Client::new(&aws_config),
    };

    Ok(handle_ecr_event(&event.payload, &ProcessEnv, &redeployer))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}
