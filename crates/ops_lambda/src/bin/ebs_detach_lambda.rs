use aws_sdk_ec2::error::ProvideErrorMetadata;
use aws_sdk_ec2::types::Filter;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

use ops_core::config::ProcessEnv;
use ops_core::contract::ApiGatewayResponse;
use ops_lambda::adapters::lifecycle::LifecycleApi;
use ops_lambda::adapters::volumes::{DetachInitiation, ThreadSleeper, VolumeApi};
use ops_lambda::handlers::detach::handle_lifecycle_event;

struct Ec2VolumeApi {
    ec2_client: aws_sdk_ec2::Client,
}

impl Ec2VolumeApi {
    fn describe_volume_state(&self, volume_id: &str) -> Result<String, String> {
        let client = self.ec2_client.clone();
        let volume_id = volume_id.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let output = client
                    .describe_volumes()
                    .volume_ids(&volume_id)
                    .send()
                    .await
                    .map_err(|error| format!("failed to describe volume {volume_id}: {error}"))?;

                output
                    .volumes()
                    .first()
                    .and_then(|volume| volume.state())
                    .map(|state| state.as_str().to_string())
                    .ok_or_else(|| format!("volume {volume_id} has no reported state"))
            })
        })
    }
}

impl VolumeApi for Ec2VolumeApi {
    fn instance_state(&self, instance_id: &str) -> Result<Option<String>, String> {
        let client = self.ec2_client.clone();
        let instance_id = instance_id.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                match client
                    .describe_instances()
                    .instance_ids(&instance_id)
                    .send()
                    .await
                {
                    Ok(output) => Ok(output
                        .reservations()
                        .iter()
                        .flat_map(|reservation| reservation.instances())
                        .next()
                        .and_then(|instance| instance.state())
                        .and_then(|state| state.name())
                        .map(|name| name.as_str().to_string())),
                    Err(error) if error.code() == Some("InvalidInstanceID.NotFound") => Ok(None),
                    Err(error) => Err(format!(
                        "failed to describe instance {instance_id}: {error}"
                    )),
                }
            })
        })
    }

    fn attached_tagged_volumes(
        &self,
        instance_id: &str,
        tag_key: &str,
        tag_value: &str,
    ) -> Result<Vec<String>, String> {
        let client = self.ec2_client.clone();
        let instance_id = instance_id.to_string();
        let tag_filter = format!("tag:{tag_key}");
        let tag_value = tag_value.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let output = client
                    .describe_volumes()
                    .filters(
                        Filter::builder()
                            .name("attachment.instance-id")
                            .values(&instance_id)
                            .build(),
                    )
                    .filters(
                        Filter::builder()
                            .name("attachment.status")
                            .values("attached")
                            .build(),
                    )
                    .filters(Filter::builder().name(tag_filter).values(tag_value).build())
                    .send()
                    .await
                    .map_err(|error| format!("failed to discover volumes: {error}"))?;

                Ok(output
                    .volumes()
                    .iter()
                    .filter_map(|volume| volume.volume_id())
                    .map(str::to_string)
                    .collect())
            })
        })
    }

    fn detach_volume(
        &self,
        volume_id: &str,
        instance_id: &str,
    ) -> Result<DetachInitiation, String> {
        let client = self.ec2_client.clone();
        let owned_volume_id = volume_id.to_string();
        let instance_id = instance_id.to_string();

        let result = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .detach_volume()
                    .volume_id(&owned_volume_id)
                    .instance_id(&instance_id)
                    .send()
                    .await
            })
        });

        match result {
            Ok(_) => Ok(DetachInitiation::Detaching),
            // IncorrectState covers both "already available" and "already
            // detaching"; re-describe to tell them apart.
            Err(error) if error.code() == Some("IncorrectState") => {
                match self.describe_volume_state(volume_id)?.as_str() {
                    "available" => Ok(DetachInitiation::AlreadyAvailable),
                    "detaching" => Ok(DetachInitiation::AlreadyDetaching),
                    state => Err(format!(
                        "volume {volume_id} cannot be detached from state '{state}'"
                    )),
                }
            }
            Err(error) => Err(format!("failed to detach volume {volume_id}: {error}")),
        }
    }

    fn volume_state(&self, volume_id: &str) -> Result<String, String> {
        self.describe_volume_state(volume_id)
    }
}

struct AsgLifecycleApi {
    autoscaling_client: aws_sdk_autoscaling::Client,
}

impl LifecycleApi for AsgLifecycleApi {
    fn complete_lifecycle_action(
        &self,
        asg_name: &str,
        hook_name: &str,
        action_token: &str,
        instance_id: &str,
        result: &str,
    ) -> Result<(), String> {
        let client = self.autoscaling_client.clone();
        let asg_name = asg_name.to_string();
        let hook_name = hook_name.to_string();
        let action_token = action_token.to_string();
        let instance_id = instance_id.to_string();
        let result = result.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .complete_lifecycle_action()
                    .auto_scaling_group_name(asg_name)
                    .lifecycle_hook_name(hook_name)
                    .lifecycle_action_token(action_token)
                    .instance_id(instance_id)
                    .lifecycle_action_result(result)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to complete lifecycle action: {error}"))
            })
        })
    }
}

async fn handle_request(event: LambdaEvent<Value>) -> Result<ApiGatewayResponse, Error> {
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let volumes = Ec2VolumeApi {
        ec2_client: aws_sdk_ec2::Client::new(&aws_config),
    };
    let lifecycle = AsgLifecycleApi {
        autoscaling_client: aws_sdk_autoscaling::Client::new(&aws_config),
    };

    handle_lifecycle_event(&event.payload, &ProcessEnv, &volumes, &lifecycle, &ThreadSleeper)
        .map_err(|error| Error::from(error.message))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}
