//! ECR push → ECS redeploy.
//!
//! A successful image push forces a new deployment on the configured
//! service, which rolls tasks onto the freshly pushed image. Events that are
//! not successful pushes are acknowledged and ignored; the EventBridge rule
//! normally filters them, but the handler does not depend on that.

use serde_json::{json, Value};

use ops_core::config::{EnvSource, RedeployConfig};
use ops_core::contract::{
    error_response, success_response, validation_error_response, ApiGatewayResponse, EcrPushEvent,
};

use crate::adapters::deploy::ServiceRedeployer;
use crate::logging::{log_error, log_info};

const COMPONENT: &str = "ecr_redeploy_handler";

pub fn handle_ecr_event(
    event: &Value,
    env: &impl EnvSource,
    redeployer: &dyn ServiceRedeployer,
) -> ApiGatewayResponse {
    let event = match EcrPushEvent::parse(event) {
        Ok(value) => value,
        Err(error) => return validation_error_response(error.message()),
    };

    if !event.is_successful_push() {
        log_info(
            COMPONENT,
            "event_ignored",
            json!({
                "repository": event.repository_name,
                "action_type": event.action_type,
                "result": event.result,
            }),
        );
        return success_response(
            200,
            json!({
                "status": "ignored",
                "repository": event.repository_name,
            }),
        );
    }

    let config = match RedeployConfig::resolve(env) {
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

    if let Err(error) = redeployer.force_new_deployment(&config.cluster, &config.service) {
        log_error(
            COMPONENT,
            "force_new_deployment_failed",
            json!({
                "cluster": config.cluster,
                "service": config.service,
                "repository": event.repository_name,
                "error": error,
            }),
        );
        return error_response(
            502,
            json!({
                "error": "deployment_failed",
                "message": error,
                "cluster": config.cluster,
                "service": config.service,
            }),
        );
    }

    log_info(
        COMPONENT,
        "deployment_forced",
        json!({
            "cluster": config.cluster,
            "service": config.service,
            "repository": event.repository_name,
            "image": event.image_reference(),
        }),
    );

    success_response(
        200,
        json!({
            "status": "deployment_forced",
            "cluster": config.cluster,
            "service": config.service,
            "repository": event.repository_name,
            "image": event.image_reference(),
        }),
    )
}
