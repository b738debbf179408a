//! EBS lifecycle detach workflow.
//!
//! Per invocation:
//! validate instance → discover tagged volumes → detach fan-out → bounded
//! wait for `available` → complete the lifecycle action. Nothing is
//! persisted between invocations; a platform retry re-runs from the start.
//!
//! The hook result is always `CONTINUE`. A volume that fails to detach is
//! recorded in logs and the response body but never blocks termination —
//! once the instance is gone the attachment releases anyway. The one fatal
//! path is `CompleteLifecycleAction` itself failing, which propagates so the
//! platform retry takes over instead of leaving the instance stuck.

use serde_json::{json, Value};

use ops_core::config::{DetachConfig, EnvSource};
use ops_core::contract::{
    error_response, success_response, validation_error_response, ApiGatewayResponse, DetachReport,
    LifecycleActionResult, LifecycleEvent, VolumeOutcome, VolumeStatus,
    DETACHABLE_INSTANCE_STATES,
};

use crate::adapters::lifecycle::LifecycleApi;
use crate::adapters::volumes::{DetachInitiation, Sleeper, VolumeApi};
use crate::logging::{log_error, log_info};

const COMPONENT: &str = "ebs_detach_handler";
const AVAILABLE: &str = "available";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachHandlerError {
    pub message: String,
}

impl std::fmt::Display for DetachHandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DetachHandlerError {}

pub fn handle_lifecycle_event(
    event: &Value,
    env: &impl EnvSource,
    volumes: &dyn VolumeApi,
    lifecycle: &dyn LifecycleApi,
    sleeper: &dyn Sleeper,
) -> Result<ApiGatewayResponse, DetachHandlerError> {
    let event = match LifecycleEvent::parse(event) {
        Ok(value) => value,
        Err(error) => {
            log_error(
                COMPONENT,
                "lifecycle_event_rejected",
                json!({"error": error.message()}),
            );
            return Ok(validation_error_response(error.message()));
        }
    };

    let config = match DetachConfig::resolve(env) {
        Ok(value) => value,
        Err(error) => {
            log_error(COMPONENT, "misconfiguration", json!({"error": error.message()}));
            return Ok(error_response(
                500,
                json!({
                    "error": "misconfiguration",
                    "message": error.message(),
                }),
            ));
        }
    };

    log_info(
        COMPONENT,
        "lifecycle_event_received",
        json!({
            "instance_id": event.instance_id,
            "asg_name": event.asg_name,
            "hook_name": event.hook_name,
            "transition": event.transition,
        }),
    );

    let (outcomes, skipped_reason) = run_detach_stages(&event, &config, volumes, sleeper);

    // Detach failures are surfaced, never escalated into the hook result.
    let result = LifecycleActionResult::Continue;

    lifecycle
        .complete_lifecycle_action(
            &event.asg_name,
            &event.hook_name,
            &event.action_token,
            &event.instance_id,
            result.as_str(),
        )
        .map_err(|error| {
            log_error(
                COMPONENT,
                "complete_lifecycle_action_failed",
                json!({
                    "instance_id": event.instance_id,
                    "asg_name": event.asg_name,
                    "hook_name": event.hook_name,
                    "error": error,
                }),
            );
            DetachHandlerError {
                message: format!("failed to complete lifecycle action: {error}"),
            }
        })?;

    let failed_volumes = outcomes
        .iter()
        .filter(|outcome| outcome.status.is_failure())
        .count();

    log_info(
        COMPONENT,
        "lifecycle_action_completed",
        json!({
            "instance_id": event.instance_id,
            "result": result.as_str(),
            "volumes_handled": outcomes.len(),
            "volumes_failed": failed_volumes,
            "skipped_reason": skipped_reason,
        }),
    );

    Ok(success_response(
        200,
        DetachReport {
            instance_id: event.instance_id,
            lifecycle_result: result.as_str().to_string(),
            skipped_reason,
            volumes: outcomes,
            failed_volumes,
        },
    ))
}

/// Stages before the lifecycle action. Any failure here skips detachment
/// rather than aborting the invocation: the returned reason lands in the
/// report and the hook is still released.
fn run_detach_stages(
    event: &LifecycleEvent,
    config: &DetachConfig,
    volumes: &dyn VolumeApi,
    sleeper: &dyn Sleeper,
) -> (Vec<VolumeOutcome>, Option<String>) {
    let state = match volumes.instance_state(&event.instance_id) {
        Ok(value) => value,
        Err(error) => {
            log_error(
                COMPONENT,
                "instance_lookup_failed",
                json!({"instance_id": event.instance_id, "error": error}),
            );
            return (Vec::new(), Some(format!("instance lookup failed: {error}")));
        }
    };

    let Some(state) = state else {
        return (
            Vec::new(),
            Some("instance no longer exists".to_string()),
        );
    };

    if !DETACHABLE_INSTANCE_STATES.contains(&state.as_str()) {
        return (
            Vec::new(),
            Some(format!("instance state '{state}' is not compatible with detachment")),
        );
    }

    let discovered = match volumes.attached_tagged_volumes(
        &event.instance_id,
        &config.volume_tag_key,
        &config.volume_tag_value,
    ) {
        Ok(value) => value,
        Err(error) => {
            log_error(
                COMPONENT,
                "volume_discovery_failed",
                json!({"instance_id": event.instance_id, "error": error}),
            );
            return (Vec::new(), Some(format!("volume discovery failed: {error}")));
        }
    };

    if discovered.is_empty() {
        log_info(
            COMPONENT,
            "no_tagged_volumes",
            json!({
                "instance_id": event.instance_id,
                "tag_key": config.volume_tag_key,
                "tag_value": config.volume_tag_value,
            }),
        );
        return (Vec::new(), None);
    }

    let mut outcomes = Vec::with_capacity(discovered.len());
    let mut waiting = Vec::new();

    for volume_id in discovered {
        match volumes.detach_volume(&volume_id, &event.instance_id) {
            Ok(DetachInitiation::AlreadyAvailable) => {
                outcomes.push(VolumeOutcome {
                    volume_id,
                    status: VolumeStatus::AlreadyAvailable,
                });
            }
            Ok(DetachInitiation::Detaching) | Ok(DetachInitiation::AlreadyDetaching) => {
                waiting.push(volume_id);
            }
            Err(error) => {
                log_error(
                    COMPONENT,
                    "detach_volume_failed",
                    json!({"volume_id": volume_id, "error": error}),
                );
                outcomes.push(VolumeOutcome {
                    volume_id,
                    status: VolumeStatus::Failed(format!("detach request failed: {error}")),
                });
            }
        }
    }

    outcomes.extend(wait_until_available(waiting, config, volumes, sleeper));
    (outcomes, None)
}

/// All-complete join over the wait set: one shared deadline, one poll of
/// every pending volume per interval. Describe errors are logged and the
/// volume stays pending; volumes still pending at the deadline are failed.
fn wait_until_available(
    mut pending: Vec<String>,
    config: &DetachConfig,
    volumes: &dyn VolumeApi,
    sleeper: &dyn Sleeper,
) -> Vec<VolumeOutcome> {
    let mut outcomes = Vec::new();
    if pending.is_empty() {
        return outcomes;
    }

    for _ in 0..config.max_polls() {
        pending.retain(|volume_id| match volumes.volume_state(volume_id) {
            Ok(state) if state == AVAILABLE => {
                outcomes.push(VolumeOutcome {
                    volume_id: volume_id.clone(),
                    status: VolumeStatus::Detached,
                });
                false
            }
            Ok(_) => true,
            Err(error) => {
                log_error(
                    COMPONENT,
                    "volume_state_poll_failed",
                    json!({"volume_id": volume_id, "error": error}),
                );
                true
            }
        });

        if pending.is_empty() {
            return outcomes;
        }
        sleeper.sleep(config.poll_interval);
    }

    for volume_id in pending {
        log_error(
            COMPONENT,
            "volume_wait_timed_out",
            json!({
                "volume_id": volume_id,
                "wait_timeout_secs": config.wait_timeout.as_secs(),
            }),
        );
        outcomes.push(VolumeOutcome {
            volume_id,
            status: VolumeStatus::Failed(
                "volume did not reach 'available' within the wait timeout".to_string(),
            ),
        });
    }
    outcomes
}
