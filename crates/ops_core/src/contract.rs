use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Instance states in which a volume detach is still meaningful. Anything
/// else (terminated, pending, missing) means the attachment is already gone
/// or never settled, and detachment is skipped.
pub const DETACHABLE_INSTANCE_STATES: [&str; 4] =
    ["running", "stopping", "stopped", "shutting-down"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

/// ASG termination lifecycle event, as delivered through EventBridge.
///
/// Accepts either the full envelope (fields under `detail`) or a bare detail
/// object, so a manually re-driven event works the same as a live one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub instance_id: String,
    pub asg_name: String,
    pub hook_name: String,
    pub action_token: String,
    pub transition: Option<String>,
}

impl LifecycleEvent {
    pub fn parse(event: &Value) -> Result<Self, ValidationError> {
        let detail = event.get("detail").unwrap_or(event);

        let mut missing = Vec::new();
        let field = |name: &str, missing: &mut Vec<&'static str>, label: &'static str| {
            match detail.get(name).and_then(Value::as_str) {
                Some(value) if !value.trim().is_empty() => Some(value.to_string()),
                _ => {
                    missing.push(label);
                    None
                }
            }
        };

        let instance_id = field("EC2InstanceId", &mut missing, "EC2InstanceId");
        let asg_name = field("AutoScalingGroupName", &mut missing, "AutoScalingGroupName");
        let hook_name = field("LifecycleHookName", &mut missing, "LifecycleHookName");
        let action_token = field("LifecycleActionToken", &mut missing, "LifecycleActionToken");

        if !missing.is_empty() {
            return Err(ValidationError::new(format!(
                "Lifecycle event is missing required fields: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            instance_id: instance_id.expect("present when not missing"),
            asg_name: asg_name.expect("present when not missing"),
            hook_name: hook_name.expect("present when not missing"),
            action_token: action_token.expect("present when not missing"),
            transition: detail
                .get("LifecycleTransition")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// ECR action event detail as shaped by EventBridge (hyphenated keys).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EcrPushEvent {
    #[serde(rename = "action-type")]
    pub action_type: String,
    pub result: String,
    #[serde(rename = "repository-name")]
    pub repository_name: String,
    #[serde(rename = "image-tag", default)]
    pub image_tag: Option<String>,
    #[serde(rename = "image-digest", default)]
    pub image_digest: Option<String>,
}

impl EcrPushEvent {
    pub fn parse(event: &Value) -> Result<Self, ValidationError> {
        let detail = event.get("detail").unwrap_or(event);
        serde_json::from_value(detail.clone())
            .map_err(|error| ValidationError::new(format!("Malformed ECR event: {error}")))
    }

    pub fn is_successful_push(&self) -> bool {
        self.action_type.eq_ignore_ascii_case("PUSH") && self.result.eq_ignore_ascii_case("SUCCESS")
    }

    /// Tag if present, otherwise digest, for log and response bodies.
    pub fn image_reference(&self) -> Option<&str> {
        self.image_tag
            .as_deref()
            .or_else(|| self.image_digest.as_deref())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LifecycleActionResult {
    Continue,
    Abandon,
}

impl LifecycleActionResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "CONTINUE",
            Self::Abandon => "ABANDON",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum VolumeStatus {
    Detached,
    AlreadyAvailable,
    Failed(String),
}

impl VolumeStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeOutcome {
    pub volume_id: String,
    #[serde(flatten)]
    pub status: VolumeStatus,
}

/// Response body of the detach handler: what happened to each discovered
/// volume and the result issued for the lifecycle hook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetachReport {
    pub instance_id: String,
    pub lifecycle_result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
    pub volumes: Vec<VolumeOutcome>,
    pub failed_volumes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

pub fn success_response(status_code: u16, payload: impl Serialize) -> ApiGatewayResponse {
    ApiGatewayResponse {
        status_code,
        headers: json!({"Content-Type": "application/json"}),
        body: serde_json::to_string(&payload).expect("response payload should serialize"),
    }
}

pub fn error_response(status_code: u16, payload: Value) -> ApiGatewayResponse {
    ApiGatewayResponse {
        status_code,
        headers: json!({"Content-Type": "application/json"}),
        body: payload.to_string(),
    }
}

pub fn validation_error_response(message: &str) -> ApiGatewayResponse {
    error_response(
        400,
        json!({
            "error": "validation_error",
            "message": message,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle_detail() -> Value {
        json!({
            "EC2InstanceId": "i-0abc123",
            "AutoScalingGroupName": "workers",
            "LifecycleHookName": "drain-volumes",
            "LifecycleActionToken": "token-1",
            "LifecycleTransition": "autoscaling:EC2_INSTANCE_TERMINATING",
        })
    }

    #[test]
    fn lifecycle_event_parses_from_envelope_and_bare_detail() {
        let envelope = json!({"source": "aws.autoscaling", "detail": lifecycle_detail()});

        let from_envelope = LifecycleEvent::parse(&envelope).expect("envelope should parse");
        let from_detail = LifecycleEvent::parse(&lifecycle_detail()).expect("detail should parse");

        assert_eq!(from_envelope, from_detail);
        assert_eq!(from_envelope.instance_id, "i-0abc123");
        assert_eq!(
            from_envelope.transition.as_deref(),
            Some("autoscaling:EC2_INSTANCE_TERMINATING")
        );
    }

    #[test]
    fn lifecycle_event_reports_every_missing_field() {
        let error = LifecycleEvent::parse(&json!({
            "detail": {"EC2InstanceId": "i-0abc123"}
        }))
        .expect_err("event should be rejected");

        assert!(error.message().contains("AutoScalingGroupName"));
        assert!(error.message().contains("LifecycleHookName"));
        assert!(error.message().contains("LifecycleActionToken"));
        assert!(!error.message().contains("EC2InstanceId"));
    }

    #[test]
    fn lifecycle_event_rejects_blank_token() {
        let mut detail = lifecycle_detail();
        detail["LifecycleActionToken"] = Value::from("  ");

        let error = LifecycleEvent::parse(&detail).expect_err("blank token should be rejected");
        assert!(error.message().contains("LifecycleActionToken"));
    }

    #[test]
    fn ecr_event_recognizes_successful_push() {
        let event = EcrPushEvent::parse(&json!({
            "detail": {
                "action-type": "PUSH",
                "result": "SUCCESS",
                "repository-name": "app/web",
                "image-tag": "v42",
            }
        }))
        .expect("event should parse");

        assert!(event.is_successful_push());
        assert_eq!(event.image_reference(), Some("v42"));
    }

    #[test]
    fn ecr_event_falls_back_to_digest_reference() {
        let event = EcrPushEvent::parse(&json!({
            "action-type": "PUSH",
            "result": "SUCCESS",
            "repository-name": "app/web",
            "image-digest": "sha256:feed",
        }))
        .expect("event should parse");

        assert_eq!(event.image_reference(), Some("sha256:feed"));
    }

    #[test]
    fn ecr_event_ignores_failed_and_non_push_actions() {
        let failed = EcrPushEvent::parse(&json!({
            "action-type": "PUSH",
            "result": "FAILURE",
            "repository-name": "app/web",
        }))
        .expect("event should parse");
        let delete = EcrPushEvent::parse(&json!({
            "action-type": "DELETE",
            "result": "SUCCESS",
            "repository-name": "app/web",
        }))
        .expect("event should parse");

        assert!(!failed.is_successful_push());
        assert!(!delete.is_successful_push());
    }

    #[test]
    fn volume_outcome_serializes_failure_message() {
        let outcome = VolumeOutcome {
            volume_id: "vol-1".to_string(),
            status: VolumeStatus::Failed("timed out".to_string()),
        };

        let value = serde_json::to_value(&outcome).expect("outcome should serialize");
        assert_eq!(value["volume_id"], "vol-1");
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "timed out");
    }
}
