pub trait LifecycleApi {
    fn complete_lifecycle_action(
        &self,
        asg_name: &str,
        hook_name: &str,
        action_token: &str,
        instance_id: &str,
        result: &str,
    ) -> Result<(), String>;
}
