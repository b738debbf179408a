pub trait ServiceRedeployer {
    fn force_new_deployment(&self, cluster: &str, service: &str) -> Result<(), String>;
}
