pub mod deploy;
pub mod lifecycle;
pub mod subscriptions;
pub mod volumes;
