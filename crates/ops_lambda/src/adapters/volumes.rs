use std::time::Duration;

/// How a detach request landed. The EC2 impl maps an `IncorrectState` error
/// onto the two already-in-motion variants by re-describing the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachInitiation {
    Detaching,
    AlreadyAvailable,
    AlreadyDetaching,
}

pub trait VolumeApi {
    /// Current instance state name, or `None` when the instance no longer
    /// exists.
    fn instance_state(&self, instance_id: &str) -> Result<Option<String>, String>;

    /// Volume ids attached to the instance with attachment status
    /// `attached` and carrying the given tag.
    fn attached_tagged_volumes(
        &self,
        instance_id: &str,
        tag_key: &str,
        tag_value: &str,
    ) -> Result<Vec<String>, String>;

    /// Non-forced detach.
    fn detach_volume(&self, volume_id: &str, instance_id: &str)
        -> Result<DetachInitiation, String>;

    fn volume_state(&self, volume_id: &str) -> Result<String, String>;
}

/// Injected so the bounded wait is testable without real time passing.
pub trait Sleeper {
    fn sleep(&self, interval: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, interval: Duration) {
        std::thread::sleep(interval);
    }
}
