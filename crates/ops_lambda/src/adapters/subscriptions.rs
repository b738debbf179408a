/// Outcome of an attempted `pending → verified` transition.
///
/// `Conflict` is what the loser of a concurrent verification sees: the
/// record exists but the conditional update found it no longer pending
/// (or past its expiry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    Conflict,
    NotFound,
}

pub trait SubscriptionStore {
    fn verify_pending(&self, table_name: &str, email: &str) -> Result<VerifyOutcome, String>;
}
