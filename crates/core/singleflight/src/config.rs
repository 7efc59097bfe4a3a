#[cfg(feature = "serde")]
use serde::Deserialize;

#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
/// Config values for [`Group`](crate::Group).
pub struct GroupConfig {
    /// Name used to prefix log lines from this group
    pub name: Option<String>,
    /// Initial capacity of the in-flight registry
    pub capacity: usize,
    /// How many shards the registry is split into, rounded up to a power of two
    /// and capped at [`MAX_SHARD_AMOUNT`]
    pub shard_amount: Option<usize>,
}

/// Largest shard amount handed to the registry
pub const MAX_SHARD_AMOUNT: usize = 1 << 12;

impl GroupConfig {
    /// Shard amount the registry accepts, if one was requested
    pub(crate) fn shards(&self) -> Option<usize> {
        self.shard_amount
            .map(|amount| amount.clamp(2, MAX_SHARD_AMOUNT).next_power_of_two())
    }
}
