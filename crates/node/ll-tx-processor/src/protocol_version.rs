use ll_primitives::chain::{ChainId, ProtocolVersion};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Source of currently active protocol version per chain
pub trait ProtocolVersionSource: fmt::Debug + Send + Sync + 'static {
    /// Protocol version active on a chain
    fn protocol_version(&self, chain_id: ChainId) -> ProtocolVersion;
}

impl<T> ProtocolVersionSource for Arc<T>
where
    T: ProtocolVersionSource,
{
    #[inline(always)]
    fn protocol_version(&self, chain_id: ChainId) -> ProtocolVersion {
        self.as_ref().protocol_version(chain_id)
    }
}

/// Protocol versions set explicitly, chains without explicit version use the default
#[derive(Debug, Default)]
pub struct StaticProtocolVersions {
    default: ProtocolVersion,
    versions: RwLock<HashMap<ChainId, ProtocolVersion>>,
}

impl ProtocolVersionSource for StaticProtocolVersions {
    fn protocol_version(&self, chain_id: ChainId) -> ProtocolVersion {
        self.versions
            .read()
            .get(&chain_id)
            .copied()
            .unwrap_or(self.default)
    }
}

impl StaticProtocolVersions {
    /// Create new instance with a default version for chains without explicit version
    pub fn new(default: ProtocolVersion) -> Self {
        Self {
            default,
            versions: RwLock::default(),
        }
    }

    /// Set version of a chain, versions only grow so lower versions are ignored
    pub fn set(&self, chain_id: ChainId, version: ProtocolVersion) {
        let mut versions = self.versions.write();
        let current = versions.entry(chain_id).or_insert(version);
        if *current < version {
            *current = version;
        }
    }
}
