//! Core type definitions shared by the transaction pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a proposal asks the endorsers to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalKind {
    /// Execute a chaincode function whose result will be ordered.
    Invoke,
    /// Execute a read-only function; the result is never ordered.
    Query,
    /// Place a chaincode package on the target peers.
    Install,
    /// Start an installed chaincode on the channel.
    Instantiate,
    /// Replace the running version of a chaincode.
    Upgrade,
}

impl ProposalKind {
    /// Lifecycle operations must name their endorsers: there is no sensible
    /// default set of peers to install or upgrade code on.
    pub fn requires_explicit_endorsers(&self) -> bool {
        matches!(self, Self::Install | Self::Instantiate | Self::Upgrade)
    }

    /// Lifecycle operations must name the version they operate on. For
    /// invoke and query an empty version means "whatever is committed".
    pub fn requires_version(&self) -> bool {
        self.requires_explicit_endorsers()
    }
}

impl fmt::Display for ProposalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invoke => write!(f, "invoke"),
            Self::Query => write!(f, "query"),
            Self::Install => write!(f, "install"),
            Self::Instantiate => write!(f, "instantiate"),
            Self::Upgrade => write!(f, "upgrade"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_kinds_need_endorsers_and_version() {
        for kind in [
            ProposalKind::Install,
            ProposalKind::Instantiate,
            ProposalKind::Upgrade,
        ] {
            assert!(kind.requires_explicit_endorsers());
            assert!(kind.requires_version());
        }
        assert!(!ProposalKind::Invoke.requires_explicit_endorsers());
        assert!(!ProposalKind::Query.requires_version());
    }

    #[test]
    fn kind_display() {
        assert_eq!(ProposalKind::Upgrade.to_string(), "upgrade");
        assert_eq!(
            serde_json::to_string(&ProposalKind::Instantiate).unwrap(),
            "\"instantiate\""
        );
    }
}
