//! Feature flag evaluation for a single customer identity.
mod aggregator;

pub use aggregator::{FlagAggregator, FlagError};

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// Answers whether one flag is enabled for one identity.
///
/// A single oracle is shared by every aggregation task and every request, so
/// implementations must be safe for concurrent use. Evaluation may be slow
/// but cannot fail.
#[async_trait]
pub trait FlagOracle: Send + Sync {
    async fn evaluate(&self, flag_name: &str, identity: &str) -> bool;
}

/// How a single flag evaluates in the [`StaticFlagOracle`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct FlagRule {
    pub enabled: bool,
    /// When set, the flag is only enabled for these identities.
    #[serde(default)]
    pub identities: Option<HashSet<String>>,
}

/// Oracle evaluating flags against rules loaded from configuration.
///
/// Flags without a rule are disabled.
pub struct StaticFlagOracle {
    rules: HashMap<String, FlagRule>,
}

impl StaticFlagOracle {
    pub fn new(rules: HashMap<String, FlagRule>) -> Self {
        StaticFlagOracle { rules }
    }
}

#[async_trait]
impl FlagOracle for StaticFlagOracle {
    async fn evaluate(&self, flag_name: &str, identity: &str) -> bool {
        let Some(rule) = self.rules.get(flag_name) else {
            return false;
        };

        rule.enabled
            && rule
                .identities
                .as_ref()
                .is_none_or(|allowed| allowed.contains(identity))
    }
}
