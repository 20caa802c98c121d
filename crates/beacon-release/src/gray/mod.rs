//! Gray release rules
//!
//! [`GrayReleaseRulesHolder`] keeps an in-process index of every gray rule,
//! refreshed by change log notifications and a periodic full scan.

mod holder;
mod rule;

pub use holder::GrayReleaseRulesHolder;
pub use rule::{BranchStatus, GrayReleaseRuleCache, GrayReleaseRuleItem, parse_rule_items};
