//! Which spending channels a plan covers, and channel filtering.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::models::{RewardPlan, Tag, TagId};

/// Channels selected by the user; empty means "any channel".
pub type ChannelFilter = BTreeSet<TagId>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChannelScope {
    /// No tags: earns on ordinary spend everywhere
    General,
    /// Tagged with every known channel
    AllChannels,
    Tagged(BTreeSet<TagId>),
}

impl ChannelScope {
    pub fn resolve(tag_ids: &[TagId], known: &[Tag]) -> Self {
        if tag_ids.is_empty() {
            return ChannelScope::General;
        }
        let tagged: BTreeSet<TagId> = tag_ids.iter().copied().collect();
        if !known.is_empty() && known.iter().all(|tag| tagged.contains(&tag.id)) {
            ChannelScope::AllChannels
        } else {
            ChannelScope::Tagged(tagged)
        }
    }

    pub fn of(plan: &RewardPlan, known: &[Tag]) -> Self {
        Self::resolve(&plan.tag_ids, known)
    }

    /// An empty filter matches every plan. Otherwise the plan needs at least
    /// one channel in the filter, so general plans drop out.
    pub fn matches(&self, filter: &ChannelFilter) -> bool {
        match self {
            _ if filter.is_empty() => true,
            ChannelScope::General => false,
            ChannelScope::AllChannels => true,
            ChannelScope::Tagged(tags) => !tags.is_disjoint(filter),
        }
    }

    pub fn label(&self, known: &[Tag]) -> String {
        match self {
            ChannelScope::General => "general".to_string(),
            ChannelScope::AllChannels => "all channels".to_string(),
            ChannelScope::Tagged(tags) => known
                .iter()
                .filter(|tag| tags.contains(&tag.id))
                .map(|tag| tag.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Resolves tag names (case-insensitive) into a filter, ignoring unknown names.
pub fn filter_from_names(names: &[String], known: &[Tag]) -> ChannelFilter {
    known
        .iter()
        .filter(|tag| names.iter().any(|n| n.eq_ignore_ascii_case(&tag.name)))
        .map(|tag| tag.id)
        .collect()
}
