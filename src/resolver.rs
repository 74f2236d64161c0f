use std::collections::HashMap;

use crate::{CollaborationMap, EvidenceRecord};

fn channel_key(name: &str) -> String {
    name.trim().trim_start_matches('#').to_lowercase()
}

/// Repair IDs the model dropped, using ground-truth identities from the
/// evidence. Matching is case-insensitive on display names; absent names
/// stay unresolved (no fabrication). Idempotent: already-populated IDs are
/// never touched.
pub(crate) fn backfill(map: CollaborationMap, evidence: &[EvidenceRecord]) -> CollaborationMap {
    let mut authors: HashMap<String, &str> = HashMap::new();
    let mut channels: HashMap<String, &str> = HashMap::new();
    for record in evidence {
        if !record.author_id.is_empty() && !record.author_name.is_empty() {
            authors
                .entry(record.author_name.to_lowercase())
                .or_insert(&record.author_id);
        }
        if !record.channel_id.is_empty() && !record.channel_name.is_empty() {
            channels
                .entry(channel_key(&record.channel_name))
                .or_insert(&record.channel_id);
        }
    }

    CollaborationMap {
        summary: map.summary,
        experts: map
            .experts
            .into_iter()
            .map(|mut expert| {
                if expert.user_id.is_empty() {
                    if let Some(id) = authors.get(&expert.name.to_lowercase()) {
                        expert.user_id = id.to_string();
                    }
                }
                expert
            })
            .collect(),
        channels: map
            .channels
            .into_iter()
            .map(|mut channel| {
                if channel.channel_id.is_empty() {
                    if let Some(id) = channels.get(&channel_key(&channel.name)) {
                        channel.channel_id = id.to_string();
                    }
                }
                channel
            })
            .collect(),
        files: map.files,
    }
}

/// You are never your own suggested expert: drop mentions resolving to any
/// of the excluded IDs (the bot itself and the triggering actor).
/// Unresolved mentions (empty id) are kept.
pub(crate) fn filter_self_mentions(
    map: CollaborationMap,
    excluded_ids: &[&str],
) -> CollaborationMap {
    let excluded: Vec<&str> = excluded_ids
        .iter()
        .copied()
        .filter(|id| !id.is_empty())
        .collect();

    CollaborationMap {
        summary: map.summary,
        experts: map
            .experts
            .into_iter()
            .filter(|expert| {
                expert.user_id.is_empty() || !excluded.contains(&expert.user_id.as_str())
            })
            .collect(),
        channels: map.channels,
        files: map.files,
    }
}
