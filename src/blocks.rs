use crate::{truncate_chars, CollaborationMap};

const QUERY_PREVIEW_CHARS: usize = 200;

fn header(text: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "header",
        "text": {"type": "plain_text", "text": text, "emoji": true},
    })
}

fn section(text: String) -> serde_json::Value {
    serde_json::json!({
        "type": "section",
        "text": {"type": "mrkdwn", "text": text},
    })
}

fn bullet(display: &str, reason: &str) -> String {
    if reason.is_empty() {
        format!("• {display}")
    } else {
        format!("• {display} — {reason}")
    }
}

/// Block Kit card for the Collaboration Map. Pure function: the map is
/// already filtered, this only formats. Mentions degrade to plain names
/// when an ID is absent.
pub(crate) fn collaboration_map_blocks(
    query_preview: &str,
    map: &CollaborationMap,
) -> Vec<serde_json::Value> {
    let mut blocks = vec![
        header("🤝 Collaboration Map"),
        serde_json::json!({
            "type": "context",
            "elements": [{
                "type": "mrkdwn",
                "text": format!("Based on: _{}_", truncate_chars(query_preview, QUERY_PREVIEW_CHARS)),
            }],
        }),
    ];

    if !map.summary.is_empty() {
        blocks.push(section(format!("*Summary*\n{}", map.summary)));
    }

    if !map.experts.is_empty() {
        let lines: Vec<String> = map
            .experts
            .iter()
            .map(|e| {
                let display = if e.user_id.is_empty() {
                    let name = if e.name.is_empty() { "Someone" } else { &e.name };
                    format!("*{name}*")
                } else {
                    format!("<@{}>", e.user_id)
                };
                bullet(&display, e.reason.trim())
            })
            .collect();
        blocks.push(section(format!("*Experts*\n{}", lines.join("\n"))));
    }

    if !map.channels.is_empty() {
        let lines: Vec<String> = map
            .channels
            .iter()
            .map(|c| {
                let base: &str = if c.name.is_empty() { "unknown" } else { &c.name };
                let mut name = base.to_string();
                if !name.starts_with('#') {
                    name = format!("#{name}");
                }
                let display = if c.channel_id.is_empty() {
                    name
                } else {
                    format!("<#{}|{}>", c.channel_id, name.trim_start_matches('#'))
                };
                bullet(&display, c.reason.trim())
            })
            .collect();
        blocks.push(section(format!("*Hot channels*\n{}", lines.join("\n"))));
    }

    if !map.files.is_empty() {
        let lines: Vec<String> = map
            .files
            .iter()
            .map(|f| {
                let name = if f.file_name.is_empty() { "Untitled" } else { &f.file_name };
                let display = if f.permalink.trim().is_empty() {
                    format!("📄 {name}")
                } else {
                    format!("📄 <{}|{name}>", f.permalink.trim())
                };
                bullet(&display, f.reason.trim())
            })
            .collect();
        blocks.push(section(format!("*Relevant files*\n{}", lines.join("\n"))));
    }

    if map.is_empty() {
        blocks.push(section(
            "No clear experts or channels found for this topic. \
             Try a different message or broader context."
                .to_string(),
        ));
    }

    blocks.push(serde_json::json!({"type": "divider"}));
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelMention, ExpertMention, FileMention};

    fn section_text(blocks: &[serde_json::Value], marker: &str) -> Option<String> {
        blocks.iter().find_map(|b| {
            let text = b.get("text")?.get("text")?.as_str()?;
            text.starts_with(marker).then(|| text.to_string())
        })
    }

    fn two_by_two_map() -> CollaborationMap {
        CollaborationMap {
            summary: "Deploys run through the CI pipeline.".to_string(),
            experts: vec![
                ExpertMention {
                    user_id: "U1".to_string(),
                    name: "Ada".to_string(),
                    reason: "answers deploy questions".to_string(),
                },
                ExpertMention {
                    user_id: String::new(),
                    name: "Grace".to_string(),
                    reason: String::new(),
                },
            ],
            channels: vec![
                ChannelMention {
                    channel_id: "C1".to_string(),
                    name: "#platform".to_string(),
                    reason: "most hits".to_string(),
                },
                ChannelMention {
                    channel_id: String::new(),
                    name: "deploys".to_string(),
                    reason: String::new(),
                },
            ],
            files: vec![],
        }
    }

    #[test]
    fn renders_header_summary_and_bullet_counts() {
        let blocks = collaboration_map_blocks("how do I deploy the pipeline?", &two_by_two_map());
        assert_eq!(
            blocks[0].get("type").and_then(|v| v.as_str()),
            Some("header")
        );
        assert!(section_text(&blocks, "*Summary*").is_some());

        let experts = section_text(&blocks, "*Experts*").unwrap();
        assert_eq!(experts.matches("• ").count(), 2);
        let channels = section_text(&blocks, "*Hot channels*").unwrap();
        assert_eq!(channels.matches("• ").count(), 2);
    }

    #[test]
    fn mention_rendering_degrades_without_ids() {
        let blocks = collaboration_map_blocks("q", &two_by_two_map());
        let experts = section_text(&blocks, "*Experts*").unwrap();
        assert!(experts.contains("<@U1>"));
        assert!(experts.contains("*Grace*"));

        let channels = section_text(&blocks, "*Hot channels*").unwrap();
        assert!(channels.contains("<#C1|platform>"));
        assert!(channels.contains("#deploys"));
    }

    #[test]
    fn empty_map_renders_fallback_only() {
        let blocks = collaboration_map_blocks("anything", &CollaborationMap::default());
        assert!(section_text(&blocks, "No clear experts or channels").is_some());
        assert!(section_text(&blocks, "*Experts*").is_none());
        assert!(section_text(&blocks, "*Hot channels*").is_none());
        assert!(section_text(&blocks, "*Relevant files*").is_none());
        assert_eq!(
            blocks.last().and_then(|b| b.get("type")).and_then(|v| v.as_str()),
            Some("divider")
        );
    }

    #[test]
    fn files_render_as_links() {
        let map = CollaborationMap {
            files: vec![FileMention {
                file_name: "runbook.md".to_string(),
                permalink: "https://example.slack.com/files/F1".to_string(),
                reason: "deploy steps".to_string(),
            }],
            ..Default::default()
        };
        let blocks = collaboration_map_blocks("q", &map);
        let files = section_text(&blocks, "*Relevant files*").unwrap();
        assert!(files.contains("<https://example.slack.com/files/F1|runbook.md>"));
        assert!(files.contains("— deploy steps"));
    }

    #[test]
    fn query_preview_is_truncated() {
        let long = "x".repeat(600);
        let blocks = collaboration_map_blocks(&long, &CollaborationMap::default());
        let context = blocks[1]
            .get("elements")
            .and_then(|e| e.as_array())
            .and_then(|a| a.first())
            .and_then(|e| e.get("text"))
            .and_then(|v| v.as_str())
            .unwrap();
        assert!(context.len() < 250);
    }
}
