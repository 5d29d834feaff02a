//! Human-readable message formatting

use crate::state::{CompletedTransfer, OrphanedMint, TransferType};

use serde_json::{json, Value};

/// USDC amounts are integers with 6 decimals
const USDC_DECIMALS: usize = 6;
const USDC_UNIT: u128 = 1_000_000;

/// Placeholder in the explorer URL template
pub const TX_PLACEHOLDER: &str = "{tx}";

fn group_thousands(n: u128) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// `1500000` => `1.5 USDC`; unparseable input is shown raw
pub fn format_usdc(raw: &str) -> String {
    let Ok(amount) = raw.trim().parse::<u128>() else {
        return format!("{} (raw)", raw);
    };

    let whole = group_thousands(amount / USDC_UNIT);
    let fractional = amount % USDC_UNIT;
    if fractional == 0 {
        return format!("{} USDC", whole);
    }

    let padded = format!("{:0width$}", fractional, width = USDC_DECIMALS);
    format!("{}.{} USDC", whole, padded.trim_end_matches('0'))
}

/// `45s`, `2m 5s`, `1h 1m`; missing or zero reads `N/A`
pub fn format_duration(seconds: Option<i64>) -> String {
    match seconds {
        None | Some(0) => "N/A".to_string(),
        Some(s) if s < 60 => format!("{}s", s),
        Some(s) if s < 3600 => format!("{}m {}s", s / 60, s % 60),
        Some(s) => format!("{}h {}m", s / 3600, (s % 3600) / 60),
    }
}

pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn explorer_url(template: &str, tx_hash: &str) -> String {
    template.replace(TX_PLACEHOLDER, tx_hash)
}

fn block_label(block: u64) -> String {
    if block == 0 {
        "N/A".to_string()
    } else {
        block.to_string()
    }
}

fn type_emoji(transfer_type: TransferType) -> &'static str {
    match transfer_type {
        TransferType::Fast => "⚡",
        TransferType::Standard => "📋",
    }
}

/// Slack Block Kit message for a completed transfer
pub fn completion_message(completed: &CompletedTransfer, explorer_template: &str) -> Value {
    let transfer_type = completed.transfer_type.as_str();
    let emoji = type_emoji(completed.transfer_type);
    let amount = format_usdc(&completed.amount);
    let duration = format_duration(completed.duration_seconds);
    let source = capitalize(&completed.source_chain);
    let destination = capitalize(&completed.destination_chain);
    let source_link = explorer_url(explorer_template, &completed.source_tx_hash);
    let dest_link = explorer_url(explorer_template, &completed.destination_tx_hash);

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": format!("{} CCTP Transfer Completed", emoji),
                "emoji": true
            }
        }),
        json!({"type": "divider"}),
        json!({
            "type": "section",
            "fields": [
                {"type": "mrkdwn", "text": format!("*🔄 Route*\n*{}* → *{}*", source, destination)},
                {"type": "mrkdwn", "text": format!("*{} Type*\n{}", emoji, transfer_type.to_uppercase())},
                {"type": "mrkdwn", "text": format!("*💰 Amount*\n*{}*", amount)},
                {"type": "mrkdwn", "text": format!("*⏱️ Duration*\n{}", duration)}
            ]
        }),
        json!({"type": "divider"}),
        json!({
            "type": "section",
            "fields": [
                {
                    "type": "mrkdwn",
                    "text": format!(
                        "*📤 Source Chain*\n<{}|{}>\nBlock: {}",
                        source_link, source, block_label(completed.source_block_number)
                    )
                },
                {
                    "type": "mrkdwn",
                    "text": format!(
                        "*📥 Destination Chain*\n<{}|{}>\nBlock: {}",
                        dest_link, destination, block_label(completed.destination_block_number)
                    )
                }
            ]
        }),
        json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*🔑 Message Hash*\n`{}`", completed.canonical_key)
            }
        }),
    ];

    let mut context = Vec::new();
    if completed.min_finality_threshold > 0 {
        context.push(json!({
            "type": "mrkdwn",
            "text": format!("Finality: {}", completed.min_finality_threshold)
        }));
    }
    if !completed.depositor.is_empty() {
        context.push(json!({
            "type": "mrkdwn",
            "text": format!("Depositor: `{}`", completed.depositor)
        }));
    }
    if !completed.max_fee.is_empty() && completed.max_fee != "0" {
        context.push(json!({
            "type": "mrkdwn",
            "text": format!("Max Fee: {}", format_usdc(&completed.max_fee))
        }));
    }
    if !context.is_empty() {
        blocks.push(json!({"type": "context", "elements": context}));
    }

    json!({
        "blocks": blocks,
        "text": format!(
            "CCTP {} transfer: {} from {} to {}",
            transfer_type, amount, source, destination
        )
    })
}

/// Alert payload for a mint with no matching burn: the orphan record plus
/// alert metadata
pub fn orphan_alert(orphan: &OrphanedMint) -> Value {
    let mut payload = json!({
        "type": "orphaned_mint_alert",
        "severity": "warning",
        "message": format!("Orphaned mint: no matching burn for key {}", orphan.canonical_key),
    });

    if let (Some(target), Ok(Value::Object(fields))) =
        (payload.as_object_mut(), serde_json::to_value(orphan))
    {
        target.extend(fields);
    }
    payload
}
