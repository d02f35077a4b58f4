// src/publish/format.rs
//! Pure formatting of payloads into Telegram HTML. No I/O.

use html_escape::encode_text;

/// Topic marker picked from keywords (Persian + English).
pub fn detect_topic(text: &str) -> &'static str {
    let t = text.to_lowercase();
    let any = |words: &[&str]| words.iter().any(|w| t.contains(w));
    if any(&["فوری", "breaking", "urgent"]) {
        "🔴"
    } else if any(&["اقتصاد", "دلار", "طلا", "economy", "dollar", "gold"]) {
        "💰"
    } else if any(&["جنگ", "حمله", "war", "attack"]) {
        "⚔️"
    } else if any(&["تکنولوژی", "tech", " ai ", "ai:"]) {
        "🤖"
    } else {
        "📰"
    }
}

/// First line becomes the bold headline, the rest is the body.
pub fn format_news(text: &str, signature: &str) -> String {
    let emoji = detect_topic(text);
    let (header, body) = match text.split_once('\n') {
        Some((h, b)) => (h.trim(), b.trim()),
        None => (text.trim(), ""),
    };
    let mut out = format!("<b>{} {}</b>", emoji, encode_text(header));
    if !body.is_empty() {
        out.push_str("\n\n");
        out.push_str(&encode_text(body));
    }
    out.push_str(signature);
    out
}

pub fn format_proxy(config: &str, signature: &str) -> String {
    format!(
        "🔑 <b>Connect to Freedom</b>\n\n<code>{}</code>{}",
        encode_text(config),
        signature
    )
}

pub fn format_proxy_file(display_name: &str, signature: &str) -> String {
    format!("📁 <b>{}</b>{}", encode_text(display_name), signature)
}
