//! Turns hub events into single wire lines.

use anyhow::Result;
use chat_core::{Message, MessageKind};

use crate::config::OutputFormat;

pub fn render(msg: &Message, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(msg)),
        OutputFormat::Json => Ok(serde_json::to_string(msg)?),
    }
}

fn render_text(msg: &Message) -> String {
    let time = msg.timestamp.format("%H:%M");
    match msg.kind {
        MessageKind::Chat => format!(
            "[{}] #{} <{}> {}",
            time,
            msg.channel_id.as_deref().unwrap_or("?"),
            msg.username,
            msg.text
        ),
        MessageKind::Private => format!("[{}] [dm] <{}> {}", time, msg.username, msg.text),
        MessageKind::System => format!("*** {}", msg.text),
        MessageKind::Error => format!("!!! {}", msg.text),
        MessageKind::Join => format!("--> {}", msg.text),
        MessageKind::Leave => format!("<-- {}", msg.text),
    }
}
