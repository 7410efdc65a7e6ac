//! Channel viewer: prints a [`BusSnapshot`] for the operator.

use colored::Colorize;
use nodebus_middleware::{BusSnapshot, ChannelSnapshot};

/// Output style, chosen with `NODEBUS_VIEW_FORMAT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewFormat {
    #[default]
    Text,
    Json,
}

impl ViewFormat {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => ViewFormat::Json,
            _ => ViewFormat::Text,
        }
    }

    pub fn from_env() -> Self {
        Self::parse(std::env::var("NODEBUS_VIEW_FORMAT").ok().as_deref())
    }
}

/// Render `snapshot` in the requested format.
pub fn render(snapshot: &BusSnapshot, format: ViewFormat) -> Result<String, String> {
    match format {
        ViewFormat::Json => serde_json::to_string_pretty(snapshot)
            .map_err(|e| format!("Failed to serialize snapshot: {}", e)),
        ViewFormat::Text => Ok(render_text(snapshot)),
    }
}

fn render_text(snapshot: &BusSnapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!("  dispatch loop: {}\n", snapshot.state.to_string().bold()));
    if snapshot.types.is_empty() {
        out.push_str(&format!("  {}\n", "no channels".dimmed()));
    }
    for t in &snapshot.types {
        out.push_str(&format!("\n  {}\n", format!("Channels of {}:", t.type_name).bold().cyan()));
        for c in &t.channels {
            out.push_str(&format!("    {}\n", channel_line(c)));
        }
    }
    out
}

fn channel_line(c: &ChannelSnapshot) -> String {
    let line = c.to_string();
    let line = match &c.publisher {
        Some(_) => line.green(),
        None => line.yellow(),
    };
    if c.dropped > 0 { line.red().to_string() } else { line.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodebus_middleware::{BusConfig, MessageBus};

    fn populated() -> BusSnapshot {
        let bus = MessageBus::start(BusConfig::default()).unwrap();
        bus.publish_to::<u32>("count").publish(7);
        let _sub = bus.subscribe_to("count", |_: u32| {});
        let _orphan = bus.subscribe_to("orphan", |_: String| {});
        bus.flush().unwrap();
        bus.snapshot()
    }

    #[test]
    fn view_format_parsing() {
        assert_eq!(ViewFormat::parse(Some("json")), ViewFormat::Json);
        assert_eq!(ViewFormat::parse(Some("JSON")), ViewFormat::Json);
        assert_eq!(ViewFormat::parse(Some("table")), ViewFormat::Text);
        assert_eq!(ViewFormat::parse(None), ViewFormat::Text);
    }

    #[test]
    fn text_lists_every_channel() {
        let text = render(&populated(), ViewFormat::Text).unwrap();
        assert!(text.contains("Channels of u32:"), "{text}");
        assert!(text.contains("publisher @ count with 1 subscriber [latched: 7]"), "{text}");
        assert!(text.contains("no publisher @ orphan with 1 subscriber"), "{text}");
    }

    #[test]
    fn json_is_machine_readable() {
        let json = render(&populated(), ViewFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["state"], "running");
        assert_eq!(value["types"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn empty_bus_says_so() {
        let bus = MessageBus::start(BusConfig::default()).unwrap();
        let text = render(&bus.snapshot(), ViewFormat::Text).unwrap();
        assert!(text.contains("no channels"), "{text}");
    }
}
