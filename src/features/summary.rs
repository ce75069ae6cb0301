// Status summary for the server home widget
// Read-only: resolves the configured role/channel names

use crate::models::streaming::StreamingConfig;

pub const PLACEHOLDER: &str = "none / unknown";
pub const WIDGET_TITLE: &str = "MusicStreaming";
pub const SETTINGS_PATH: &str = "/musicstreaming";

/// A role or channel reference after resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Display name as the resolver returned it, or the placeholder
    pub name: String,
    /// `name` escaped for embedding in HTML
    pub html: String,
    pub found: bool,
}

impl Reference {
    fn resolve(id: Option<u64>, resolve: impl Fn(u64) -> Option<String>) -> Self {
        match id.and_then(resolve) {
            Some(name) => Self {
                html: html_escape::encode_double_quoted_attribute(&name).into_owned(),
                name,
                found: true,
            },
            None => Self {
                name: PLACEHOLDER.to_string(),
                html: PLACEHOLDER.to_string(),
                found: false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryView {
    pub enabled: bool,
    pub role: Reference,
    pub channel: Reference,
}

/// Data for the server home widget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Widget {
    pub title: &'static str,
    pub settings_path: &'static str,
    pub enabled: bool,
    pub body: String,
}

/// Build the summary. Resolvers return the display name when the id still exists.
pub fn render<R, C>(config: &StreamingConfig, resolve_role: R, resolve_channel: C) -> SummaryView
where
    R: Fn(u64) -> Option<String>,
    C: Fn(u64) -> Option<String>,
{
    SummaryView {
        enabled: config.enabled,
        role: Reference::resolve(config.give_role(), resolve_role),
        channel: Reference::resolve(config.announce_channel(), resolve_channel),
    }
}

impl SummaryView {
    pub fn status(&self) -> &'static str {
        if self.enabled {
            "enabled"
        } else {
            "disabled"
        }
    }

    /// HTML body of the home widget
    pub fn to_html(&self) -> String {
        format!(
            "<ul>\n\
             \t<li>Streaming status: {}</li>\n\
             \t<li>Streaming role: <code>{}</code>{}</li>\n\
             \t<li>Streaming message: <code>#{}</code>{}</li>\n\
             </ul>",
            status_span(self.enabled),
            self.role.html,
            indicator(self.role.found),
            self.channel.html,
            indicator(self.channel.found),
        )
    }

    pub fn widget(&self) -> Widget {
        Widget {
            title: WIDGET_TITLE,
            settings_path: SETTINGS_PATH,
            enabled: self.enabled,
            body: self.to_html(),
        }
    }
}

fn status_span(enabled: bool) -> &'static str {
    if enabled {
        r#"<span class="text-success">Enabled</span>"#
    } else {
        r#"<span class="text-danger">Disabled</span>"#
    }
}

fn indicator(found: bool) -> &'static str {
    if found {
        r#"<i class="fas fa-check text-success"></i>"#
    } else {
        r#"<i class="fas fa-times text-danger"></i>"#
    }
}
