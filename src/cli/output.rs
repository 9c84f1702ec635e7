use std::io::IsTerminal;

use crate::core::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    /// `--json` wins, then `--format`, then the configured default.
    pub fn resolve(json_flag: bool, format: Option<&str>, settings: &Settings) -> Self {
        if json_flag {
            return Self::Json;
        }
        match format.unwrap_or(settings.default_format.as_str()) {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub pretty: bool,
    pub use_color: bool,
}

impl OutputOptions {
    /// Serialize `value` as JSON to stdout, pretty when asked.
    pub fn print_json<T: serde::Serialize>(&self, value: &T) -> anyhow::Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        println!("{}", json);
        Ok(())
    }
}

/// Whether to emit ANSI colors. `--no-color` and `NO_COLOR` always win;
/// otherwise the `color` setting decides, with `auto` meaning "stdout is a
/// terminal".
pub fn detect_color(color_flag: bool, setting: &str) -> bool {
    if !color_flag {
        return false;
    }
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    match setting {
        "always" => true,
        "never" => false,
        _ => std::io::stdout().is_terminal(),
    }
}
