use clap::ValueEnum;
use owo_colors::OwoColorize;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    #[value(name = "json-pretty")]
    JsonPretty,
}

#[derive(Debug, Clone, Copy)]
pub struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn is_human(&self) -> bool {
        self.format == OutputFormat::Human
    }

    pub fn success(&self, msg: impl AsRef<str>) {
        self.message("success", msg.as_ref(), |m| println!("{} {}", "✓".green(), m));
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.message("info", msg.as_ref(), |m| println!("{}", m));
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.message("warning", msg.as_ref(), |m| println!("{} {}", "⚠".yellow(), m));
    }

    /// Alert lines stay visible in quiet mode
    pub fn alert(&self, msg: impl AsRef<str>, data: &serde_json::Value) {
        match self.format {
            OutputFormat::Human => println!("{} {}", "🔔".bright_yellow(), msg.as_ref().bold()),
            OutputFormat::Json | OutputFormat::JsonPretty => {
                self.print_json(&json!({ "type": "alert", "event": data }));
            }
        }
    }

    pub fn println(&self, msg: impl AsRef<str>) {
        if self.quiet || !self.is_human() {
            return;
        }
        println!("{}", msg.as_ref());
    }

    pub fn json(&self, data: &serde_json::Value) {
        if self.quiet && self.format != OutputFormat::Human {
            return;
        }

        self.print_json(data);
    }

    fn message(&self, kind: &str, msg: &str, human: impl FnOnce(&str)) {
        if self.quiet {
            return;
        }

        match self.format {
            OutputFormat::Human => human(msg),
            OutputFormat::Json | OutputFormat::JsonPretty => {
                self.print_json(&json!({ "type": kind, "message": msg }));
            }
        }
    }

    fn print_json(&self, data: &serde_json::Value) {
        match self.format {
            OutputFormat::JsonPretty => {
                println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
            }
            OutputFormat::Json | OutputFormat::Human => {
                println!("{}", serde_json::to_string(data).unwrap_or_default());
            }
        }
    }
}
