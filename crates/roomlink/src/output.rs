//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use clap::ValueEnum;
use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use roomlink_config::Config;
use roomlink_core::Role;

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;

// ── Presentation ─────────────────────────────────────────────────────

/// Output settings after merging flags over config defaults.
#[derive(Debug, Clone, Copy)]
pub struct Presentation {
    pub format: OutputFormat,
    pub color: bool,
    pub quiet: bool,
}

impl Presentation {
    /// Flags win, then `[defaults]` from the config file.
    pub fn resolve(global: &GlobalOpts, cfg: &Config) -> Result<Self, CliError> {
        let format = match global.output {
            Some(format) => format,
            None => parse_default("defaults.output", &cfg.defaults.output)?,
        };
        let color = match global.color {
            Some(mode) => mode,
            None => parse_default("defaults.color", &cfg.defaults.color)?,
        };
        Ok(Self {
            format,
            color: should_color(color),
            quiet: global.quiet,
        })
    }
}

fn parse_default<T: ValueEnum>(field: &str, raw: &str) -> Result<T, CliError> {
    T::from_str(raw.trim(), true).map_err(|reason| CliError::Validation {
        field: field.into(),
        reason,
    })
}

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Role label, colored by group position when `color` is set.
pub fn paint_role(role: Role, color: bool) -> String {
    let label = role.to_string();
    if !color {
        return label;
    }
    match role {
        Role::Leader => label.green().bold().to_string(),
        Role::Follower => label.cyan().to_string(),
        Role::GroupRepresentative => label.magenta().to_string(),
        Role::Solo => label.dimmed().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
///
/// - `table`: uses the `Tabled` derive to build a pretty table
/// - `json` / `json-compact`: serializes the original data via serde
/// - `yaml`: serializes via serde_yaml
/// - `plain`: calls `id_fn` on each item to emit one identifier per line
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Yaml => serde_yaml::to_string(data)?,
        OutputFormat::Plain => data.iter().map(&id_fn).collect::<Vec<_>>().join("\n"),
    })
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(serde::Serialize)]
    struct Item {
        id: &'static str,
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "ID")]
        id: String,
    }

    fn render(format: OutputFormat) -> String {
        let items = [Item { id: "u1" }, Item { id: "u2" }];
        render_list(
            format,
            &items,
            |i| Row { id: i.id.into() },
            |i| i.id.to_owned(),
        )
        .unwrap()
    }

    #[test]
    fn plain_emits_one_id_per_line() {
        assert_eq!(render(OutputFormat::Plain), "u1\nu2");
    }

    #[test]
    fn compact_json_is_single_line() {
        assert_eq!(render(OutputFormat::JsonCompact), r#"[{"id":"u1"},{"id":"u2"}]"#);
    }

    #[test]
    fn table_has_header() {
        assert!(render(OutputFormat::Table).contains("ID"));
    }

    #[test]
    fn config_defaults_fill_missing_flags() {
        let global = GlobalOpts {
            config: None,
            output: None,
            color: Some(ColorMode::Never),
            verbose: 0,
            quiet: false,
        };
        let mut cfg = Config::default();
        cfg.defaults.output = "JSON-compact".into();

        let p = Presentation::resolve(&global, &cfg).unwrap();
        assert_eq!(p.format, OutputFormat::JsonCompact);
        assert!(!p.color);

        cfg.defaults.output = "xml".into();
        assert!(matches!(
            Presentation::resolve(&global, &cfg),
            Err(CliError::Validation { .. })
        ));
    }

    #[test]
    fn uncolored_role_is_plain_text() {
        assert_eq!(paint_role(Role::Leader, false), "leader");
        assert!(paint_role(Role::Leader, true).contains("leader"));
    }
}
