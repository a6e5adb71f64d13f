//! Badge label rendering.
//!
//! Turns attendee fields into ZPL markup for direct printing. Everything here
//! is pure: identical input always produces byte-identical output.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("required badge field is empty: {0}")]
    MissingField(&'static str),

    #[error("invalid ZPL payload: {0}")]
    InvalidZpl(String),
}

/// Physical label geometry and per-line character budgets.
#[derive(Debug, Clone, Copy)]
pub struct LabelLayout {
    /// Printable width in dots (`^PW`).
    pub width_dots: u32,
    /// Left/right margin in dots.
    pub margin_dots: u32,
    pub name_chars: usize,
    pub event_chars: usize,
    pub registration_chars: usize,
}

impl Default for LabelLayout {
    /// 4" label at 203 dpi.
    fn default() -> Self {
        Self {
            width_dots: 812,
            margin_dots: 40,
            name_chars: 20,
            event_chars: 32,
            registration_chars: 64,
        }
    }
}

impl LabelLayout {
    fn block_width(&self) -> u32 {
        self.width_dots.saturating_sub(self.margin_dots * 2)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BadgeFields {
    pub first_name: String,
    pub last_name: String,
    pub event_name: String,
    pub registration_id: String,
    pub badge_number: Option<u32>,
}

/// Badge fields after normalization; every line is guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedBadge {
    pub first_name: String,
    pub last_name: String,
    pub event_name: String,
    pub registration_id: String,
    pub badge_number: Option<u32>,
}

impl BadgeFields {
    pub fn normalize(&self, layout: &LabelLayout) -> Result<NormalizedBadge, LabelError> {
        Ok(NormalizedBadge {
            first_name: required(
                "firstName",
                normalize_line(&self.first_name, layout.name_chars, true),
            )?,
            last_name: required(
                "lastName",
                normalize_line(&self.last_name, layout.name_chars, true),
            )?,
            event_name: required(
                "eventName",
                normalize_line(&self.event_name, layout.event_chars, true),
            )?,
            registration_id: required(
                "registrationId",
                normalize_line(&self.registration_id, layout.registration_chars, false),
            )?,
            badge_number: self.badge_number,
        })
    }
}

fn required(field: &'static str, value: String) -> Result<String, LabelError> {
    if value.is_empty() {
        Err(LabelError::MissingField(field))
    } else {
        Ok(value)
    }
}

/// Strip ZPL command prefixes and control characters, collapse whitespace,
/// optionally uppercase, then truncate to `max_chars`.
fn normalize_line(raw: &str, max_chars: usize, uppercase: bool) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '^' && *c != '~' && !c.is_control())
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let cased = if uppercase {
        collapsed.to_uppercase()
    } else {
        collapsed
    };
    cased.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

/// One ZPL command per line, each newline-terminated.
fn join_commands(commands: &[String]) -> String {
    commands.iter().map(|c| format!("{c}\n")).collect()
}

pub fn render_badge(fields: &BadgeFields, layout: &LabelLayout) -> Result<String, LabelError> {
    let badge = fields.normalize(layout)?;
    let x = layout.margin_dots;
    let block = layout.block_width();

    let mut commands = vec![
        "^XA".to_string(),
        "^CI28".to_string(),
        format!("^PW{}", layout.width_dots),
        "^LH0,0".to_string(),
        format!("^FO{x},40^A0N,70,70^FB{block},1,0,C^FD{}^FS", badge.first_name),
        format!("^FO{x},120^A0N,70,70^FB{block},1,0,C^FD{}^FS", badge.last_name),
        format!("^FO{x},210^A0N,34,34^FB{block},1,0,C^FD{}^FS", badge.event_name),
        format!("^FO{x},270^BQN,2,5^FDQA,{}^FS", badge.registration_id),
    ];
    if let Some(number) = badge.badge_number {
        commands.push(format!(
            "^FO{x},300^A0N,28,28^FB{block},1,0,R^FD#{number}^FS"
        ));
    }
    commands.push("^XZ".to_string());
    Ok(join_commands(&commands))
}

/// Diagnostic label used to check end-to-end connectivity to a printer.
pub fn render_test_label(
    printer_name: &str,
    generated_at: DateTime<Utc>,
    layout: &LabelLayout,
) -> String {
    let x = layout.margin_dots;
    let block = layout.block_width();
    let mut name = normalize_line(printer_name, layout.event_chars, true);
    if name.is_empty() {
        name = "UNNAMED PRINTER".to_string();
    }

    join_commands(&[
        "^XA".to_string(),
        "^CI28".to_string(),
        format!("^PW{}", layout.width_dots),
        format!("^FO{x},40^A0N,50,50^FB{block},1,0,C^FDPRINT BRIDGE TEST^FS"),
        format!("^FO{x},110^A0N,30,30^FB{block},1,0,C^FD{name}^FS"),
        format!(
            "^FO{x},160^A0N,24,24^FB{block},1,0,C^FD{}^FS",
            generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        format!("^FO{x},200^GB{block},3,3^FS"),
        "^XZ".to_string(),
    ])
}

/// Sanity check for caller-supplied, pre-rendered ZPL.
pub fn validate_zpl(raw: &str) -> Result<(), LabelError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(LabelError::InvalidZpl("payload is empty".into()));
    }
    if !trimmed.starts_with("^XA") {
        return Err(LabelError::InvalidZpl("payload must start with ^XA".into()));
    }
    if !trimmed.contains("^XZ") {
        return Err(LabelError::InvalidZpl("payload is missing ^XZ".into()));
    }
    Ok(())
}
