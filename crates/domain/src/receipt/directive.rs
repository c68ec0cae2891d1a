use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// Abstract print instruction, independent of the byte encoding a printer uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "arg", rename_all = "snake_case")]
pub enum PrintDirective {
    Align(Alignment),
    Bold(bool),
    Italic(bool),
    Line(String),
    Divider,
    Feed(u8),
    Cut,
}
