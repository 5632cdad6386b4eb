use std::fs;
use std::io;
use std::path::Path;

use ratatui::style::Color;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub tab_bg: Color,
    pub editor_bg: Color,
    pub terminal_bg: Color,
    pub ai_bg: Color,
    pub input_bg: Color,
    pub status_bg: Color,
    pub text_fg: Color,
    pub muted_fg: Color,
    pub active_fg: Color,
    pub error_fg: Color,
    pub warning_fg: Color,
    pub success_fg: Color,
    pub location_fg: Color,
    pub code_fg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            tab_bg: Color::Rgb(37, 37, 38),
            editor_bg: Color::Rgb(30, 30, 30),
            terminal_bg: Color::Rgb(24, 24, 24),
            ai_bg: Color::Rgb(44, 44, 44),
            input_bg: Color::Rgb(62, 62, 62),
            status_bg: Color::Rgb(0, 122, 204),
            text_fg: Color::Rgb(212, 212, 212),
            muted_fg: Color::Rgb(150, 150, 150),
            active_fg: Color::Rgb(255, 255, 255),
            error_fg: Color::Rgb(244, 71, 71),
            warning_fg: Color::Rgb(204, 167, 0),
            success_fg: Color::Rgb(115, 201, 145),
            location_fg: Color::Rgb(86, 156, 214),
            code_fg: Color::Rgb(206, 145, 120),
        }
    }
}

impl Theme {
    /// A missing file silently yields the defaults; a malformed one is logged.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path_ref = path.as_ref();
        match fs::read_to_string(path_ref) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(theme) => theme,
                Err(err) => {
                    tracing::warn!(path = %path_ref.display(), "failed to parse theme: {err}");
                    Self::default()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!(path = %path_ref.display(), "failed to read theme: {err}");
                Self::default()
            }
        }
    }

    /// Colours absent from `[colors]` keep their default value.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        let cfg: ThemeToml = toml::from_str(s)?;
        let colors = cfg.colors;
        let base = Self::default();
        Ok(Self {
            tab_bg: pick(colors.tab_bg, base.tab_bg),
            editor_bg: pick(colors.editor_bg, base.editor_bg),
            terminal_bg: pick(colors.terminal_bg, base.terminal_bg),
            ai_bg: pick(colors.ai_bg, base.ai_bg),
            input_bg: pick(colors.input_bg, base.input_bg),
            status_bg: pick(colors.status_bg, base.status_bg),
            text_fg: pick(colors.text_fg, base.text_fg),
            muted_fg: pick(colors.muted_fg, base.muted_fg),
            active_fg: pick(colors.active_fg, base.active_fg),
            error_fg: pick(colors.error_fg, base.error_fg),
            warning_fg: pick(colors.warning_fg, base.warning_fg),
            success_fg: pick(colors.success_fg, base.success_fg),
            location_fg: pick(colors.location_fg, base.location_fg),
            code_fg: pick(colors.code_fg, base.code_fg),
        })
    }
}

fn pick(value: Option<RgbToml>, fallback: Color) -> Color {
    value.map(|rgb| rgb.to_color()).unwrap_or(fallback)
}

#[derive(Debug, Default, Deserialize)]
struct ThemeToml {
    #[serde(default)]
    colors: ThemeColorsToml,
}

#[derive(Debug, Default, Deserialize)]
struct ThemeColorsToml {
    tab_bg: Option<RgbToml>,
    editor_bg: Option<RgbToml>,
    terminal_bg: Option<RgbToml>,
    ai_bg: Option<RgbToml>,
    input_bg: Option<RgbToml>,
    status_bg: Option<RgbToml>,
    text_fg: Option<RgbToml>,
    muted_fg: Option<RgbToml>,
    active_fg: Option<RgbToml>,
    error_fg: Option<RgbToml>,
    warning_fg: Option<RgbToml>,
    success_fg: Option<RgbToml>,
    location_fg: Option<RgbToml>,
    code_fg: Option<RgbToml>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct RgbToml {
    r: u8,
    g: u8,
    b: u8,
}

impl RgbToml {
    fn to_color(self) -> Color {
        Color::Rgb(self.r, self.g, self.b)
    }
}
