use std::collections::HashMap;

use ratatui::style::Color;

use super::ThemeName;

/// Colors the UI draws with for one theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub foreground: Color,
    pub muted: Color,
    pub accent: Color,
    pub selection: Color,
    pub highlight: Color,
    pub expired: Color,
    pub soon: Color,
    pub fresh: Color,
    pub error: Color,
}

#[derive(Debug, Clone)]
pub struct ThemeRegistry {
    palettes: HashMap<ThemeName, Palette>,
}

impl ThemeRegistry {
    pub fn contains(&self, theme: &ThemeName) -> bool {
        self.palettes.contains_key(theme)
    }

    pub fn palette(&self, theme: ThemeName) -> Palette {
        self.palettes
            .get(&theme)
            .copied()
            .unwrap_or_else(dark_palette)
    }
}

impl Default for ThemeRegistry {
    fn default() -> Self {
        let palettes = [
            (ThemeName::Dark, dark_palette()),
            (
                ThemeName::Light,
                Palette {
                    foreground: Color::Black,
                    muted: Color::DarkGray,
                    accent: Color::Blue,
                    selection: Color::Gray,
                    highlight: Color::Magenta,
                    expired: Color::Red,
                    soon: Color::Rgb(176, 112, 0),
                    fresh: Color::Green,
                    error: Color::Red,
                },
            ),
            (
                ThemeName::HighContrast,
                Palette {
                    foreground: Color::White,
                    muted: Color::White,
                    accent: Color::LightYellow,
                    selection: Color::Blue,
                    highlight: Color::LightYellow,
                    expired: Color::LightRed,
                    soon: Color::LightYellow,
                    fresh: Color::LightGreen,
                    error: Color::LightRed,
                },
            ),
        ]
        .into_iter()
        .collect();
        Self { palettes }
    }
}

fn dark_palette() -> Palette {
    Palette {
        foreground: Color::Gray,
        muted: Color::DarkGray,
        accent: Color::Cyan,
        selection: Color::DarkGray,
        highlight: Color::Yellow,
        expired: Color::Red,
        soon: Color::Yellow,
        fresh: Color::Green,
        error: Color::LightRed,
    }
}
