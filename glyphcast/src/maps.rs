//! Character maps and the density ramp used to turn brightness into glyphs.

/// Named character maps. Any of them converts into a [`DensityRamp`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CharMap {
    #[default]
    Paper,
    Chars1,
    Chars2,
    Chars3,
    Solid,
    Dotted,
    Gradient,
    BlackWhite,
    BwDotted,
    Braille,
    Custom(String),
}

impl CharMap {
    pub fn as_str(&self) -> &str {
        match self {
            CharMap::Paper => PAPER,
            CharMap::Chars1 => CHARS1,
            CharMap::Chars2 => CHARS2,
            CharMap::Chars3 => CHARS3,
            CharMap::Solid => SOLID,
            CharMap::Dotted => DOTTED,
            CharMap::Gradient => GRADIENT,
            CharMap::BlackWhite => BLACKWHITE,
            CharMap::BwDotted => BW_DOTTED,
            CharMap::Braille => BRAILLE,
            CharMap::Custom(chars) => chars,
        }
    }

    pub fn custom(chars: &str) -> Self {
        Self::Custom(chars.to_string())
    }

    /// Looks a preset up by its lowercase name.
    pub fn preset(name: &str) -> Option<Self> {
        let map = match name {
            "paper" => CharMap::Paper,
            "chars1" => CharMap::Chars1,
            "chars2" => CharMap::Chars2,
            "chars3" => CharMap::Chars3,
            "solid" => CharMap::Solid,
            "dotted" => CharMap::Dotted,
            "gradient" => CharMap::Gradient,
            "blackwhite" => CharMap::BlackWhite,
            "bwdotted" => CharMap::BwDotted,
            "braille" => CharMap::Braille,
            _ => return None,
        };
        Some(map)
    }

    pub fn ramp(&self) -> DensityRamp {
        DensityRamp::new(self.as_str())
    }
}

// Dense glyphs first, for dark ink on a light background
const PAPER: &str = r##"@%#*+=-:. "##; // 10 chars

// ASCII-127 Only
const CHARS1: &str = r##" .:-=+*#%@"##; // 10 chars
const CHARS2: &str = r##" .'`^",:;Il!i~+_-?][}{1)(|/tfjrxnuvczXYUJCLQ0OZmwqpdbkhao*#MW&8%B@$"##; // 67 chars
const CHARS3: &str = r##" `.-':_,^=;><+!rc*/z?sLTv)J7(|Fi{C}fI31tlu[neoZ5Yxjya]2ESwqkP6h9d4VpOGbUAKXHm8RD#$Bg0MNWQ%&@"##; // 92 chars

// ASCII-255
const SOLID: &str = r#"█"#; // 1 Solid block
const DOTTED: &str = r#"⣿"#; // 1 dotted block
const GRADIENT: &str = r#" ░▒▓█"#; // 5 chars
const BLACKWHITE: &str = r#" █"#; // 2 chars
const BW_DOTTED: &str = r#" ⣿"#; // 2 dotted block
const BRAILLE: &str = r#" ··⣀⣀⣤⣤⣤⣀⡀⢀⠠⠔⠒⠑⠊⠉⠁"#; // 16 chars (braille-based)

/// Ordered glyph lookup table. Index 0 is used for brightness 0, the last
/// glyph for brightness 255, whatever the glyphs look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DensityRamp {
    chars: Vec<char>,
}

impl DensityRamp {
    /// An empty string becomes a single blank glyph.
    pub fn new(chars: &str) -> Self {
        let mut chars: Vec<char> = chars.chars().collect();
        if chars.is_empty() {
            chars.push(' ');
        }
        Self { chars }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Always false: a ramp holds at least one glyph.
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn glyph_for(&self, brightness: f64) -> char {
        self.chars[brightness_index(brightness, self.chars.len())]
    }
}

impl Default for DensityRamp {
    fn default() -> Self {
        CharMap::default().ramp()
    }
}

impl From<CharMap> for DensityRamp {
    fn from(map: CharMap) -> Self {
        map.ramp()
    }
}

/// Linearly maps `brightness` in `[0, 255]` onto `[0, len - 1]`, flooring.
///
/// Out of range brightness is clamped and a zero length behaves like a
/// single glyph ramp, so the result is always a valid index.
pub fn brightness_index(brightness: f64, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let b = if brightness.is_nan() {
        0.0
    } else {
        brightness.clamp(0.0, 255.0)
    };
    let last = len - 1;
    let idx = (b / 255.0 * last as f64).floor() as usize;
    idx.min(last)
}
