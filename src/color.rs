//! Color expression evaluation
//!
//! Interprets token values as colors: literals (hex, rgb, hsl, oklch,
//! oklab, named), references into other tokens, and functional expressions
//! such as `mix({core.bg}, #000, 0.25)`. Perceptual operations (mixing,
//! lightness shifting, contrast search) run in OKLab/OKLCH; classic
//! adjustments (lighten, saturate) run in HSL. A value that is not a color
//! yields `None`, never an error.

use crate::resolver::TokenResolver;
use crate::utils::{format_number, split_args};
use serde_json::Value;

/// Nested functional expressions are shallow in practice; this guard only
/// stops malformed self-referential input.
const MAX_EXPR_DEPTH: usize = 16;

/// Output syntax for a rendered color, selected by a token's `unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorFormat {
    #[default]
    Hex,
    Rgb,
}

impl ColorFormat {
    pub fn from_unit(unit: Option<&str>) -> Self {
        match unit {
            Some("rgb") | Some("rgba") => ColorFormat::Rgb,
            _ => ColorFormat::Hex,
        }
    }
}

/// An sRGB color with unit-interval channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub alpha: f64,
}

impl Rgba {
    pub fn new(r: f64, g: f64, b: f64, alpha: f64) -> Self {
        Self { r, g, b, alpha }
    }

    pub fn from_bytes(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as f64 / 255.0,
            g: g as f64 / 255.0,
            b: b as f64 / 255.0,
            alpha: a as f64 / 255.0,
        }
    }

    fn clamped(self) -> Self {
        Self {
            r: self.r.clamp(0.0, 1.0),
            g: self.g.clamp(0.0, 1.0),
            b: self.b.clamp(0.0, 1.0),
            alpha: self.alpha.clamp(0.0, 1.0),
        }
    }

    fn bytes(self) -> [u8; 3] {
        let c = self.clamped();
        [
            (c.r * 255.0).round() as u8,
            (c.g * 255.0).round() as u8,
            (c.b * 255.0).round() as u8,
        ]
    }

    pub fn to_hex(self) -> String {
        let mut out = format!("#{}", hex::encode(self.bytes()));
        if self.alpha < 1.0 - 1e-9 {
            let a = (self.alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
            out.push_str(&hex::encode([a]));
        }
        out
    }

    pub fn to_rgb_string(self) -> String {
        let [r, g, b] = self.bytes();
        if self.alpha < 1.0 - 1e-9 {
            format!("rgb({} {} {} / {})", r, g, b, format_number(self.alpha))
        } else {
            format!("rgb({} {} {})", r, g, b)
        }
    }

    pub fn render(self, format: ColorFormat) -> String {
        match format {
            ColorFormat::Hex => self.to_hex(),
            ColorFormat::Rgb => self.to_rgb_string(),
        }
    }
}

/// Attempt to interpret a raw string as a color, dereferencing embedded
/// tokens through the resolver. Returns the rendered color or `None` when
/// the input is not color-valued.
pub fn try_parse_color(
    value: &str,
    format: ColorFormat,
    resolver: &mut TokenResolver,
    source: &str,
) -> Option<String> {
    eval_color(value, resolver, source, 0).map(|color| color.render(format))
}

fn eval_color(value: &str, resolver: &mut TokenResolver, source: &str, depth: usize) -> Option<Rgba> {
    if depth > MAX_EXPR_DEPTH {
        return None;
    }
    let trimmed = value.trim();

    if let Some(color) = parse_oklch_literal(trimmed).or_else(|| parse_oklab_literal(trimmed)) {
        return Some(color);
    }

    if trimmed.starts_with('{') && trimmed.ends_with('}') && !trimmed[1..].contains('{') {
        let resolved = resolver.resolve_value(trimmed, source);
        return match resolved {
            Value::String(s) if s != trimmed => eval_color(&s, resolver, source, depth + 1),
            _ => None,
        };
    }

    if let Some(color) = parse_literal(trimmed) {
        return Some(color);
    }

    let (name, args) = parse_call(trimmed)?;
    let call = ColorFn::parse(name, &args, resolver, source, depth)?;
    Some(call.apply())
}

/// A functional color expression, parsed once with its arguments already
/// evaluated. Adding a function means adding a variant and its match arms.
#[derive(Debug, Clone, Copy)]
enum ColorFn {
    Rgba { color: Rgba, alpha: f64 },
    Lighten { color: Rgba, amount: f64 },
    Darken { color: Rgba, amount: f64 },
    Lightness { color: Rgba, amount: f64 },
    Saturate { color: Rgba, amount: f64 },
    Desaturate { color: Rgba, amount: f64 },
    Fade { color: Rgba, alpha: f64 },
    Transparentize { color: Rgba, amount: f64 },
    Mix { a: Rgba, b: Rgba, t: f64 },
    ShiftOklch { color: Rgba, delta: f64 },
    OnContrast { a: Rgba, b: Rgba, bg: Rgba, target: f64 },
}

impl ColorFn {
    fn parse(
        name: &str,
        args: &[String],
        resolver: &mut TokenResolver,
        source: &str,
        depth: usize,
    ) -> Option<Self> {
        let color = |index: usize, resolver: &mut TokenResolver| -> Option<Rgba> {
            eval_color(args.get(index)?, resolver, source, depth + 1)
        };
        let amount = |index: usize, resolver: &mut TokenResolver| -> Option<f64> {
            eval_amount(args.get(index)?, resolver, source)
        };

        let parsed = match name {
            "rgba" => ColorFn::Rgba {
                color: color(0, resolver)?,
                alpha: amount(1, resolver)?,
            },
            "lighten" => ColorFn::Lighten {
                color: color(0, resolver)?,
                amount: amount(1, resolver)?,
            },
            "darken" => ColorFn::Darken {
                color: color(0, resolver)?,
                amount: amount(1, resolver)?,
            },
            "lightness" => ColorFn::Lightness {
                color: color(0, resolver)?,
                amount: signed_amount(args.get(1)?)?,
            },
            "saturate" => ColorFn::Saturate {
                color: color(0, resolver)?,
                amount: amount(1, resolver)?,
            },
            "desaturate" => ColorFn::Desaturate {
                color: color(0, resolver)?,
                amount: amount(1, resolver)?,
            },
            "fade" => ColorFn::Fade {
                color: color(0, resolver)?,
                alpha: amount(1, resolver)?,
            },
            "transparentize" => ColorFn::Transparentize {
                color: color(0, resolver)?,
                amount: amount(1, resolver)?,
            },
            "mix" => ColorFn::Mix {
                a: color(0, resolver)?,
                b: color(1, resolver)?,
                t: if args.len() > 2 { amount(2, resolver)? } else { 0.5 },
            },
            "shift_oklch" => ColorFn::ShiftOklch {
                color: color(0, resolver)?,
                delta: signed_amount(args.get(1)?)?,
            },
            "on_contrast" => ColorFn::OnContrast {
                a: color(0, resolver)?,
                b: color(1, resolver)?,
                bg: color(2, resolver)?,
                target: if args.len() > 3 {
                    amount(3, resolver)?
                } else {
                    4.5
                },
            },
            _ => return None,
        };
        Some(parsed)
    }

    fn apply(self) -> Rgba {
        match self {
            ColorFn::Rgba { color, alpha } => Rgba { alpha, ..color },
            ColorFn::Lighten { color, amount } => adjust_hsl(color, 0.0, amount),
            ColorFn::Darken { color, amount } => adjust_hsl(color, 0.0, -amount),
            ColorFn::Lightness { color, amount } => adjust_hsl(color, 0.0, amount),
            ColorFn::Saturate { color, amount } => adjust_hsl(color, amount, 0.0),
            ColorFn::Desaturate { color, amount } => adjust_hsl(color, -amount, 0.0),
            ColorFn::Fade { color, alpha } => Rgba { alpha, ..color }.clamped(),
            ColorFn::Transparentize { color, amount } => Rgba {
                alpha: color.alpha - amount,
                ..color
            }
            .clamped(),
            ColorFn::Mix { a, b, t } => mix_oklch(a, b, t),
            ColorFn::ShiftOklch { color, delta } => shift_oklch(color, delta),
            ColorFn::OnContrast { a, b, bg, target } => on_contrast(a, b, bg, target),
        }
    }
}

/// An amount argument: a bare fraction or a trailing-percent form, possibly
/// a reference to resolve first.
fn eval_amount(arg: &str, resolver: &mut TokenResolver, source: &str) -> Option<f64> {
    let resolved;
    let text = if arg.contains('{') {
        resolved = resolver.resolve_value(arg, source);
        match resolved {
            Value::Number(ref n) => return n.as_f64(),
            Value::String(ref s) => s.clone(),
            _ => return None,
        }
    } else {
        arg.to_string()
    };
    signed_amount(&text)
}

fn signed_amount(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if let Some(stripped) = trimmed.strip_suffix('%') {
        stripped.trim().parse::<f64>().ok().map(|v| v / 100.0)
    } else {
        trimmed.parse::<f64>().ok()
    }
}

fn parse_call(value: &str) -> Option<(&str, Vec<String>)> {
    let open = value.find('(')?;
    if !value.ends_with(')') {
        return None;
    }
    let name = value[..open].trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name, split_args(&value[open + 1..value.len() - 1])))
}

// ---------------------------------------------------------------------------
// Literal parsing
// ---------------------------------------------------------------------------

fn parse_literal(value: &str) -> Option<Rgba> {
    if value.starts_with('#') {
        return parse_hex(value);
    }
    let lower = value.to_ascii_lowercase();
    if lower.starts_with("rgb(") || lower.starts_with("rgba(") {
        return parse_rgb_call(&lower);
    }
    if lower.starts_with("hsl(") || lower.starts_with("hsla(") {
        return parse_hsl_call(&lower);
    }
    named_color(&lower)
}

/// `#RGB`, `#RGBA`, `#RRGGBB`, `#RRGGBBAA`
fn parse_hex(value: &str) -> Option<Rgba> {
    let digits = &value[1..];
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    let wide = |s: &str| u8::from_str_radix(&s.repeat(2), 16).ok();

    let (r, g, b, a) = match digits.len() {
        3 => (
            wide(&digits[0..1])?,
            wide(&digits[1..2])?,
            wide(&digits[2..3])?,
            255,
        ),
        4 => (
            wide(&digits[0..1])?,
            wide(&digits[1..2])?,
            wide(&digits[2..3])?,
            wide(&digits[3..4])?,
        ),
        6 => (
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
            255,
        ),
        8 => (
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
            channel(&digits[6..8])?,
        ),
        _ => return None,
    };
    Some(Rgba::from_bytes(r, g, b, a))
}

/// Components of a CSS color function, accepting comma, space and slash
/// separators.
fn function_components(value: &str) -> Option<Vec<String>> {
    let open = value.find('(')?;
    let inner = value.strip_suffix(')')?[open + 1..].to_string();
    let normalized = inner.replace([',', '/'], " ");
    let parts: Vec<String> = normalized
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}

fn parse_rgb_call(value: &str) -> Option<Rgba> {
    let parts = function_components(value)?;
    if parts.len() < 3 {
        return None;
    }
    let channel = |s: &str| -> Option<f64> {
        if let Some(pct) = s.strip_suffix('%') {
            pct.parse::<f64>().ok().map(|v| v / 100.0)
        } else {
            s.parse::<f64>().ok().map(|v| v / 255.0)
        }
    };
    let alpha = match parts.get(3) {
        Some(a) => signed_amount(a)?,
        None => 1.0,
    };
    Some(
        Rgba::new(
            channel(&parts[0])?,
            channel(&parts[1])?,
            channel(&parts[2])?,
            alpha,
        )
        .clamped(),
    )
}

fn parse_hsl_call(value: &str) -> Option<Rgba> {
    let parts = function_components(value)?;
    if parts.len() < 3 {
        return None;
    }
    let h = parts[0].trim_end_matches("deg").parse::<f64>().ok()?;
    let s = signed_amount(&parts[1])?;
    let l = signed_amount(&parts[2])?;
    let alpha = match parts.get(3) {
        Some(a) => signed_amount(a)?,
        None => 1.0,
    };
    Some(hsl_to_rgba(h, s, l, alpha))
}

fn parse_oklch_literal(value: &str) -> Option<Rgba> {
    let lower = value.to_ascii_lowercase();
    if !lower.starts_with("oklch(") {
        return None;
    }
    let parts = function_components(&lower)?;
    if parts.len() < 3 {
        return None;
    }
    let l = lightness_component(&parts[0])?;
    let c = if let Some(pct) = parts[1].strip_suffix('%') {
        pct.parse::<f64>().ok()? / 100.0 * 0.4
    } else {
        parts[1].parse::<f64>().ok()?
    };
    let h = parts[2].trim_end_matches("deg").parse::<f64>().ok()?;
    let alpha = match parts.get(3) {
        Some(a) => signed_amount(a)?,
        None => 1.0,
    };
    Some(oklch_to_rgba(l, c, h, alpha))
}

fn parse_oklab_literal(value: &str) -> Option<Rgba> {
    let lower = value.to_ascii_lowercase();
    if !lower.starts_with("oklab(") {
        return None;
    }
    let parts = function_components(&lower)?;
    if parts.len() < 3 {
        return None;
    }
    let l = lightness_component(&parts[0])?;
    let a = parts[1].parse::<f64>().ok()?;
    let b = parts[2].parse::<f64>().ok()?;
    let alpha = match parts.get(3) {
        Some(v) => signed_amount(v)?,
        None => 1.0,
    };
    Some(oklab_to_rgba(l, a, b, alpha))
}

fn lightness_component(text: &str) -> Option<f64> {
    if let Some(pct) = text.strip_suffix('%') {
        pct.parse::<f64>().ok().map(|v| v / 100.0)
    } else {
        text.parse::<f64>().ok()
    }
}

fn named_color(name: &str) -> Option<Rgba> {
    let (r, g, b, a) = match name {
        "black" => (0, 0, 0, 255),
        "white" => (255, 255, 255, 255),
        "red" => (255, 0, 0, 255),
        "green" => (0, 128, 0, 255),
        "blue" => (0, 0, 255, 255),
        "yellow" => (255, 255, 0, 255),
        "cyan" | "aqua" => (0, 255, 255, 255),
        "magenta" | "fuchsia" => (255, 0, 255, 255),
        "gray" | "grey" => (128, 128, 128, 255),
        "silver" => (192, 192, 192, 255),
        "maroon" => (128, 0, 0, 255),
        "olive" => (128, 128, 0, 255),
        "lime" => (0, 255, 0, 255),
        "teal" => (0, 128, 128, 255),
        "navy" => (0, 0, 128, 255),
        "purple" => (128, 0, 128, 255),
        "orange" => (255, 165, 0, 255),
        "transparent" => (0, 0, 0, 0),
        _ => return None,
    };
    Some(Rgba::from_bytes(r, g, b, a))
}

// ---------------------------------------------------------------------------
// Color-space math
// ---------------------------------------------------------------------------

fn srgb_to_linear(c: f64) -> f64 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f64) -> f64 {
    if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// sRGB -> OKLab via the published LMS matrices.
fn rgba_to_oklab(color: Rgba) -> (f64, f64, f64) {
    let r = srgb_to_linear(color.r);
    let g = srgb_to_linear(color.g);
    let b = srgb_to_linear(color.b);

    let l = (0.412_221_470_8 * r + 0.536_332_536_3 * g + 0.051_445_992_9 * b).cbrt();
    let m = (0.211_903_498_2 * r + 0.680_699_545_1 * g + 0.107_396_956_6 * b).cbrt();
    let s = (0.088_302_461_9 * r + 0.281_718_837_6 * g + 0.629_978_700_5 * b).cbrt();

    (
        0.210_454_255_3 * l + 0.793_617_785_0 * m - 0.004_072_046_8 * s,
        1.977_998_495_1 * l - 2.428_592_205_0 * m + 0.450_593_709_9 * s,
        0.025_904_037_1 * l + 0.782_771_766_2 * m - 0.808_675_766_0 * s,
    )
}

fn oklab_to_rgba(lightness: f64, a: f64, b: f64, alpha: f64) -> Rgba {
    let l = (lightness + 0.396_337_777_4 * a + 0.215_803_757_3 * b).powi(3);
    let m = (lightness - 0.105_561_345_8 * a - 0.063_854_172_8 * b).powi(3);
    let s = (lightness - 0.089_484_177_5 * a - 1.291_485_548_0 * b).powi(3);

    let r = 4.076_741_662_1 * l - 3.307_711_591_3 * m + 0.230_969_929_2 * s;
    let g = -1.268_438_004_6 * l + 2.609_757_401_1 * m - 0.341_319_396_5 * s;
    let bl = -0.004_196_086_3 * l - 0.703_418_614_7 * m + 1.707_614_701_0 * s;

    Rgba::new(
        linear_to_srgb(r),
        linear_to_srgb(g),
        linear_to_srgb(bl),
        alpha,
    )
    .clamped()
}

/// OKLab -> OKLCH polar form, hue in degrees normalized to `[0, 360)`.
fn rgba_to_oklch(color: Rgba) -> (f64, f64, f64) {
    let (l, a, b) = rgba_to_oklab(color);
    let c = a.hypot(b);
    let mut h = b.atan2(a).to_degrees();
    if h < 0.0 {
        h += 360.0;
    }
    (l, c, h)
}

fn oklch_to_rgba(l: f64, c: f64, h: f64, alpha: f64) -> Rgba {
    let radians = h.to_radians();
    oklab_to_rgba(l, c * radians.cos(), c * radians.sin(), alpha)
}

fn adjust_hsl(color: Rgba, d_saturation: f64, d_lightness: f64) -> Rgba {
    let (h, s, l) = rgba_to_hsl(color);
    hsl_to_rgba(
        h,
        (s + d_saturation).clamp(0.0, 1.0),
        (l + d_lightness).clamp(0.0, 1.0),
        color.alpha,
    )
}

fn rgba_to_hsl(color: Rgba) -> (f64, f64, f64) {
    let max = color.r.max(color.g).max(color.b);
    let min = color.r.min(color.g).min(color.b);
    let l = (max + min) / 2.0;

    if (max - min).abs() < 1e-12 {
        return (0.0, 0.0, l);
    }

    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let h = if (max - color.r).abs() < 1e-12 {
        let shift = if color.g < color.b { 6.0 } else { 0.0 };
        (color.g - color.b) / d + shift
    } else if (max - color.g).abs() < 1e-12 {
        (color.b - color.r) / d + 2.0
    } else {
        (color.r - color.g) / d + 4.0
    };
    (h * 60.0, s, l)
}

fn hsl_to_rgba(h: f64, s: f64, l: f64, alpha: f64) -> Rgba {
    let h = h.rem_euclid(360.0) / 360.0;
    if s <= 0.0 {
        return Rgba::new(l, l, l, alpha).clamped();
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let hue = |mut t: f64| -> f64 {
        if t < 0.0 {
            t += 1.0;
        }
        if t > 1.0 {
            t -= 1.0;
        }
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    };
    Rgba::new(hue(h + 1.0 / 3.0), hue(h), hue(h - 1.0 / 3.0), alpha).clamped()
}

/// Perceptual blend: interpolate lightness and chroma linearly, hue along
/// the shorter angular path.
fn mix_oklch(a: Rgba, b: Rgba, t: f64) -> Rgba {
    let (la, ca, ha) = rgba_to_oklch(a);
    let (lb, cb, hb) = rgba_to_oklch(b);

    let delta_h = ((hb - ha + 540.0).rem_euclid(360.0)) - 180.0;
    let h = (ha + t * delta_h).rem_euclid(360.0);
    let l = la + t * (lb - la);
    let c = ca + t * (cb - ca);
    let alpha = a.alpha + t * (b.alpha - a.alpha);

    oklch_to_rgba(l, c, h, alpha)
}

fn shift_oklch(color: Rgba, delta: f64) -> Rgba {
    let (l, c, h) = rgba_to_oklch(color);
    oklch_to_rgba((l + delta).clamp(0.0, 1.0), c, h, color.alpha)
}

fn relative_luminance(color: Rgba) -> f64 {
    0.2126 * srgb_to_linear(color.r)
        + 0.7152 * srgb_to_linear(color.g)
        + 0.0722 * srgb_to_linear(color.b)
}

/// WCAG contrast ratio, `(L1 + 0.05) / (L2 + 0.05)` with `L1 >= L2`.
pub fn contrast_ratio(a: Rgba, b: Rgba) -> f64 {
    let la = relative_luminance(a);
    let lb = relative_luminance(b);
    let lighter = la.max(lb);
    let darker = la.min(lb);
    (lighter + 0.05) / (darker + 0.05)
}

/// Pick a readable foreground: the first candidate meeting the target, the
/// second as fallback, else a lightness search along the first candidate's
/// OKLCH axis keeping the best contrast found.
fn on_contrast(a: Rgba, b: Rgba, bg: Rgba, target: f64) -> Rgba {
    if contrast_ratio(a, bg) >= target {
        return a;
    }
    if contrast_ratio(b, bg) >= target {
        return b;
    }

    let (l, c, h) = rgba_to_oklch(a);
    let up = contrast_ratio(oklch_to_rgba((l + 0.12).clamp(0.0, 1.0), c, h, a.alpha), bg);
    let down = contrast_ratio(oklch_to_rgba((l - 0.12).clamp(0.0, 1.0), c, h, a.alpha), bg);
    let direction = if up >= down { 1.0 } else { -1.0 };

    let mut best = a;
    let mut best_ratio = contrast_ratio(a, bg);
    for step in 1..=12 {
        let candidate = oklch_to_rgba(
            (l + direction * 0.01 * step as f64).clamp(0.0, 1.0),
            c,
            h,
            a.alpha,
        );
        let ratio = contrast_ratio(candidate, bg);
        if ratio > best_ratio {
            best = candidate;
            best_ratio = ratio;
        }
        if best_ratio >= target {
            break;
        }
    }
    best
}
