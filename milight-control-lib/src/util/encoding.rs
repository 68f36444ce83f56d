//! Single-byte encodings used by command payloads.
//!
//! The bridge never receives RGB triples. Colours travel as a hue byte,
//! brightness and saturation as their literal percentage value, and colour
//! temperature as a percentage of the supported kelvin range.

use palette::{encoding, FromColor, Hsv, Srgb};

use crate::error::{MilightError, Result};

/// Lowest colour temperature the bulbs support.
pub const KELVIN_MIN: u32 = 2700;
/// Highest colour temperature the bulbs support.
pub const KELVIN_MAX: u32 = 6500;

/// Well below the smallest gap between a hue byte value and the next integer (1/1530).
const HUE_EPSILON: f64 = 1e-9;

/// Encodes a hex colour as a hue byte.
///
/// Accepts `#af00ff`, `af00ff`, `#AF 00 FF` and `AF 00 FF`: one optional `#`,
/// then six hex digits either run together or as three space separated bytes.
pub fn hue_from_hex(hex_color: &str) -> Result<u8> {
    let trimmed = hex_color.trim();
    let body = trimmed.strip_prefix('#').unwrap_or(trimmed);

    let digits = match body.split(' ').collect::<Vec<_>>().as_slice() {
        [digits] => digits.to_string(),
        [r, g, b] if [r, g, b].iter().all(|pair| pair.len() == 2) => format!("{r}{g}{b}"),
        _ => {
            return Err(MilightError::InvalidFormat(format!(
                "expected 6 hex digits, got {:?}",
                hex_color
            )))
        }
    };

    if digits.len() != 6 {
        return Err(MilightError::InvalidFormat(format!(
            "expected 6 hex digits, got {:?}",
            hex_color
        )));
    }

    let mut rgb = [0u8; 3];
    hex::decode_to_slice(&digits, &mut rgb)
        .map_err(|e| MilightError::InvalidFormat(format!("{:?}: {}", hex_color, e)))?;

    Ok(hue_from_rgb(rgb[0], rgb[1], rgb[2]))
}

/// Encodes a CSS colour name (`"purple"`, `"teal"`, ...) as a hue byte.
pub fn hue_from_name(name: &str) -> Result<u8> {
    let color: Srgb<u8> = palette::named::from_str(&name.trim().to_lowercase())
        .ok_or_else(|| MilightError::InvalidFormat(format!("unknown colour name {:?}", name)))?;
    let (r, g, b) = color.into_components();
    Ok(hue_from_rgb(r, g, b))
}

/// Tries the input as a hex colour first and as a colour name second.
pub fn hue_from_color(input: &str) -> Result<u8> {
    hue_from_hex(input).or_else(|hex_err| hue_from_name(input).map_err(|_| hex_err))
}

/// Hue of an RGB colour scaled from degrees to `0..=255`.
///
/// Achromatic colours (r == g == b) map to 0.
pub fn hue_from_rgb(red: u8, green: u8, blue: u8) -> u8 {
    let rgb = Srgb::new(red, green, blue).into_format::<f64>();
    let hsv: Hsv<encoding::Srgb, f64> = Hsv::from_color(rgb);
    let degrees = hsv.hue.into_positive_degrees();
    // Float error must not floor a whole byte value one low.
    (degrees * 255.0 / 360.0 + HUE_EPSILON)
        .floor()
        .clamp(0.0, 255.0) as u8
}

/// Clamps to `0..=100`. The wire byte is the percentage itself, not a rescale to `0..=255`.
pub fn percentage_to_byte(percent: i32) -> u8 {
    percent.clamp(0, 100) as u8
}

/// The device stores saturation as the amount of white mixed in, so the value is inverted.
pub fn saturation_to_byte(percent: i32) -> u8 {
    percentage_to_byte(100 - percent.clamp(0, 100))
}

pub fn kelvin_to_byte(kelvin: u32) -> u8 {
    let kelvin = kelvin.clamp(KELVIN_MIN, KELVIN_MAX);
    ((kelvin - KELVIN_MIN) * 100 / (KELVIN_MAX - KELVIN_MIN)) as u8
}

/// Animation mode number, passed through untouched. Callers reject values outside `1..=5`.
pub fn mode_to_byte(mode: u8) -> u8 {
    mode
}
