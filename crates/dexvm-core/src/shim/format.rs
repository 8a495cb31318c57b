//! Java text form of floating point values
//!
//! Magnitudes in `[1e-3, 1e7)` print as plain decimals, everything else in
//! computerized scientific notation. Both forms carry at least one digit
//! after the point.

/// `Float.toString`
pub fn float_to_string(value: f32) -> String {
    if let Some(special) = special(value.is_nan(), value.is_infinite(), value.is_sign_negative()) {
        return special.to_string();
    }
    let magnitude = value.abs();
    if magnitude == 0.0 || (1e-3..1e7).contains(&magnitude) {
        plain(value.to_string())
    } else {
        scientific(format!("{:e}", value))
    }
}

/// `Double.toString`
pub fn double_to_string(value: f64) -> String {
    if let Some(special) = special(value.is_nan(), value.is_infinite(), value.is_sign_negative()) {
        return special.to_string();
    }
    let magnitude = value.abs();
    if magnitude == 0.0 || (1e-3..1e7).contains(&magnitude) {
        plain(value.to_string())
    } else {
        scientific(format!("{:e}", value))
    }
}

fn special(nan: bool, infinite: bool, negative: bool) -> Option<&'static str> {
    match (nan, infinite, negative) {
        (true, _, _) => Some("NaN"),
        (_, true, false) => Some("Infinity"),
        (_, true, true) => Some("-Infinity"),
        _ => None,
    }
}

fn plain(mut text: String) -> String {
    if !text.contains('.') {
        text.push_str(".0");
    }
    text
}

fn scientific(text: String) -> String {
    let (mantissa, exponent) = text.split_once('e').unwrap_or((&text, "0"));
    let mantissa = if mantissa.contains('.') {
        mantissa.to_string()
    } else {
        format!("{}.0", mantissa)
    };
    format!("{}E{}", mantissa, exponent)
}
