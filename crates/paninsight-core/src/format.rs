//! Number and text formatting shared by the renderer and both exporters.

const PT_TO_MM: f32 = 25.4 / 72.0;
/// Average glyph advance of Helvetica in em units.
const AVG_CHAR_EM: f32 = 0.5;

/// Fixed two-decimal rendering used for volumes and percentages.
///
/// Exact ties round away from zero (`3.125` becomes `3.13`), not to even.
pub fn two_decimals(value: f64) -> String {
    if !value.is_finite() {
        return format!("{value:.2}");
    }
    format!("{:.2}", (value * 100.0).round() / 100.0)
}

/// Group the integer part with `,` and keep at most three fraction digits (`1,234,567.5`).
pub fn group_thousands(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let rounded = (value * 1000.0).round() / 1000.0;
    let negative = rounded < 0.0;
    let abs = rounded.abs();
    let integer = abs.trunc() as u64;
    let fraction = format!("{:.3}", abs - abs.trunc());
    let fraction = fraction
        .trim_start_matches('0')
        .trim_start_matches('.')
        .trim_end_matches('0');

    let digits = integer.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 5);
    if negative && (integer > 0 || !fraction.is_empty()) {
        out.push('-');
    }
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if !fraction.is_empty() {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

/// How many characters of body text fit into `width_mm` at `font_size_pt`.
pub fn chars_per_line(width_mm: f32, font_size_pt: f32) -> usize {
    let advance = font_size_pt * PT_TO_MM * AVG_CHAR_EM;
    if advance <= 0.0 {
        return usize::MAX;
    }
    ((width_mm / advance).floor() as usize).max(1)
}

/// Greedy word wrap. Explicit newlines are kept; words longer than a line are split.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0usize;
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let needed = if current_len == 0 {
                word.len()
            } else {
                current_len + 1 + word.len()
            };
            if needed > max_chars && current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(word.iter());
            current_len += word.len();
        }
        lines.push(current);
    }
    while lines.len() > 1 && lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}
