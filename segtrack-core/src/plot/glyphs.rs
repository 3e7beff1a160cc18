//! 3x5 bitmap font for chart text. Letters are drawn in upper case only.

pub const WIDTH: usize = 3;

const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b001, 0b001, 0b001],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

const LETTERS: [[u8; 5]; 26] = [
    [0b010, 0b101, 0b111, 0b101, 0b101], // A
    [0b110, 0b101, 0b110, 0b101, 0b110],
    [0b011, 0b100, 0b100, 0b100, 0b011],
    [0b110, 0b101, 0b101, 0b101, 0b110],
    [0b111, 0b100, 0b110, 0b100, 0b111],
    [0b111, 0b100, 0b110, 0b100, 0b100],
    [0b011, 0b100, 0b101, 0b101, 0b011],
    [0b101, 0b101, 0b111, 0b101, 0b101],
    [0b111, 0b010, 0b010, 0b010, 0b111],
    [0b001, 0b001, 0b001, 0b101, 0b010],
    [0b101, 0b101, 0b110, 0b101, 0b101],
    [0b100, 0b100, 0b100, 0b100, 0b111],
    [0b101, 0b111, 0b111, 0b101, 0b101], // M
    [0b110, 0b101, 0b101, 0b101, 0b101],
    [0b010, 0b101, 0b101, 0b101, 0b010],
    [0b110, 0b101, 0b110, 0b100, 0b100],
    [0b010, 0b101, 0b101, 0b110, 0b011],
    [0b110, 0b101, 0b110, 0b101, 0b101],
    [0b011, 0b100, 0b010, 0b001, 0b110],
    [0b111, 0b010, 0b010, 0b010, 0b010],
    [0b101, 0b101, 0b101, 0b101, 0b111],
    [0b101, 0b101, 0b101, 0b101, 0b010],
    [0b101, 0b101, 0b111, 0b111, 0b101],
    [0b101, 0b101, 0b010, 0b101, 0b101],
    [0b101, 0b101, 0b010, 0b010, 0b010],
    [0b111, 0b001, 0b010, 0b100, 0b111], // Z
];

const DASH: [u8; 5] = [0, 0, 0b111, 0, 0];
const COLON: [u8; 5] = [0, 0b010, 0, 0b010, 0];
const OPEN_PAREN: [u8; 5] = [0b001, 0b010, 0b010, 0b010, 0b001];
const CLOSE_PAREN: [u8; 5] = [0b100, 0b010, 0b010, 0b010, 0b100];
const PERIOD: [u8; 5] = [0, 0, 0, 0, 0b010];
const COMMA: [u8; 5] = [0, 0, 0, 0b010, 0b100];
const APOSTROPHE: [u8; 5] = [0b010, 0b010, 0, 0, 0];
const SLASH: [u8; 5] = [0b001, 0b001, 0b010, 0b100, 0b100];
const UNDERSCORE: [u8; 5] = [0, 0, 0, 0, 0b111];
const AMPERSAND: [u8; 5] = [0b010, 0b101, 0b010, 0b101, 0b011];
const BANG: [u8; 5] = [0b010, 0b010, 0b010, 0, 0b010];
const QUESTION: [u8; 5] = [0b110, 0b001, 0b010, 0, 0b010];
const HASH: [u8; 5] = [0b101, 0b111, 0b101, 0b111, 0b101];
const PLUS: [u8; 5] = [0, 0b010, 0b111, 0b010, 0];

/// Bitmap rows for `ch`, or `None` for characters drawn as blank space.
pub fn glyph(ch: char) -> Option<&'static [u8; 5]> {
    let ch = ch.to_ascii_uppercase();
    match ch {
        '0'..='9' => ch.to_digit(10).map(|d| &DIGITS[d as usize]),
        'A'..='Z' => Some(&LETTERS[(ch as u8 - b'A') as usize]),
        '-' => Some(&DASH),
        ':' => Some(&COLON),
        '(' => Some(&OPEN_PAREN),
        ')' => Some(&CLOSE_PAREN),
        '.' => Some(&PERIOD),
        ',' => Some(&COMMA),
        '\'' => Some(&APOSTROPHE),
        '/' => Some(&SLASH),
        '_' => Some(&UNDERSCORE),
        '&' => Some(&AMPERSAND),
        '!' => Some(&BANG),
        '?' => Some(&QUESTION),
        '#' => Some(&HASH),
        '+' => Some(&PLUS),
        _ => None,
    }
}

/// Horizontal distance from one glyph to the next, including one column of spacing.
pub fn advance(scale: i64) -> i64 {
    (WIDTH as i64 + 1) * scale
}
