//! Open Location Code ("Plus Code") codec
//!
//! Offline decode of full codes, 10-digit encode, and recovery of short codes
//! against a reference point. Only what the geocoder tier needs; code shortening
//! is not implemented.

use tourgen_common::geo::GeoPoint;

const ALPHABET: &[u8; 20] = b"23456789CFGHJMPQRVWX";
const SEPARATOR: char = '+';
const SEPARATOR_POSITION: usize = 8;
const PADDING: char = '0';
const ENCODING_BASE: f64 = 20.0;
/// Digits encoded as lat/lng pairs; later digits refine a 5x4 grid
const PAIR_CODE_LENGTH: usize = 10;
const MAX_DIGITS: usize = 15;
const GRID_ROWS: f64 = 5.0;
const GRID_COLUMNS: f64 = 4.0;
/// Resolution of the first pair, degrees
const FIRST_PAIR_RESOLUTION: f64 = 20.0;

/// Decoded code area
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodeArea {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
    /// Number of significant digits in the decoded code
    pub code_length: usize,
}

impl CodeArea {
    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: ((self.south + self.north) / 2.0).min(90.0),
            lng: ((self.west + self.east) / 2.0).min(180.0),
        }
    }
}

fn digit_value(c: char) -> Option<usize> {
    let upper = c.to_ascii_uppercase();
    ALPHABET.iter().position(|&b| b as char == upper)
}

/// Structural validity (full or short)
pub fn is_valid(code: &str) -> bool {
    let Some(sep) = code.find(SEPARATOR) else {
        return false;
    };
    if code.matches(SEPARATOR).count() != 1 || sep > SEPARATOR_POSITION || sep % 2 == 1 {
        return false;
    }

    if let Some(pad_start) = code.find(PADDING) {
        // Padding only in full-length prefixes, never first, in pairs, and
        // followed by nothing but the separator.
        if sep < SEPARATOR_POSITION || pad_start == 0 || pad_start % 2 == 1 {
            return false;
        }
        let padding = &code[pad_start..sep];
        if padding.len() % 2 == 1 || padding.chars().any(|c| c != PADDING) {
            return false;
        }
        if !code.ends_with(SEPARATOR) {
            return false;
        }
    }

    if code.len() - sep - 1 == 1 {
        return false;
    }

    code.chars()
        .filter(|&c| c != SEPARATOR && c != PADDING)
        .all(|c| digit_value(c).is_some())
}

/// Valid code with its separator before position 8
pub fn is_short(code: &str) -> bool {
    is_valid(code) && code.find(SEPARATOR).is_some_and(|sep| sep < SEPARATOR_POSITION)
}

/// Valid code with a full 8-digit prefix inside the world bounds
pub fn is_full(code: &str) -> bool {
    if !is_valid(code) || is_short(code) {
        return false;
    }
    let mut chars = code.chars();
    let first_lat = chars.next().and_then(digit_value).unwrap_or(usize::MAX) as f64;
    let first_lng = chars.next().and_then(digit_value).unwrap_or(usize::MAX) as f64;
    first_lat * ENCODING_BASE < 180.0 && first_lng * ENCODING_BASE < 360.0
}

/// Decode a full code into its area
pub fn decode(code: &str) -> Option<CodeArea> {
    if !is_full(code) {
        return None;
    }

    let digits: Vec<usize> = code
        .chars()
        .take_while(|&c| c != PADDING)
        .filter(|&c| c != SEPARATOR)
        .take(MAX_DIGITS)
        .map(digit_value)
        .collect::<Option<_>>()?;

    let mut south = -90.0;
    let mut west = -180.0;
    let mut resolution = FIRST_PAIR_RESOLUTION;

    let pair_len = digits.len().min(PAIR_CODE_LENGTH);
    for (i, pair) in digits[..pair_len].chunks(2).enumerate() {
        if i > 0 {
            resolution /= ENCODING_BASE;
        }
        south += pair[0] as f64 * resolution;
        if let Some(&lng_digit) = pair.get(1) {
            west += lng_digit as f64 * resolution;
        }
    }

    let mut lat_res = resolution;
    let mut lng_res = resolution;
    for &value in &digits[pair_len..] {
        lat_res /= GRID_ROWS;
        lng_res /= GRID_COLUMNS;
        south += (value / GRID_COLUMNS as usize) as f64 * lat_res;
        west += (value % GRID_COLUMNS as usize) as f64 * lng_res;
    }

    Some(CodeArea {
        south,
        west,
        north: south + lat_res,
        east: west + lng_res,
        code_length: digits.len(),
    })
}

/// Encode a point as a 10-digit code (roughly 14 m resolution)
pub fn encode(point: GeoPoint) -> String {
    let mut lat = point.lat.clamp(-90.0, 90.0);
    if lat >= 90.0 {
        lat -= 1e-10;
    }
    let lng = (point.lng + 180.0).rem_euclid(360.0) - 180.0;

    let mut lat_val = lat + 90.0;
    let mut lng_val = lng + 180.0;
    let mut resolution = FIRST_PAIR_RESOLUTION;
    let mut code = String::with_capacity(PAIR_CODE_LENGTH + 1);

    for _ in 0..PAIR_CODE_LENGTH / 2 {
        let lat_digit = ((lat_val / resolution).floor() as usize).min(19);
        let lng_digit = ((lng_val / resolution).floor() as usize).min(19);
        lat_val -= lat_digit as f64 * resolution;
        lng_val -= lng_digit as f64 * resolution;
        code.push(ALPHABET[lat_digit] as char);
        code.push(ALPHABET[lng_digit] as char);
        if code.len() == SEPARATOR_POSITION {
            code.push(SEPARATOR);
        }
        resolution /= ENCODING_BASE;
    }

    code
}

/// Recover the location of a short code using the nearest matching area to `reference`
///
/// Full codes decode as-is. Returns `None` for invalid input.
pub fn recover_nearest(code: &str, reference: GeoPoint) -> Option<GeoPoint> {
    if is_full(code) {
        return decode(code).map(|a| a.center());
    }
    if !is_short(code) {
        return None;
    }

    let sep = code.find(SEPARATOR)?;
    let padding_length = SEPARATOR_POSITION - sep;
    let resolution = ENCODING_BASE.powi(2 - (padding_length / 2) as i32);
    let half = resolution / 2.0;

    let prefix: String = encode(reference).chars().take(padding_length).collect();
    let area = decode(&format!("{prefix}{}", code.to_ascii_uppercase()))?;
    let mut center = area.center();

    // The reference prefix can pick the neighbouring cell; step to whichever
    // candidate is within half a cell of the reference.
    if reference.lat + half < center.lat && center.lat - resolution >= -90.0 {
        center.lat -= resolution;
    } else if reference.lat - half > center.lat && center.lat + resolution <= 90.0 {
        center.lat += resolution;
    }
    if reference.lng + half < center.lng {
        center.lng -= resolution;
    } else if reference.lng - half > center.lng {
        center.lng += resolution;
    }
    if center.lng >= 180.0 {
        center.lng -= 360.0;
    } else if center.lng < -180.0 {
        center.lng += 360.0;
    }

    Some(center)
}

/// First whitespace/comma separated token in `text` that is a valid code
pub fn find_code(text: &str) -> Option<&str> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .find(|token| token.contains(SEPARATOR) && is_valid(token))
}
