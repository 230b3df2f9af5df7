//! GGA sentence parsing.
//!
//! Only the "Global Positioning System Fix Data" sentence matters here;
//! every other NMEA sentence type is rejected by its leader. Both the
//! GPS-only (`$GPGGA`) and multi-constellation (`$GNGGA`) talkers are
//! accepted by the same path.
//!
//! Numeric conversion follows the receiver convention: an empty or
//! unparseable numeric token reads as zero, so a fix-less sentence still
//! parses (with zeroed position) rather than failing the save. Only a
//! sentence with fewer than 12 comma-separated tokens is malformed.

/// One parsed GGA fix.
#[derive(Debug, Clone, PartialEq)]
pub struct GgaFix {
    /// Raw UTC time-of-day token, e.g. `192928.00`.
    pub utc_time: String,
    /// Decimal degrees, negative south.
    pub latitude: f64,
    /// Decimal degrees, negative west.
    pub longitude: f64,
    pub fix_quality: u32,
    pub num_satellites: u32,
    pub hdop: f64,
    /// Meters above mean sea level.
    pub altitude: f64,
    /// Geoid separation in meters.
    pub geoid_height: f64,
}

/// Errors from GGA parsing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GgaError {
    #[error("not a GGA sentence")]
    WrongLeader,

    #[error("sentence too short: {0} tokens")]
    TooShort(usize),
}

/// Parses a `$GPGGA` / `$GNGGA` sentence into a fix.
pub fn parse_gga(line: &str) -> Result<GgaFix, GgaError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if !line.starts_with("$GPGGA,") && !line.starts_with("$GNGGA,") {
        return Err(GgaError::WrongLeader);
    }

    let tokens: Vec<&str> = line.split(',').collect();
    if tokens.len() < 12 {
        return Err(GgaError::TooShort(tokens.len()));
    }

    let latitude = nmea_to_decimal(tokens[2], tokens[3].chars().next());
    let longitude = nmea_to_decimal(tokens[4], tokens[5].chars().next());

    Ok(GgaFix {
        utc_time: tokens[1].to_string(),
        latitude,
        longitude,
        fix_quality: tokens[6].parse().unwrap_or(0),
        num_satellites: tokens[7].parse().unwrap_or(0),
        hdop: tokens[8].parse().unwrap_or(0.0),
        altitude: tokens[9].parse().unwrap_or(0.0),
        geoid_height: tokens[11].parse().unwrap_or(0.0),
    })
}

/// Renders a raw `hhmmss.ss` time-of-day token as `hh:mm:ss.ss` for
/// display. Tokens too short to split render as a placeholder.
pub fn format_utc(raw: &str) -> String {
    if raw.len() < 6 || !raw.is_char_boundary(2) || !raw.is_char_boundary(4) {
        return "--:--:--".into();
    }
    format!("{}:{}:{}", &raw[0..2], &raw[2..4], &raw[4..])
}

/// Converts a `ddmm.mmmm` / `dddmm.mmmm` magnitude plus hemisphere into
/// signed decimal degrees.
fn nmea_to_decimal(raw: &str, hemisphere: Option<char>) -> f64 {
    let value: f64 = raw.parse().unwrap_or(0.0);
    let degrees = (value / 100.0).trunc();
    let minutes = value - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;

    match hemisphere {
        Some('S') | Some('W') => -decimal,
        _ => decimal,
    }
}
