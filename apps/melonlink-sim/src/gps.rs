//! Synthetic GPS feed.
//!
//! Emits well-formed GGA sentences that wander away from a starting
//! fix, deterministic for a given seed so simulator runs are
//! reproducible. The walk stand-in for a receiver: magnitude fields use
//! the `ddmm.mmmm` convention and every sentence carries a valid NMEA
//! checksum.

/// Deterministic GGA sentence generator.
pub struct FakeGps {
    /// Decimal degrees, positive north.
    lat: f64,
    /// Decimal degrees, positive east.
    lon: f64,
    seconds: u32,
    state: u64,
}

impl FakeGps {
    /// Starts the walk at the given fix.
    pub fn new(lat: f64, lon: f64, seed: u64) -> Self {
        Self {
            lat,
            lon,
            seconds: 19 * 3600 + 29 * 60 + 28,
            state: seed | 1,
        }
    }

    /// Next pseudo-random step in [-0.5, 0.5).
    fn step(&mut self) -> f64 {
        // xorshift64; plenty for a field walk.
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        (self.state >> 11) as f64 / (1u64 << 53) as f64 - 0.5
    }

    /// Produces the next sentence, advancing time and position.
    pub fn next_sentence(&mut self) -> String {
        self.lat += self.step() * 1e-4;
        self.lon += self.step() * 1e-4;
        self.seconds = (self.seconds + 1) % 86_400;

        let hh = self.seconds / 3600;
        let mm = (self.seconds % 3600) / 60;
        let ss = self.seconds % 60;

        let (lat_mag, lat_hemi) = to_nmea(self.lat, 'N', 'S');
        let (lon_mag, lon_hemi) = to_nmea(self.lon, 'E', 'W');

        let body = format!(
            "GNGGA,{hh:02}{mm:02}{ss:02}.00,{lat_mag:09.4},{lat_hemi},{lon_mag:010.4},{lon_hemi},1,08,0.9,10.0,M,-34.0,M,,",
        );
        let checksum = body.bytes().fold(0u8, |a, b| a ^ b);
        format!("${body}*{checksum:02X}\r\n")
    }
}

/// Splits signed decimal degrees into NMEA magnitude and hemisphere.
fn to_nmea(decimal: f64, positive: char, negative: char) -> (f64, char) {
    let hemi = if decimal < 0.0 { negative } else { positive };
    let abs = decimal.abs();
    let degrees = abs.trunc();
    let minutes = (abs - degrees) * 60.0;
    (degrees * 100.0 + minutes, hemi)
}
