//! Time-decay encoding of "last observed" timestamps.
//!
//! An alert whose condition was seen recently renders calm; the color moves
//! towards urgent as the observation ages, saturating at six days. The label
//! reports the actual elapsed time in a single coarse unit.

use std::fmt;

use chrono::{DateTime, Utc};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;

/// Ages at or beyond this render fully urgent.
pub const UPPER_LIMIT_SECONDS: i64 = 6 * DAY;

/// calm -> warning -> urgent
pub const DEFAULT_PALETTE: [Rgb; 3] = [
    Rgb::new(0x6e, 0xa0, 0x94),
    Rgb::new(0xf1, 0x8a, 0x81),
    Rgb::new(0xd9, 0x5a, 0x79),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Rendered freshness of one alert.
#[derive(Debug, Clone, PartialEq)]
pub struct Freshness {
    /// Seconds since the last observation, never negative.
    pub age_seconds: i64,
    /// 0.0 (just seen) to 1.0 (seen `UPPER_LIMIT_SECONDS` ago or earlier).
    pub urgency: f64,
    pub color: Rgb,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Lab {
    l: f64,
    a: f64,
    b: f64,
}

impl Lab {
    fn lerp(self, other: Lab, f: f64) -> Lab {
        Lab {
            l: self.l + (other.l - self.l) * f,
            a: self.a + (other.a - self.a) * f,
            b: self.b + (other.b - self.b) * f,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FreshnessEncoder {
    stops: Vec<Lab>,
    upper_limit_seconds: i64,
}

impl Default for FreshnessEncoder {
    fn default() -> Self {
        Self::new(&DEFAULT_PALETTE, UPPER_LIMIT_SECONDS)
    }
}

impl FreshnessEncoder {
    /// Stops are spread evenly over the urgency range. A palette with fewer than
    /// two colors falls back to the default palette.
    pub fn new(palette: &[Rgb], upper_limit_seconds: i64) -> Self {
        let palette = if palette.len() < 2 {
            &DEFAULT_PALETTE[..]
        } else {
            palette
        };
        Self {
            stops: palette.iter().copied().map(rgb_to_lab).collect(),
            upper_limit_seconds: upper_limit_seconds.max(1),
        }
    }

    /// `None` when the alert has never matched.
    pub fn encode(
        &self,
        last_observed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<Freshness> {
        let last_observed_at = last_observed_at?;
        let age_seconds = (now - last_observed_at).num_seconds().max(0);
        let urgency = self.urgency(age_seconds);

        Some(Freshness {
            age_seconds,
            urgency,
            color: self.color_at(urgency),
            label: format_age(age_seconds),
        })
    }

    pub fn urgency(&self, age_seconds: i64) -> f64 {
        age_seconds.clamp(0, self.upper_limit_seconds) as f64 / self.upper_limit_seconds as f64
    }

    /// Interpolate the palette in CIE L*a*b* at position `t` (clamped to [0, 1]).
    pub fn color_at(&self, t: f64) -> Rgb {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let segments = self.stops.len() - 1;
        let scaled = t * segments as f64;
        let index = (scaled.floor() as usize).min(segments - 1);
        let f = scaled - index as f64;
        lab_to_rgb(self.stops[index].lerp(self.stops[index + 1], f))
    }
}

/// Coarsest applicable unit, whole units only: "2 w", "1 d", "50 m", "30 s".
///
/// Counts are truncated, never rounded, so 90 s reads "1 m" and 6 d 23 h reads
/// "6 d" rather than a rounded-up "7 d" that would contradict the unit choice.
pub fn format_age(age_seconds: i64) -> String {
    let age = age_seconds.max(0);
    let (value, unit) = if age >= WEEK {
        (age / WEEK, "w")
    } else if age >= DAY {
        (age / DAY, "d")
    } else if age >= HOUR {
        (age / HOUR, "h")
    } else if age >= MINUTE {
        (age / MINUTE, "m")
    } else {
        (age, "s")
    };
    format!("{value} {unit}")
}

// D65 reference white
const XN: f64 = 0.950_470;
const YN: f64 = 1.0;
const ZN: f64 = 1.088_830;

const T0: f64 = 4.0 / 29.0;
const T1: f64 = 6.0 / 29.0;
const T2: f64 = 3.0 * T1 * T1;
const T3: f64 = T1 * T1 * T1;

fn rgb_to_lab(color: Rgb) -> Lab {
    let r = srgb_to_linear(color.r);
    let g = srgb_to_linear(color.g);
    let b = srgb_to_linear(color.b);

    let x = xyz_to_lab((0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b) / XN);
    let y = xyz_to_lab((0.212_672_9 * r + 0.715_152_2 * g + 0.072_175_0 * b) / YN);
    let z = xyz_to_lab((0.019_333_9 * r + 0.119_192_0 * g + 0.950_304_1 * b) / ZN);

    Lab {
        l: (116.0 * y - 16.0).max(0.0),
        a: 500.0 * (x - y),
        b: 200.0 * (y - z),
    }
}

fn lab_to_rgb(lab: Lab) -> Rgb {
    let fy = (lab.l + 16.0) / 116.0;
    let fx = fy + lab.a / 500.0;
    let fz = fy - lab.b / 200.0;

    let x = XN * lab_to_xyz(fx);
    let y = YN * lab_to_xyz(fy);
    let z = ZN * lab_to_xyz(fz);

    Rgb {
        r: linear_to_srgb(3.240_454_2 * x - 1.537_138_5 * y - 0.498_531_4 * z),
        g: linear_to_srgb(-0.969_266_0 * x + 1.876_010_8 * y + 0.041_556_0 * z),
        b: linear_to_srgb(0.055_643_4 * x - 0.204_025_9 * y + 1.057_225_2 * z),
    }
}

fn srgb_to_linear(channel: u8) -> f64 {
    let v = f64::from(channel) / 255.0;
    if v <= 0.040_45 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(v: f64) -> u8 {
    let encoded = if v <= 0.003_04 {
        12.92 * v
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    };
    (255.0 * encoded).round().clamp(0.0, 255.0) as u8
}

fn xyz_to_lab(t: f64) -> f64 {
    if t > T3 {
        t.cbrt()
    } else {
        t / T2 + T0
    }
}

fn lab_to_xyz(t: f64) -> f64 {
    if t > T1 {
        t * t * t
    } else {
        T2 * (t - T0)
    }
}
