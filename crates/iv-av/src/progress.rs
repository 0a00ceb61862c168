//! Parser for ffmpeg's periodic status line.
//!
//! ffmpeg reports progress on stderr as a single line rewritten with `\r`:
//!
//! ```text
//! frame= 2040 fps=510 q=-1.0 size=   45210kB time=00:01:21.57 bitrate=4539.8kbits/s speed=22.9x
//! ```
//!
//! [`parse`] extracts the encoded media time, bitrate, speed and output
//! size. Anything that is not a status line yields `None`; callers ignore
//! those lines rather than treating them as errors.

use serde::{Deserialize, Serialize};

/// One parsed ffmpeg status line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncodeProgress {
    /// Media time encoded so far, in seconds.
    pub elapsed_secs: f64,
    /// Output bitrate in kbit/s, `None` when ffmpeg prints `N/A`.
    pub bitrate_kbps: Option<f64>,
    /// Encoding speed as a multiple of real time.
    pub speed: Option<f64>,
    /// Output size in bytes.
    pub size_bytes: Option<u64>,
}

/// Keys that must all be present, in this order.
const REQUIRED_KEYS: [&str; 4] = ["size", "time", "bitrate", "speed"];

/// Parse one line of ffmpeg output.
pub fn parse(line: &str) -> Option<EncodeProgress> {
    let fields = key_values(line);

    let mut values = [""; REQUIRED_KEYS.len()];
    let mut cursor = 0;
    for (i, key) in REQUIRED_KEYS.iter().enumerate() {
        let offset = fields[cursor..].iter().position(|(k, _)| k == key)?;
        values[i] = fields[cursor + offset].1;
        cursor += offset + 1;
    }
    let [size, time, bitrate, speed] = values;

    Some(EncodeProgress {
        elapsed_secs: parse_timestamp(time)?,
        bitrate_kbps: parse_bitrate(bitrate),
        speed: parse_speed(speed),
        size_bytes: parse_size(size),
    })
}

/// Split a status line into `key=value` pairs.
///
/// ffmpeg right-aligns numbers after `=` (`size=    45210kB`), so a token
/// ending in `=` takes the following token as its value.
fn key_values(line: &str) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    let mut tokens = line.split_whitespace();
    while let Some(token) = tokens.next() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        if value.is_empty() {
            let padded = tokens.next().unwrap_or("");
            out.push((key, padded));
        } else {
            out.push((key, value));
        }
    }
    out
}

/// Parse `HH:MM:SS[.frac]` into seconds.
///
/// Negative timestamps, which ffmpeg prints before the first packet, clamp
/// to zero.
pub fn parse_timestamp(s: &str) -> Option<f64> {
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    let mut parts = s.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }

    let total = (hours * 3600 + minutes * 60) as f64 + seconds;
    Some(if negative { 0.0 } else { total })
}

fn parse_bitrate(s: &str) -> Option<f64> {
    let number = s.strip_suffix("kbits/s").unwrap_or(s);
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_speed(s: &str) -> Option<f64> {
    let number = s.strip_suffix('x').unwrap_or(s);
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_size(s: &str) -> Option<u64> {
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let n: u64 = digits.parse().ok()?;
    let multiplier: u64 = match unit {
        "" | "B" => 1,
        "kB" | "KiB" => 1 << 10,
        "mB" | "MB" | "MiB" => 1 << 20,
        "gB" | "GB" | "GiB" => 1 << 30,
        _ => return None,
    };
    n.checked_mul(multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_status_line() {
        let p = parse("size=45210kB time=00:01:21.57 bitrate=4539.8kbits/s speed=22.9x").unwrap();
        assert!((p.elapsed_secs - 81.57).abs() < 1e-9);
        assert_eq!(p.bitrate_kbps, Some(4539.8));
        assert_eq!(p.speed, Some(22.9));
        assert_eq!(p.size_bytes, Some(45210 * 1024));
    }

    #[test]
    fn parses_full_ffmpeg_line_with_padding() {
        let line = "frame= 2040 fps=510 q=-1.0 size=    45210kB time=00:01:21.57 bitrate=4539.8kbits/s speed=22.9x    ";
        let p = parse(line).unwrap();
        assert!((p.elapsed_secs - 81.57).abs() < 1e-9);
        assert_eq!(p.speed, Some(22.9));
    }

    #[test]
    fn tolerates_tokens_between_keys() {
        let line = "size=  1024KiB time=01:00:00.00 bitrate= 128.0kbits/s dup=0 drop=3 speed=1.01x elapsed=0:00:10.00";
        let p = parse(line).unwrap();
        assert_eq!(p.elapsed_secs, 3600.0);
        assert_eq!(p.bitrate_kbps, Some(128.0));
        assert_eq!(p.speed, Some(1.01));
        assert_eq!(p.size_bytes, Some(1024 * 1024));
    }

    #[test]
    fn missing_speed_is_not_progress() {
        assert_eq!(parse("size=45210kB time=00:01:21.57 bitrate=4539.8kbits/s"), None);
    }

    #[test]
    fn keys_out_of_order_are_not_progress() {
        assert_eq!(
            parse("time=00:01:21.57 size=45210kB bitrate=4539.8kbits/s speed=22.9x"),
            None
        );
    }

    #[test]
    fn not_available_values_become_none() {
        let p = parse("size=N/A time=00:00:05.00 bitrate=N/A speed=N/A").unwrap();
        assert_eq!(p.elapsed_secs, 5.0);
        assert_eq!(p.bitrate_kbps, None);
        assert_eq!(p.speed, None);
        assert_eq!(p.size_bytes, None);
    }

    #[test]
    fn unparsable_time_is_not_progress() {
        assert_eq!(parse("size=1kB time=N/A bitrate=1.0kbits/s speed=1x"), None);
        assert_eq!(parse("size=1kB time=garbage bitrate=1.0kbits/s speed=1x"), None);
    }

    #[test]
    fn ordinary_output_is_ignored() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("Input #0, matroska,webm, from 'clip.mkv':"), None);
        assert_eq!(parse("  Stream #0:1: Audio: aac (LC), 48000 Hz, stereo"), None);
    }

    #[test]
    fn timestamps() {
        assert_eq!(parse_timestamp("00:00:00.00"), Some(0.0));
        assert_eq!(parse_timestamp("01:02:03.5"), Some(3723.5));
        assert_eq!(parse_timestamp("-00:00:00.04"), Some(0.0));
        assert_eq!(parse_timestamp("00:61:00"), None);
        assert_eq!(parse_timestamp("12:00"), None);
        assert_eq!(parse_timestamp("1:2:3:4"), None);
    }

    #[test]
    fn size_units() {
        assert_eq!(parse_size("512B"), Some(512));
        assert_eq!(parse_size("2MiB"), Some(2 * 1024 * 1024));
        assert_eq!(parse_size("7parsecs"), None);
    }
}
