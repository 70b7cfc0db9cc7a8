use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as fractional seconds since the Unix epoch.
///
/// This is the clock used for cell last-changed timestamps and for the push
/// exporter's emission bookkeeping.  A pre-epoch system clock reads as 0.
pub fn epoch_seconds() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}
