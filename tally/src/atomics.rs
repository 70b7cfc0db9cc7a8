//! Atomic storage for floating point cell values.
//!
//! Cell values and timestamps are 64-bit floats stored as raw bits inside an
//! `AtomicU64`, so every update is a single atomic operation and readers can
//! never observe a torn value.
//!
//! We always require a 64-bit atomic regardless of whether the standard
//! library exposes one for the target architecture, hence the fallback to
//! `portable-atomic` on 32-bit targets.

use std::sync::atomic::Ordering;

#[cfg(target_pointer_width = "32")]
pub(crate) use portable_atomic::AtomicU64;
#[cfg(not(target_pointer_width = "32"))]
pub(crate) use std::sync::atomic::AtomicU64;

pub(crate) fn new_f64(value: f64) -> AtomicU64 {
    AtomicU64::new(value.to_bits())
}

pub(crate) fn load_f64(atom: &AtomicU64) -> f64 {
    f64::from_bits(atom.load(Ordering::Acquire))
}

pub(crate) fn store_f64(atom: &AtomicU64, value: f64) {
    atom.store(value.to_bits(), Ordering::Release);
}

pub(crate) fn add_f64(atom: &AtomicU64, delta: f64) {
    let _ = atom.fetch_update(Ordering::AcqRel, Ordering::Relaxed, |curr| {
        Some((f64::from_bits(curr) + delta).to_bits())
    });
}

pub(crate) fn sub_f64(atom: &AtomicU64, delta: f64) {
    let _ = atom.fetch_update(Ordering::AcqRel, Ordering::Relaxed, |curr| {
        Some((f64::from_bits(curr) - delta).to_bits())
    });
}

pub(crate) fn swap_f64(atom: &AtomicU64, value: f64) {
    let _ = atom.swap(value.to_bits(), Ordering::AcqRel);
}

/// Atomically raises the stored value to `value` if it is strictly greater.
///
/// Returns `true` if the stored value was actually raised.
pub(crate) fn max_f64(atom: &AtomicU64, value: f64) -> bool {
    atom.fetch_update(Ordering::AcqRel, Ordering::Relaxed, |curr| {
        (value > f64::from_bits(curr)).then(|| value.to_bits())
    })
    .is_ok()
}
