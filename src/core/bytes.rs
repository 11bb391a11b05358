//! Human-readable byte formatting for notifications and log output.

/// Convert a byte count to a human-readable size string.
///
/// Walks the unit ladder B → KB → MB → GB → TB, dividing by 1024 until the
/// value fits, and formats with two decimals: `1024` → `"1.00 KB"`,
/// `500` → `"500.00 B"`. Values past the TB range fall back to the
/// TB-scaled number, still with two decimals but without a unit.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn convert_bytes(size: u64) -> String {
    let mut value = size as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if value < 1024.0 {
            return format!("{value:3.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:3.2}")
}
