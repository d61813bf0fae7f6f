/// Format a seconds total the way Hackatime renders its own, e.g.
/// `"2h 5m 30s"`. Used as a fallback when the upstream omits the
/// human readable string.
pub fn format_seconds(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{hours}h {minutes}m {seconds}s")
}
