//! Pure ban heuristics over already-fetched data.

use super::{
    IpAggregate, IpUploadCheck, PeerWindowEntry, ProgressUploadCheck, RelativeUploadCheck, MIB,
};

/// Absolute check: the peer received far more than its reported progress
/// could account for, even after the error margin.
///
/// All of the following must hold:
/// - `uploaded / MiB >= start_mb`
/// - `uploaded >= total_size * start_percent / 100`
/// - `total_size * progress * anti_error_ratio < uploaded`
pub fn progress_upload_exceeded(
    check: &ProgressUploadCheck,
    total_size_bytes: i64,
    progress: f64,
    uploaded_bytes: i64,
) -> bool {
    let uploaded = uploaded_bytes as f64;
    let total_size = total_size_bytes as f64;
    let start_bytes = total_size * (check.start_percent / 100.0);
    let reported_download = total_size * progress;

    uploaded / MIB >= check.start_mb
        && uploaded >= start_bytes
        && reported_download * check.anti_error_ratio < uploaded
}

/// Relative check between two consecutive windows of the same IP.
///
/// The upload ratio is `last / current` on purpose: it measures how much of
/// the current upload had already happened last window.
pub fn relative_upload_exceeded(
    check: &RelativeUploadCheck,
    last: &PeerWindowEntry,
    current: &PeerWindowEntry,
) -> bool {
    if current.uploaded_bytes <= 0 {
        return false;
    }

    let relative_uploaded_mb =
        current.uploaded_bytes.saturating_sub(last.uploaded_bytes) as f64 / MIB;
    let relative_ratio = last.uploaded_bytes as f64 / current.uploaded_bytes as f64;
    let peer_report_ratio = if current.progress > 0.0 {
        last.progress / current.progress
    } else {
        0.0
    };

    relative_uploaded_mb > check.start_mb
        && relative_ratio > check.start_percent / 100.0
        && relative_ratio > peer_report_ratio * check.anti_error_ratio
}

/// Aggregate upload increment of one IP across every torrent, in MiB.
pub fn ip_upload_increment_mb(current: &IpAggregate, last: Option<&IpAggregate>) -> f64 {
    current.uploaded_since(last) as f64 / MIB
}

/// IP check: the window's aggregate increment exceeds the threshold.
pub fn ip_upload_exceeded(check: &IpUploadCheck, increment_mb: f64) -> bool {
    increment_mb > check.increment_mb
}
