//! Status Report
//!
//! Groups transfers by their last known remote status.

use super::types::{Transfer, TransferState};

pub const REPORT_HEADER: &str = "Attempt finished, these are the transaction statuses at the end:";

/// Label of the group whose status is not known yet
pub const UNKNOWN_STATUS: &str = "None";

/// Render the per-status grouping of a batch
///
/// Groups appear in order of first appearance; members keep load order.
pub fn render(transfers: &[Transfer], states: &[TransferState]) -> String {
    let mut groups: Vec<(&str, Vec<&Transfer>)> = Vec::new();
    for (transfer, state) in transfers.iter().zip(states) {
        let status = state.remote_status.as_deref().unwrap_or(UNKNOWN_STATUS);
        match groups.iter_mut().find(|(s, _)| *s == status) {
            Some((_, members)) => members.push(transfer),
            None => groups.push((status, vec![transfer])),
        }
    }

    let mut report = String::from(REPORT_HEADER);
    report.push('\n');
    for (status, members) in groups {
        report.push_str(status);
        report.push_str(":\n");
        for transfer in members {
            report.push_str(&transfer.to_string());
            report.push('\n');
        }
    }
    report
}
