#[cfg(test)]
use std::cell::RefCell;
use std::fs::OpenOptions;
use std::io::{self, Write};

use anyhow::Context;
use ash::vk;
use log::{info, warn};
use memtrack_shared::ReportTarget;
use memtrack_stats::MemoryReport;

use crate::layer;

#[cfg(test)]
thread_local! {
    static REDIRECT: RefCell<Option<ReportTarget>> = const { RefCell::new(None) };
}

/// Sends the reports of devices destroyed on this thread to `target` instead of the configured one.
#[cfg(test)]
pub fn redirect(target: ReportTarget) {
    REDIRECT.set(Some(target));
}

#[cfg(not(test))]
fn target() -> ReportTarget {
    layer().config().report.clone()
}

#[cfg(test)]
fn target() -> ReportTarget {
    REDIRECT
        .with_borrow(Clone::clone)
        .unwrap_or_else(|| layer().config().report.clone())
}

/// Writes the memory report of a destroyed device to the configured target.
pub fn emit(device: vk::Device, report: &MemoryReport) {
    let target = target();
    info!(
        "Device {device:?} peaked at {} bytes of device memory and {} bytes of host memory",
        report.device_local_total, report.host_total
    );

    if let Err(err) = write_report(&target, report) {
        warn!("Failed to write the memory report: {err:#}");
        eprint!("{report}");
    }
}

/// Writes the whole report with a single write, so reports of devices destroyed concurrently don't
/// interleave.
fn write_report(target: &ReportTarget, report: &MemoryReport) -> anyhow::Result<()> {
    let text = report.to_string();
    match target {
        ReportTarget::Stdout => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
        ReportTarget::Stderr => io::stderr().lock().write_all(text.as_bytes())?,
        ReportTarget::File(path) => OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open report file {}", path.display()))?
            .write_all(text.as_bytes())
            .with_context(|| format!("Failed to write report file {}", path.display()))?,
    }

    Ok(())
}
