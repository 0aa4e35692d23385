//! Reporter trait for dependency injection
//!
//! This trait allows the installer to report progress and status without
//! being coupled to a specific console or GUI implementation. Every method
//! is fire-and-forget: implementations must not block the caller and must
//! never fail, since reporting is best-effort.

/// Coarse phase of a run, used to label progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Stopping a running instance of the product.
    Stopping,
    /// Querying the catalog.
    Resolving,
    /// Downloading the package archive.
    Downloading,
    /// Moving the current install aside and unpacking the new one.
    Extracting,
    /// Creating shortcuts and uninstall entries.
    Registering,
    /// Starting the installed program.
    Launching,
}

/// Sink for user-facing progress.
pub trait Reporter: Send + Sync {
    /// Human-readable status line (e.g. "Downloading Emby Server (version 4.1.0.0)...").
    fn status(&self, message: &str);

    /// A new phase has started.
    fn phase(&self, phase: Phase);

    /// Percentage (0-100) of the current phase.
    fn progress(&self, percent: f64);

    /// Log a warning that does not fail the run.
    fn warning(&self, message: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn status(&self, message: &str) {
        (**self).status(message)
    }
    fn phase(&self, phase: Phase) {
        (**self).phase(phase)
    }
    fn progress(&self, percent: f64) {
        (**self).progress(percent)
    }
    fn warning(&self, message: &str) {
        (**self).warning(message)
    }
}

/// A no-op reporter for silent operations (e.g. testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn status(&self, _: &str) {}
    fn phase(&self, _: Phase) {}
    fn progress(&self, _: f64) {}
    fn warning(&self, _: &str) {}
}

/// Convert a byte count into a whole percentage, clamped to 0-100.
///
/// Returns `None` when the total is unknown.
pub fn percent(current: u64, total: Option<u64>) -> Option<f64> {
    let total = total.filter(|&t| t > 0)?;
    let pct = (current as f64 / total as f64) * 100.0;
    Some(pct.clamp(0.0, 100.0).floor())
}
