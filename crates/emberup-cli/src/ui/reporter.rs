use std::sync::mpsc::Sender;

use emberup_core::{Phase, Reporter};

use super::actor::UiEvent;

/// Forwards installer progress to the UI actor. Sends never block, and a
/// closed channel is ignored.
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    sender: Sender<UiEvent>,
}

impl ConsoleReporter {
    pub fn new(sender: Sender<UiEvent>) -> Self {
        Self { sender }
    }
}

impl Reporter for ConsoleReporter {
    fn status(&self, message: &str) {
        let _ = self.sender.send(UiEvent::Status(message.to_string()));
    }

    fn phase(&self, phase: Phase) {
        let _ = self.sender.send(UiEvent::Phase(phase));
    }

    fn progress(&self, percent: f64) {
        let _ = self.sender.send(UiEvent::Progress(percent));
    }

    fn warning(&self, message: &str) {
        let _ = self.sender.send(UiEvent::Warning(message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_events_are_forwarded_in_order() {
        let (tx, rx) = mpsc::channel();
        let reporter = ConsoleReporter::new(tx);

        reporter.phase(Phase::Downloading);
        reporter.progress(50.0);
        reporter.status("done");

        assert!(matches!(rx.recv().unwrap(), UiEvent::Phase(Phase::Downloading)));
        assert!(matches!(rx.recv().unwrap(), UiEvent::Progress(p) if (p - 50.0).abs() < f64::EPSILON));
        assert!(matches!(rx.recv().unwrap(), UiEvent::Status(s) if s == "done"));
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        ConsoleReporter::new(tx).warning("nobody listening");
    }
}
