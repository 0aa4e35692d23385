//! UI Actor - Single-threaded event processing
//!
//! All console output is channeled through one thread so progress updates
//! from the installer never block on the terminal and never interleave.

use std::io::Write;
use std::sync::mpsc;
use std::thread;

use crossterm::style::Stylize;
use emberup_core::Phase;

/// Events that can be sent to the UI actor
#[derive(Debug)]
pub enum UiEvent {
    /// A new phase started
    Phase(Phase),
    /// Status line
    Status(String),
    /// Percentage of the current phase
    Progress(f64),
    /// Non-fatal problem
    Warning(String),
    /// Print success footer
    Success(String),
    /// Print error footer
    Error(String),
    /// Shutdown the actor
    Shutdown,
}

/// Handle to the UI actor thread
#[derive(Debug)]
pub struct UiActor {
    sender: mpsc::Sender<UiEvent>,
    handle: Option<thread::JoinHandle<()>>,
}

impl UiActor {
    /// Spawn a new UI actor thread. A quiet actor only prints footers and warnings.
    pub fn spawn(quiet: bool) -> Self {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::spawn(move || run_event_loop(&receiver, quiet));

        Self {
            sender,
            handle: Some(handle),
        }
    }

    /// Get a cloneable sender for this actor
    pub fn sender(&self) -> mpsc::Sender<UiEvent> {
        self.sender.clone()
    }

    /// Stop the actor once every queued event has been rendered.
    pub fn finish(mut self) {
        let _ = self.sender.send(UiEvent::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for UiActor {
    fn drop(&mut self) {
        let _ = self.sender.send(UiEvent::Shutdown);
    }
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Stopping => "Stopping",
        Phase::Resolving => "Resolving",
        Phase::Downloading => "Downloading",
        Phase::Extracting => "Installing",
        Phase::Registering => "Configuring",
        Phase::Launching => "Starting",
    }
}

fn end_line(mid_line: &mut bool) {
    if *mid_line {
        println!();
        *mid_line = false;
    }
}

/// Main event loop; runs on the actor thread.
fn run_event_loop(receiver: &mpsc::Receiver<UiEvent>, quiet: bool) {
    let mut stdout = std::io::stdout();
    let mut phase = None;
    // Whether the cursor sits at the end of a progress line.
    let mut mid_line = false;

    while let Ok(event) = receiver.recv() {
        match event {
            UiEvent::Phase(p) => {
                phase = Some(p);
                end_line(&mut mid_line);
            }
            UiEvent::Status(msg) if !quiet => {
                end_line(&mut mid_line);
                println!("{} {msg}", "::".dark_grey());
            }
            UiEvent::Progress(pct) if !quiet => {
                let label = phase.map_or("Working", phase_label);
                print!("\r   {}{pct:>3.0}%", format!("{label: <12}").cyan());
                let _ = stdout.flush();
                mid_line = true;
            }
            UiEvent::Status(_) | UiEvent::Progress(_) => {}
            UiEvent::Warning(msg) => {
                end_line(&mut mid_line);
                eprintln!("{} {msg}", "warning:".yellow().bold());
            }
            UiEvent::Success(msg) => {
                end_line(&mut mid_line);
                println!("{} {msg}", "✓".green().bold());
            }
            UiEvent::Error(msg) => {
                end_line(&mut mid_line);
                eprintln!("{} {msg}", "error:".red().bold());
            }
            UiEvent::Shutdown => {
                end_line(&mut mid_line);
                break;
            }
        }
    }
}
