use crate::results::{RunStatus, RunSummary};
use crate::session::{CompletionHandler, InteractionMode, RequestKind, WizardState};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Session events for real-time updates
#[derive(Debug, Clone)]
pub enum WizardEvent {
    // Session events
    SessionStarted {
        session_id: String,
        total_steps: usize,
    },
    WizardFinished {
        total_steps: usize,
    },

    // Navigation events
    ModeChanged {
        mode: InteractionMode,
    },
    StepChanged {
        from: usize,
        to: usize,
        total: usize,
        title: String,
    },

    // Backend request events
    RequestStarted {
        kind: RequestKind,
    },
    RequestFinished {
        kind: RequestKind,
        ok: bool,
    },
    RunProgress {
        run_id: String,
        status: RunStatus,
        summary: RunSummary,
    },

    /// Transient user-facing message
    Notice {
        level: NoticeLevel,
        message: String,
    },
}

/// Event emitter for broadcasting wizard events
pub struct EventEmitter {
    sender: broadcast::Sender<WizardEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<WizardEvent>) {
        let (sender, receiver) = broadcast::channel(100);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: WizardEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WizardEvent> {
        self.sender.subscribe()
    }

    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.emit(WizardEvent::Notice {
            level,
            message: message.into(),
        });
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }
}

impl CompletionHandler for EventEmitter {
    fn wizard_finished(&mut self, state: &WizardState) {
        self.emit(WizardEvent::WizardFinished {
            total_steps: state.total_steps(),
        });
    }
}

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration as StdDuration;

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<WizardEvent>) {
        use colored::Colorize;
        use std::io::IsTerminal;

        let tty = std::io::stdout().is_terminal();
        let mut spinner: Option<ProgressBar> = None;

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::debug!("console listener skipped {} events", missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                WizardEvent::SessionStarted {
                    session_id,
                    total_steps,
                } => {
                    println!(
                        "\n{} Wizard session {} ({} steps)",
                        "▶".green().bold(),
                        session_id.cyan(),
                        total_steps
                    );
                }

                WizardEvent::WizardFinished { total_steps } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!(
                        "\n{} Wizard finished ({}/{})",
                        "■".blue().bold(),
                        total_steps,
                        total_steps
                    );
                }

                WizardEvent::ModeChanged { mode } => {
                    println!("  {} Mode: {}", "⇄".blue(), mode.to_string().yellow());
                }

                WizardEvent::StepChanged {
                    from,
                    to,
                    total,
                    title,
                } => {
                    let arrow = if to >= from { "→" } else { "←" };
                    println!(
                        "\n  {} Step {}/{}: {}",
                        arrow.blue(),
                        to,
                        total,
                        title.white().bold()
                    );
                }

                WizardEvent::RequestStarted { kind } => {
                    let pb = ProgressBar::new_spinner();
                    if !tty {
                        // Piped output: no escape codes
                        pb.set_draw_target(ProgressDrawTarget::hidden());
                    }
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("    {spinner} {msg}")
                    {
                        pb.set_style(style);
                    }
                    pb.set_message(format!("{}...", kind.to_string().dimmed()));
                    pb.enable_steady_tick(StdDuration::from_millis(100));
                    if let Some(old) = spinner.replace(pb) {
                        old.finish_and_clear();
                    }
                }

                WizardEvent::RequestFinished { kind, ok } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    let mark = if ok { "✓".green() } else { "✗".red() };
                    println!("    {} {}", mark, kind);
                }

                WizardEvent::RunProgress {
                    run_id,
                    status,
                    summary,
                } => {
                    let line = format!(
                        "run {} [{:?}] {} steps, {}% passed, avg {}ms",
                        run_id,
                        status,
                        summary.total_steps,
                        summary.success_rate,
                        summary.average_response_time
                    );
                    // A hidden spinner swallows its messages
                    match spinner.as_ref().filter(|_| tty) {
                        Some(pb) => pb.set_message(line),
                        None => println!("    {}", line.dimmed()),
                    }
                }

                WizardEvent::Notice { level, message } => {
                    let text = match level {
                        NoticeLevel::Info => format!("ℹ {}", message).blue(),
                        NoticeLevel::Warning => format!("⚠ {}", message).yellow(),
                        NoticeLevel::Error => format!("✗ {}", message).red(),
                    };
                    match spinner.as_ref().filter(|_| tty) {
                        Some(pb) => pb.println(format!("    {}", text)),
                        None => println!("    {}", text),
                    }
                }
            }
        }

        if let Some(pb) = spinner.take() {
            pb.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitter_reaches_subscribers() {
        let (emitter, mut rx) = EventEmitter::new();
        let mut late = emitter.subscribe();
        emitter.notice(NoticeLevel::Warning, "no service selected");

        for receiver in [&mut rx, &mut late] {
            match receiver.try_recv() {
                Ok(WizardEvent::Notice { level, message }) => {
                    assert_eq!(level, NoticeLevel::Warning);
                    assert_eq!(message, "no service selected");
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn test_completion_handler_emits_finished() {
        let (mut emitter, mut rx) = EventEmitter::new();
        let state = WizardState::new(4).unwrap();
        emitter.wizard_finished(&state);
        assert!(matches!(
            rx.try_recv(),
            Ok(WizardEvent::WizardFinished { total_steps: 4 })
        ));
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let emitter = EventEmitter::default();
        emitter.emit(WizardEvent::ModeChanged {
            mode: InteractionMode::Management,
        });
    }
}
