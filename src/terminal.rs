//! Terminal front end for job questions, progress and change notifications.

use std::io::{BufRead, Write};
use std::sync::{Mutex, PoisonError};

use ferry_core::{
    ChangeNotifier, ConflictRequest, ConflictResponse, Location, ProgressSink, UserInteraction, WarnOption, Warning,
};

/// Asks questions on stderr and reads answers from stdin.
///
/// Only one question is shown at a time.
#[derive(Debug, Default)]
pub struct TerminalInteraction {
    prompt: Mutex<()>,
}

impl TerminalInteraction {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_answer(&self, question: &str) -> Option<String> {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "{question} ");
        let _ = stderr.flush();
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

fn option_key(option: WarnOption) -> &'static str {
    match option {
        WarnOption::Cancel => "c",
        WarnOption::Skip => "s",
        WarnOption::SkipAll => "S",
        WarnOption::Retry => "r",
        WarnOption::Delete => "d",
        WarnOption::DeleteAll => "D",
        WarnOption::SkipFiles => "f",
    }
}

impl UserInteraction for TerminalInteraction {
    fn warn(&self, warning: &Warning) -> WarnOption {
        let _guard = self.prompt.lock().unwrap_or_else(PoisonError::into_inner);
        eprintln!();
        eprintln!("{}", warning.primary);
        if !warning.secondary.is_empty() {
            eprintln!("  {}", warning.secondary);
        }
        if let Some(details) = &warning.details {
            eprintln!("  {details}");
        }

        let choices: Vec<String> = warning
            .options
            .iter()
            .map(|option| format!("[{}] {}", option_key(*option), option.label()))
            .collect();
        loop {
            let Some(answer) = self.read_answer(&choices.join("  ")) else {
                return WarnOption::Cancel;
            };
            if let Some(option) = warning
                .options
                .iter()
                .copied()
                .find(|option| option_key(*option) == answer)
            {
                return option;
            }
        }
    }

    fn resolve_conflict(&self, conflict: &ConflictRequest) -> ConflictResponse {
        let _guard = self.prompt.lock().unwrap_or_else(PoisonError::into_inner);
        let what = if conflict.is_merge { "folder" } else { "file" };
        eprintln!();
        eprintln!(
            "A {what} named \"{}\" already exists in \"{}\".",
            conflict.destination.display_name(),
            conflict.dest_dir
        );
        let replace = if conflict.is_merge { "merge" } else { "replace" };

        loop {
            let question = format!(
                "[s]kip  [r] {replace}  [n]ewest  [R]ename  [c]ancel  (append ! to apply to all)"
            );
            let Some(answer) = self.read_answer(&question) else {
                return ConflictResponse::cancel();
            };
            let (key, all) = match answer.strip_suffix('!') {
                Some(key) => (key, true),
                None => (answer.as_str(), false),
            };
            let response = match key {
                "s" => ConflictResponse::skip(),
                "r" => ConflictResponse::replace(),
                "n" => ConflictResponse::newest(),
                "c" => return ConflictResponse::cancel(),
                "R" => match self.read_answer("New name:") {
                    Some(name) if !name.is_empty() => ConflictResponse::rename(name),
                    _ => continue,
                },
                _ => continue,
            };
            return if all { response.apply_to_all() } else { response };
        }
    }
}

/// Writes status lines and a running counter to stderr.
#[derive(Debug, Default)]
pub struct TerminalProgress {
    status: Mutex<String>,
}

impl ProgressSink for TerminalProgress {
    fn set_status(&self, text: &str) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status != text {
            eprintln!("\r{text}");
            *status = text.to_string();
        }
    }

    fn set_details(&self, text: &str) {
        eprint!("\r  {text}\x1b[K");
    }

    fn update(&self, _current: u64, _total: u64) {}

    fn pulse(&self) {}
}

/// Logs flushed change batches.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl ChangeNotifier for LogNotifier {
    fn files_added(&self, files: &[Location]) {
        for file in files {
            tracing::debug!(target: "ferry::changes", file = %file, "added");
        }
    }

    fn files_changed(&self, files: &[Location]) {
        for file in files {
            tracing::debug!(target: "ferry::changes", file = %file, "changed");
        }
    }

    fn files_removed(&self, files: &[Location]) {
        for file in files {
            tracing::debug!(target: "ferry::changes", file = %file, "removed");
        }
    }

    fn files_moved(&self, moves: &[(Location, Location)]) {
        for (from, to) in moves {
            tracing::debug!(target: "ferry::changes", from = %from, to = %to, "moved");
        }
    }
}
