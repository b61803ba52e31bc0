//! Alert email delivery.

use crate::errors::ReportError;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl AlertEmail {
    /// Plain-text RFC 5322 message, as read by `sendmail -t`.
    pub fn to_message(&self) -> String {
        format!(
            "From: {}\nTo: {}\nSubject: {}\nContent-Type: text/plain; charset=utf-8\n\n{}\n",
            self.from,
            self.to.join(", "),
            self.subject,
            self.body
        )
    }

    /// What a dry run prints instead of sending.
    pub fn dry_run_text(&self) -> String {
        format!(
            "Dry-run mode. Would have sent:\n\
             ==============================\n   \
             From: {}\n     \
             To: {}\n\
             Subject: {}\n   \
             Body: {}\n",
            self.from,
            self.to.join(", "),
            self.subject,
            self.body
        )
    }
}

pub trait AlertSender {
    fn send(&self, email: &AlertEmail) -> Result<(), ReportError>;
}

/// Prints alerts to stdout.
#[derive(Debug, Default)]
pub struct DryRunSender;

impl AlertSender for DryRunSender {
    fn send(&self, email: &AlertEmail) -> Result<(), ReportError> {
        print!("{}", email.dry_run_text());
        Ok(())
    }
}

/// Pipes alerts into a local mail command such as `sendmail -t`.
#[derive(Debug, Clone)]
pub struct CommandSender {
    program: String,
    args: Vec<String>,
}

impl CommandSender {
    /// Split a command line on whitespace into program and arguments.
    pub fn from_command_line(command_line: &str) -> Result<Self, ReportError> {
        let mut words = command_line.split_whitespace().map(str::to_string);
        let program = words.next().ok_or(ReportError::MissingSetting {
            name: "alerts.mail_command",
        })?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }
}

impl AlertSender for CommandSender {
    fn send(&self, email: &AlertEmail) -> Result<(), ReportError> {
        let failed = |message: String| ReportError::AlertFailed { message };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| failed(format!("could not start '{}': {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(email.to_message().as_bytes())
                .map_err(|e| failed(format!("could not write message: {}", e)))?;
        }

        let status = child
            .wait()
            .map_err(|e| failed(format!("'{}' did not finish: {}", self.program, e)))?;
        if !status.success() {
            return Err(failed(format!("'{}' exited with {}", self.program, status)));
        }

        info!(subject = %email.subject, recipients = email.to.len(), "sent alert");
        Ok(())
    }
}
