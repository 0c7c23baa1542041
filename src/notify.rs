//! [`crate::traits::Notifier`] implementations (spec.md §6, §4.8 mail
//! notification on large offset).
//!
//! Grounded in the teacher's use of `std::process::Command` to shell out to
//! an external program (`main.rs`'s `timedatectl`/`net stop` calls) — here
//! piping a message into a mailer the way `reference.c`'s `maybe_log_offset`
//! pipes into `popen("mail ...", "w")`.

use crate::traits::Notifier;
use anyhow::{bail, Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};

const DEFAULT_MAIL_PROGRAM: &str = "mail";

/// Pipes `subject`/`body` into a mailer process, one per notification.
pub struct ShellNotifier {
    mail_program: String,
}

impl ShellNotifier {
    pub fn new() -> Self {
        ShellNotifier { mail_program: DEFAULT_MAIL_PROGRAM.to_string() }
    }

    pub fn with_program(mail_program: impl Into<String>) -> Self {
        ShellNotifier { mail_program: mail_program.into() }
    }
}

impl Default for ShellNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for ShellNotifier {
    fn notify(&self, subject: &str, body: &str, user: &str) -> Result<()> {
        let mut child = Command::new(&self.mail_program)
            .arg(user)
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning mailer {}", self.mail_program))?;

        {
            let stdin = child.stdin.as_mut().context("mailer stdin unavailable")?;
            writeln!(stdin, "Subject: {subject}")?;
            writeln!(stdin)?;
            write!(stdin, "{body}")?;
        }

        let status = child.wait().context("waiting for mailer to exit")?;
        if !status.success() {
            bail!("mailer exited with {status}");
        }
        Ok(())
    }
}

/// Test double recording every call instead of spawning a process.
#[derive(Debug, Default)]
pub struct NullNotifier {
    pub calls: std::cell::RefCell<Vec<(String, String, String)>>,
}

impl NullNotifier {
    pub fn new() -> Self {
        NullNotifier::default()
    }
}

impl Notifier for NullNotifier {
    fn notify(&self, subject: &str, body: &str, user: &str) -> Result<()> {
        self.calls
            .borrow_mut()
            .push((subject.to_string(), body.to_string(), user.to_string()));
        Ok(())
    }
}
