//! Outgoing photo email.
//!
//! The show only needs "send this file to these people"; transport lives
//! behind `EmailSender`. `LogEmailSender` records the send in the log and
//! always succeeds.

use std::path::Path;

use anyhow::{Result, bail};
use log::info;

use crate::config::EmailIdentity;

pub trait EmailSender {
    /// Send the photo at `path` to every recipient, with `title` as subject.
    fn send(&self, from: &EmailIdentity, title: &str, path: &Path, recipients: &[String]) -> Result<()>;
}

/// Sender that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, from: &EmailIdentity, title: &str, path: &Path, recipients: &[String]) -> Result<()> {
        if recipients.is_empty() {
            bail!("No recipients");
        }
        info!(
            "Email from {} <{}> to {}: \"{}\" ({})",
            from.name,
            from.address,
            recipients.join(", "),
            title,
            path.display()
        );
        Ok(())
    }
}
