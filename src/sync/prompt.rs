//! Interactive choices during conflict resolution.
//!
//! The resolver only talks to [`ConflictPrompter`]. [`TerminalPrompter`] is the
//! line-based implementation used by the binary; tests script their answers.

use anyhow::{anyhow, Result};
use std::io::{BufRead, Write};
use std::sync::Mutex;

use super::conflict::{ConflictReport, FieldConflict};

/// Which side a field value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceTag {
    Local,
    Remote,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChoice {
    pub value: String,
    pub tag: ChoiceTag,
}

impl FieldChoice {
    pub fn local(conflict: &FieldConflict) -> Self {
        Self {
            value: conflict.local_value.clone(),
            tag: ChoiceTag::Local,
        }
    }

    pub fn remote(conflict: &FieldConflict) -> Self {
        Self {
            value: conflict.remote_value.clone(),
            tag: ChoiceTag::Remote,
        }
    }
}

/// Whole-operation decision under the `manual` strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualChoice {
    Merge,
    Local,
    Remote,
    Abort,
}

pub trait ConflictPrompter: Send + Sync {
    /// Resolve one field conflict. `index` is 1-based.
    fn prompt_field_choice(
        &self,
        conflict: &FieldConflict,
        index: usize,
        total: usize,
    ) -> Result<FieldChoice>;

    /// Pick how to resolve the whole conflict list.
    fn choose_strategy(&self, report: &ConflictReport) -> Result<ManualChoice>;

    fn confirm(&self, message: &str) -> Result<bool>;
}

/// Shorten a secret for display: first 4 and last 4 characters.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.is_empty() {
        return "(empty)".to_string();
    }
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

fn display_value(conflict: &FieldConflict, value: &str) -> String {
    if conflict.field.is_secret() {
        mask_secret(value)
    } else if value.is_empty() {
        "(empty)".to_string()
    } else {
        value.to_string()
    }
}

/// Line-oriented prompter over any reader/writer pair.
pub struct TerminalPrompter {
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl TerminalPrompter {
    pub fn new(input: Box<dyn BufRead + Send>, output: Box<dyn Write + Send>) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    /// Read from stdin, prompt on stderr.
    pub fn stdio() -> Self {
        Self::new(
            Box::new(std::io::BufReader::new(std::io::stdin())),
            Box::new(std::io::stderr()),
        )
    }

    fn say(&self, text: &str) -> Result<()> {
        let mut out = self
            .output
            .lock()
            .map_err(|_| anyhow!("prompt output poisoned"))?;
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    fn read_line(&self) -> Result<String> {
        let mut input = self
            .input
            .lock()
            .map_err(|_| anyhow!("prompt input poisoned"))?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            anyhow::bail!("input closed");
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn ask(&self, question: &str) -> Result<String> {
        self.say(question)?;
        self.read_line()
    }
}

const MAX_ATTEMPTS: usize = 3;

impl ConflictPrompter for TerminalPrompter {
    fn prompt_field_choice(
        &self,
        conflict: &FieldConflict,
        index: usize,
        total: usize,
    ) -> Result<FieldChoice> {
        self.say(&format!(
            "\n[{}/{}] Mirror '{}': field '{}' differs\n  local : {} (modified {})\n  remote: {} (modified {}, device {})\n",
            index,
            total,
            conflict.mirror,
            conflict.field,
            display_value(conflict, &conflict.local_value),
            conflict.local_time.format("%Y-%m-%d %H:%M:%S"),
            display_value(conflict, &conflict.remote_value),
            conflict.remote_time.format("%Y-%m-%d %H:%M:%S"),
            conflict.remote_device,
        ))?;

        for _ in 0..MAX_ATTEMPTS {
            let answer = self.ask("Keep [l]ocal, take [r]emote, or [e]nter a new value? ")?;
            match answer.trim().to_ascii_lowercase().as_str() {
                "" | "l" | "local" => return Ok(FieldChoice::local(conflict)),
                "r" | "remote" => return Ok(FieldChoice::remote(conflict)),
                "e" | "enter" => {
                    let value = self.ask("New value: ")?;
                    return Ok(FieldChoice {
                        value: value.trim().to_string(),
                        tag: ChoiceTag::Custom,
                    });
                }
                other => self.say(&format!("Unrecognized choice '{}'\n", other))?,
            }
        }
        anyhow::bail!("no valid choice after {} attempts", MAX_ATTEMPTS)
    }

    fn choose_strategy(&self, report: &ConflictReport) -> Result<ManualChoice> {
        let mut listing = format!(
            "\n{} conflict(s) with the snapshot from device {}:\n",
            report.len(),
            if report.remote_device.is_empty() {
                "(unknown)"
            } else {
                report.remote_device.as_str()
            }
        );
        for conflict in &report.conflicts {
            listing.push_str(&format!("  - [{}] {}\n", conflict.kind, conflict.description));
        }
        self.say(&listing)?;

        for _ in 0..MAX_ATTEMPTS {
            let answer =
                self.ask("Resolve with [m]erge (recommended), [l]ocal, [r]emote, or [a]bort? ")?;
            match answer.trim().to_ascii_lowercase().as_str() {
                "" | "m" | "merge" => return Ok(ManualChoice::Merge),
                "l" | "local" => return Ok(ManualChoice::Local),
                "r" | "remote" => return Ok(ManualChoice::Remote),
                "a" | "abort" | "q" => return Ok(ManualChoice::Abort),
                other => self.say(&format!("Unrecognized choice '{}'\n", other))?,
            }
        }
        anyhow::bail!("no valid choice after {} attempts", MAX_ATTEMPTS)
    }

    fn confirm(&self, message: &str) -> Result<bool> {
        let answer = self.ask(&format!("{} [y/N] ", message))?;
        Ok(matches!(
            answer.trim().to_ascii_lowercase().as_str(),
            "y" | "yes"
        ))
    }
}
