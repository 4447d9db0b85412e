//! Commands typed at the interactive prompt.

use std::path::PathBuf;

use quantprep_core::SettingsPatch;

/// Usage text printed by `help`.
pub const HELP: &str = "\
Commands:
  <Enter> | next            Show the next set
  hint N                    Toggle the hint of question N
  solution N                Toggle the solution of question N
  set KEY VALUE             Change a setting (topic, custom_topic, difficulty, language, model)
  status                    Show settings and the current set
  save FILE                 Export the current set as JSON
  help                      Show this help
  quit                      Exit";

/// One parsed prompt line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Show the next set (swap the buffer or start a batch).
    Next,
    /// Toggle the hint of a 1-based question number.
    Hint(usize),
    /// Toggle the solution of a 1-based question number.
    Solution(usize),
    /// Apply a settings change.
    Set(SettingsPatch),
    /// Print settings and the current set.
    Status,
    /// Export the current set.
    Save(PathBuf),
    /// Print usage.
    Help,
    /// Leave the session.
    Quit,
}

impl ReplCommand {
    /// Parses one line of input.
    pub fn parse(line: &str) -> anyhow::Result<Self> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(word, rest)| (word, rest.trim()));

        match word.to_ascii_lowercase().as_str() {
            "" | "next" | "n" => Ok(Self::Next),
            "hint" | "h" => Ok(Self::Hint(question_number(rest)?)),
            "solution" | "s" => Ok(Self::Solution(question_number(rest)?)),
            "set" => {
                let (key, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                if key.is_empty() {
                    anyhow::bail!("Usage: set KEY VALUE");
                }
                Ok(Self::Set(SettingsPatch::from_key_value(key, value.trim())?))
            }
            "status" => Ok(Self::Status),
            "save" => {
                if rest.is_empty() {
                    anyhow::bail!("Usage: save FILE");
                }
                Ok(Self::Save(PathBuf::from(rest)))
            }
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => anyhow::bail!("Unknown command '{other}'. Type 'help' for a list of commands"),
        }
    }
}

fn question_number(arg: &str) -> anyhow::Result<usize> {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => anyhow::bail!("Expected a question number starting at 1, got '{arg}'"),
    }
}
