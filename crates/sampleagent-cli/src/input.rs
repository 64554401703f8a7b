//! Line input handling for the console.
//!
//! Each line the courier types is translated into an `Action` for the core,
//! or into one of the console's own commands (help, redraw, quit).

use sampleagent_core::dispatch::DraftField;
use sampleagent_core::models::{IssueKind, Priority, Theme, TipCategory};
use sampleagent_core::{Action, Section};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Action(Action),
    Help,
    Redraw,
    Quit,
}

pub const HELP: &str = "\
Sections:   1-5 or dashboard | tracking | chat | tips | report
Pickups:    collect <id> | advance <id> | cancel <id>
            navigate <id> | call <id>
Tracking:   track on | track off | sensors
Assistant:  ask <question> | starter <n>
Tips:       tips | tips refresh | filter <category|all>
Report:     issue <type> | priority <level> | location <text|here>
            describe <text> | submit | clear
Settings:   theme <light|dark|auto> | notifications on|off | voice on|off
Console:    show | help | quit";

fn on_off(arg: &str) -> Result<bool, String> {
    match arg.trim().to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" => Ok(true),
        "off" | "no" | "false" => Ok(false),
        other => Err(format!("Expected on or off, got '{}'", other)),
    }
}

fn required<'a>(arg: &'a str, what: &str) -> Result<&'a str, String> {
    let arg = arg.trim();
    if arg.is_empty() {
        Err(format!("Missing {}", what))
    } else {
        Ok(arg)
    }
}

/// Parse one input line. Blank lines redraw the current section.
pub fn parse_line(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let action = match word.to_ascii_lowercase().as_str() {
        "" | "show" => return Ok(Command::Redraw),
        "help" | "?" => return Ok(Command::Help),
        "quit" | "exit" | "q" => return Ok(Command::Quit),

        n if n.len() == 1 && n.as_bytes()[0].is_ascii_digit() => {
            Action::Shortcut(n.parse::<u8>().map_err(|e| e.to_string())?)
        }
        "dashboard" | "tracking" | "chat" | "assistant" | "tips" if rest.is_empty() => {
            match Section::parse(word) {
                Some(section) => Action::ShowSection(section),
                None => return Err(format!("Unknown section '{}'", word)),
            }
        }
        "report" => Action::ShowSection(Section::Report),

        "collect" => Action::Collect(required(rest, "sample id")?.to_uppercase()),
        "advance" => Action::Advance(required(rest, "sample id")?.to_uppercase()),
        "cancel" => Action::Cancel(required(rest, "sample id")?.to_uppercase()),
        "navigate" | "nav" => Action::Navigate(required(rest, "sample id")?.to_uppercase()),
        "call" => Action::Call(required(rest, "sample id")?.to_uppercase()),
        "track" => Action::ToggleTracking(on_off(rest)?),
        "sensors" => Action::RefreshSensors,

        "ask" => Action::SendMessage(required(rest, "question")?.to_string()),
        "starter" => {
            let n: usize = required(rest, "starter number")?
                .parse()
                .map_err(|_| format!("'{}' is not a number", rest))?;
            Action::SendStarter(n.saturating_sub(1))
        }

        "tips" if rest.eq_ignore_ascii_case("refresh") => Action::LoadTips { force: true },
        "filter" => match required(rest, "category")?.to_ascii_lowercase().as_str() {
            "all" => Action::FilterTips(None),
            other => match TipCategory::parse(other) {
                Some(category) => Action::FilterTips(Some(category)),
                None => return Err(format!("Unknown tip category '{}'", other)),
            },
        },

        "issue" => match IssueKind::parse(required(rest, "issue type")?) {
            Some(kind) => Action::UpdateDraft(DraftField::Kind(kind)),
            None => return Err(format!("Unknown issue type '{}'", rest)),
        },
        "priority" => match Priority::parse(required(rest, "priority")?) {
            Some(priority) => Action::UpdateDraft(DraftField::Priority(priority)),
            None => return Err(format!("Unknown priority '{}'", rest)),
        },
        "location" if rest.eq_ignore_ascii_case("here") => Action::UseCurrentLocation,
        "location" => Action::UpdateDraft(DraftField::Location(rest.to_string())),
        "describe" => Action::UpdateDraft(DraftField::Description(rest.to_string())),
        "submit" => Action::SubmitReport,
        "clear" => Action::ClearReport,

        "theme" => match Theme::parse(required(rest, "theme")?) {
            Some(theme) => Action::SetTheme(theme),
            None => return Err(format!("Unknown theme '{}'", rest)),
        },
        "notifications" => Action::SetNotifications(on_off(rest)?),
        "voice" => Action::SetVoice(on_off(rest)?),

        other => return Err(format!("Unknown command '{}'. Type 'help' for commands.", other)),
    };

    Ok(Command::Action(action))
}
