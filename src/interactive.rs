//! # Terminal surface
//!
//! Renders a [`SessionLoop`] on the terminal: the `ask` one-shot and the interactive
//! conversation loop. Replies are printed while they stream in, from a printer task that
//! drains the turn's [`TurnEvent`] channel.
//!
//! Lines starting with `/` are session commands rather than utterances:
//!
//! | command          | effect                                   |
//! |------------------|------------------------------------------|
//! | `/skill <name>`  | change the skill area                    |
//! | `/level <name>`  | change the level                         |
//! | `/goal <text>`   | change the goal; without text, clear it  |
//! | `/history`       | reprint the conversation so far          |
//! | `/help`          | list the commands                        |
//!
//! `exit` or `quit` ends the session.

use crossterm::{
    ExecutableCommand,
    style::{Attribute, Color, Print, SetAttribute, SetForegroundColor},
};
use std::{
    error::Error,
    io::{self, BufRead, Write, stdout},
    str::FromStr,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

use crate::error::{CoachError, Result as CoachResult};
use crate::parameters::{Level, SessionParameters, SkillArea};
use crate::session::{SessionLoop, TurnEvent};
use crate::session_messages::{Message, Speaker};

const HELP: &str = "/skill <name>  /level <name>  /goal [text]  /history  /help  exit";

/// A parsed `/command` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Skill(String),
    Level(String),
    Goal(String),
    History,
    Help,
}

/// Parse `line` as a session command; `None` for ordinary utterances.
pub fn parse_slash_command(line: &str) -> Option<CoachResult<SlashCommand>> {
    let rest = line.trim().strip_prefix('/')?;
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim().to_string()),
        None => (rest, String::new()),
    };

    let command = match name.to_lowercase().as_str() {
        "skill" if !arg.is_empty() => Ok(SlashCommand::Skill(arg)),
        "level" if !arg.is_empty() => Ok(SlashCommand::Level(arg)),
        "skill" | "level" => Err(CoachError::Validation(format!("/{name} needs a value"))),
        "goal" => Ok(SlashCommand::Goal(arg)),
        "history" => Ok(SlashCommand::History),
        "help" => Ok(SlashCommand::Help),
        other => Err(CoachError::Validation(format!("unknown command /{other}"))),
    };
    Some(command)
}

fn is_exit(line: &str) -> bool {
    matches!(line.trim().to_lowercase().as_str(), "exit" | "quit")
}

/// Apply a session command. Returns text to show the user.
fn apply_command(session: &mut SessionLoop, command: SlashCommand) -> CoachResult<String> {
    let mut parameters = session.parameters().clone();
    match command {
        SlashCommand::Skill(name) => parameters.skill_area = SkillArea::from_str(&name)?,
        SlashCommand::Level(name) => parameters.level = Level::from_str(&name)?,
        SlashCommand::Goal(goal) => parameters.goal = goal,
        SlashCommand::History => return Ok(render_history(session.memory().all())),
        SlashCommand::Help => return Ok(HELP.to_string()),
    }
    session.set_parameters(parameters)?;
    Ok(describe(session.parameters()))
}

fn describe(p: &SessionParameters) -> String {
    format!(
        "Skill area: {} | Level: {} | Goal: {}",
        p.skill_area,
        p.level,
        p.goal().unwrap_or("(not specified)")
    )
}

/// The conversation as role-attributed plain text.
pub fn render_history(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "(no messages yet)".to_string();
    }
    messages
        .iter()
        .map(|m| {
            let who = match m.speaker {
                Speaker::Human => "You",
                Speaker::Assistant => "Eque",
            };
            format!("[{}] {who}: {}", m.created_at.format("%H:%M:%S"), m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print turn events as they arrive until the sender is dropped.
fn spawn_printer(mut rx: mpsc::UnboundedReceiver<TurnEvent>) -> JoinHandle<io::Result<()>> {
    tokio::spawn(async move {
        let mut stdout = stdout();
        stdout.execute(SetForegroundColor(Color::Blue))?;
        stdout.execute(SetAttribute(Attribute::Bold))?;

        while let Some(event) = rx.recv().await {
            match event {
                TurnEvent::Chunk(text) => {
                    stdout.execute(Print(text))?;
                }
                TurnEvent::Completed(_) => {
                    stdout.execute(Print("\n"))?;
                }
                TurnEvent::Failed(message) => {
                    stdout.execute(SetForegroundColor(Color::Red))?;
                    stdout.execute(Print(format!("\nerror: {message}\n")))?;
                }
            }
            stdout.flush()?;
        }

        stdout.execute(SetAttribute(Attribute::Reset))?;
        stdout.execute(SetForegroundColor(Color::Reset))?;
        Ok(())
    })
}

/// Run one turn, printing the reply as it streams. Turn errors are printed, not returned.
async fn print_turn(session: &mut SessionLoop, utterance: &str) -> Result<(), Box<dyn Error>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = spawn_printer(rx);

    let result = session.turn(utterance, Some(&tx)).await;
    drop(tx);
    printer.await??;

    if let Err(err) = result {
        debug!(error = %err, "Turn ended with an error");
        if !err.is_per_turn() {
            return Err(err.into());
        }
    }
    Ok(())
}

/// Ask a single question and print the answer.
///
/// # Errors
/// Returns the turn's error so the process exits non-zero.
pub async fn ask(session: &mut SessionLoop, question: &str) -> Result<(), Box<dyn Error>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = spawn_printer(rx);

    let result = session.turn(question, Some(&tx)).await;
    drop(tx);
    printer.await??;

    result.map(|_| ()).map_err(Into::into)
}

/// Enters interactive conversation mode with the coach.
///
/// Reads one utterance per line until `exit`, `quit` or end of input. Failed turns are
/// reported and the conversation continues.
pub async fn interactive_mode(session: &mut SessionLoop) -> Result<(), Box<dyn Error>> {
    let mut stdout = stdout();
    let stdin = io::stdin();

    stdout.execute(SetForegroundColor(Color::Yellow))?;
    stdout.execute(Print(format!(
        "Eque coaching session. {}\nType exit to leave, /help for commands.\n",
        describe(session.parameters())
    )))?;
    stdout.execute(SetForegroundColor(Color::Reset))?;

    loop {
        session.await_input();
        stdout.execute(Print("\nYou: "))?;
        stdout.execute(SetForegroundColor(Color::Green))?;
        stdout.flush()?;

        let mut input = String::new();
        let read = stdin.lock().read_line(&mut input)?;
        stdout.execute(SetForegroundColor(Color::Reset))?;

        if read == 0 || is_exit(&input) {
            break;
        }
        if input.trim().is_empty() {
            continue;
        }

        if let Some(command) = parse_slash_command(&input) {
            let reply = command.and_then(|c| apply_command(session, c));
            let (color, text) = match reply {
                Ok(text) => (Color::Yellow, text),
                Err(err) => (Color::Red, err.to_string()),
            };
            stdout.execute(SetForegroundColor(color))?;
            stdout.execute(Print(format!("{text}\n")))?;
            stdout.execute(SetForegroundColor(Color::Reset))?;
            continue;
        }

        stdout.execute(Print("Eque: "))?;
        print_turn(session, &input).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_lines_are_not_commands() {
        assert!(parse_slash_command("How do I say no?").is_none());
        assert!(parse_slash_command("and/or").is_none());
    }

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(
            parse_slash_command("/skill Conflict Resolution\n").unwrap().unwrap(),
            SlashCommand::Skill("Conflict Resolution".into())
        );
        assert_eq!(
            parse_slash_command("/LEVEL advanced").unwrap().unwrap(),
            SlashCommand::Level("advanced".into())
        );
        assert_eq!(
            parse_slash_command("/goal").unwrap().unwrap(),
            SlashCommand::Goal(String::new())
        );
        assert_eq!(parse_slash_command("/history").unwrap().unwrap(), SlashCommand::History);
    }

    #[test]
    fn rejects_missing_values_and_unknown_commands() {
        assert!(matches!(
            parse_slash_command("/skill"),
            Some(Err(CoachError::Validation(_)))
        ));
        assert!(matches!(
            parse_slash_command("/dance"),
            Some(Err(CoachError::Validation(_)))
        ));
    }

    #[test]
    fn describe_shows_placeholder_goal() {
        assert_eq!(
            describe(&SessionParameters::default()),
            "Skill area: Active Listening | Level: Beginner | Goal: (not specified)"
        );
    }

    #[test]
    fn exit_words() {
        assert!(is_exit("exit\n"));
        assert!(is_exit("  QUIT "));
        assert!(!is_exit("exit strategy"));
    }

    #[test]
    fn history_is_role_attributed() {
        let text = render_history(&[Message::human("Hello"), Message::assistant("Hi there")]);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("You: Hello"));
        assert!(lines[1].ends_with("Eque: Hi there"));
        assert_eq!(render_history(&[]), "(no messages yet)");
    }
}
