//! Interactive gate points of an upgrade run.

use std::io::{self, BufRead, Write};

/// Where the orchestrator asks its questions. The terminal in production,
/// scripted answers in tests.
pub trait ConfirmationPort {
    fn confirm(&mut self, question: &str, default: bool) -> bool;

    /// Picks one of `options`, or `None` when the user backs out.
    fn choose(&mut self, prompt: &str, options: &[&str]) -> Option<usize>;
}

pub struct TerminalPrompt {
    interactive: bool,
}

impl TerminalPrompt {
    pub fn new() -> Self { TerminalPrompt { interactive: atty::is(atty::Stream::Stdin) } }
}

impl Default for TerminalPrompt {
    fn default() -> Self { Self::new() }
}

impl ConfirmationPort for TerminalPrompt {
    fn confirm(&mut self, question: &str, default: bool) -> bool {
        if !self.interactive {
            warn!("stdin is not a terminal: answering `{}` to: {}", yes_no(default), question);
            return default;
        }

        let std_in = io::stdin();
        let std_out = io::stdout();
        get_bool(std_in.lock(), std_out.lock(), question, default)
    }

    fn choose(&mut self, prompt: &str, options: &[&str]) -> Option<usize> {
        if !self.interactive {
            warn!("stdin is not a terminal: cannot ask: {}", prompt);
            return None;
        }

        let std_in = io::stdin();
        let std_out = io::stdout();
        get_choice(std_in.lock(), std_out.lock(), prompt, options)
    }
}

fn yes_no(answer: bool) -> &'static str {
    if answer {
        "yes"
    } else {
        "no"
    }
}

// Write a prompt to the terminal, and wait for an answer.
fn get_bool(mut std_in: impl BufRead, mut std_out: impl Write, message: &str, default: bool) -> bool {
    let hint = if default { " [Y/n] " } else { " [y/N] " };
    let message = [message, hint].concat();

    loop {
        let input = match get_input(&mut std_in, &mut std_out, &message) {
            Ok(Some(input)) => input,
            _ => return default,
        };

        match parse_bool(&input, Some(default)) {
            Some(answer) => return answer,
            None => {
                let _ = writeln!(std_out, "The answer must be either `y` or `n`.");
            }
        }
    }
}

fn get_choice(
    mut std_in: impl BufRead,
    mut std_out: impl Write,
    prompt: &str,
    options: &[&str],
) -> Option<usize> {
    let mut menu = fomat!((prompt) "\n");
    for (id, option) in options.iter().enumerate() {
        menu.push_str(&fomat!("  " (id + 1) ") " (option) "\n"));
    }
    menu.push_str("  q) quit\nSelect an option: ");

    loop {
        let input = get_input(&mut std_in, &mut std_out, &menu).ok()??;
        match parse_choice(&input, options.len()) {
            Ok(choice) => return choice,
            Err(()) => {
                let _ = writeln!(std_out, "Enter a number between 1 and {}, or `q`.", options.len());
            }
        }
    }
}

/// `Ok(None)` at end of input.
fn get_input(
    mut std_in: impl BufRead,
    mut std_out: impl Write,
    message: &str,
) -> io::Result<Option<String>> {
    std_out.write_all(message.as_bytes())?;
    std_out.flush()?;

    let mut buf = String::default();
    if std_in.read_line(&mut buf)? == 0 {
        return Ok(None);
    }

    Ok(Some(buf))
}

fn parse_bool(input: &str, default: Option<bool>) -> Option<bool> {
    match input.trim().to_lowercase().chars().next() {
        None => default,
        Some('y') => Some(true),
        Some('n') => Some(false),
        Some(_) => None,
    }
}

fn parse_choice(input: &str, count: usize) -> Result<Option<usize>, ()> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("q") {
        return Ok(None);
    }

    match input.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Ok(Some(n - 1)),
        _ => Err(()),
    }
}
