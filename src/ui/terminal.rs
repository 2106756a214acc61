use std::io::{self, BufRead, Write};

use colored::Colorize;

pub const END_MARKER: &str = ".";
pub const BACK_COMMAND: &str = ":back";
pub const QUIT_COMMAND: &str = ":quit";

#[derive(Debug, PartialEq, Eq)]
pub enum Entry {
    Text(String),
    Back,
    Quit,
}

/// Reads pasted text until a line holding only `.` or end of input.
///
/// A first line of `:back` or `:quit` is a command instead of text.
pub fn read_block<R: BufRead>(reader: &mut R) -> io::Result<Entry> {
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }

        let content = line.trim_end_matches(['\n', '\r']);
        if lines.is_empty() {
            match content.trim() {
                BACK_COMMAND => return Ok(Entry::Back),
                QUIT_COMMAND => return Ok(Entry::Quit),
                _ => {}
            }
        }
        if content.trim() == END_MARKER {
            break;
        }
        lines.push(content.to_string());
    }

    if lines.is_empty() {
        // end of input with nothing typed
        return Ok(Entry::Quit);
    }

    Ok(Entry::Text(lines.join("\n")))
}

pub fn confirm<R: BufRead>(reader: &mut R, question: &str) -> io::Result<bool> {
    loop {
        print!("{} ", format!("{} (y/n):", question).cyan());
        io::stdout().flush()?;

        let mut answer = String::new();
        if reader.read_line(&mut answer)? == 0 {
            return Ok(false);
        }

        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => println!("{}", "Please enter 'y' or 'n'.".red()),
        }
    }
}

pub fn step_header(step: usize, title: &str, hint: &str) {
    println!("\n{}", format!("=== Step {} of 3: {} ===", step, title).cyan().bold());
    println!("{}", hint.cyan());
    println!(
        "{}",
        format!("(finish with a line containing only '{}', or type {})", END_MARKER, QUIT_COMMAND)
            .dimmed()
    );
}
