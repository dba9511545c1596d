//! Quote-aware command line splitting
//!
//! Commands run without a shell, so this is the only interpretation a
//! command line gets: whitespace separates words, single quotes are
//! literal, double quotes allow `\"` and `\\`, and a backslash outside
//! quotes escapes the next character. No globbing, variables or pipes.

use anyhow::{Result, bail};

/// Split a command line into program and arguments
pub fn split(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => word.push(ch),
                        None => bail!("unterminated single quote in: {line}"),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\')) => word.push(ch),
                            Some(ch) => {
                                word.push('\\');
                                word.push(ch);
                            }
                            None => bail!("unterminated double quote in: {line}"),
                        },
                        Some(ch) => word.push(ch),
                        None => bail!("unterminated double quote in: {line}"),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(ch) => word.push(ch),
                    None => bail!("trailing backslash in: {line}"),
                }
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }

    if in_word {
        words.push(word);
    }
    if words.is_empty() {
        bail!("empty command");
    }
    Ok(words)
}
