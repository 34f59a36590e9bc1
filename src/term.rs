//! Keyboard access for the memory-mapped device registers. A real terminal
//! is switched into raw mode around each poll or read; piped input is read
//! byte by byte.

use std::io::{self, IsTerminal, Read};
use std::process::exit;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;

/// Check for a waiting key without blocking. Piped input always reports
/// ready; the program observes end of input as NUL bytes instead.
pub fn poll_available() -> bool {
    if !io::stdin().is_terminal() {
        return true;
    }
    let res = terminal::enable_raw_mode().and_then(|()| {
        let ready = event::poll(Duration::ZERO)?;
        terminal::disable_raw_mode()?;
        Ok(ready)
    });
    res.unwrap_or(false)
}

/// Block until one byte of input is available. No echo.
pub fn read_byte() -> u8 {
    if io::stdin().is_terminal() {
        read_key()
    } else {
        let mut buf = [0u8; 1];
        match io::stdin().read(&mut buf) {
            Ok(1) => buf[0],
            // End of piped input reads as NUL
            _ => 0,
        }
    }
}

fn read_key() -> u8 {
    let _ = terminal::enable_raw_mode();
    let byte = loop {
        let key = match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => key,
            Ok(_) => continue,
            Err(_) => break 0,
        };
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                let _ = terminal::disable_raw_mode();
                println!();
                exit(130);
            }
            KeyCode::Char(c) if c.is_ascii() => break c as u8,
            KeyCode::Enter => break b'\n',
            _ => continue,
        }
    };
    let _ = terminal::disable_raw_mode();
    byte
}
