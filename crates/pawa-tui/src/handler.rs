use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use pawa_core::events::BlockAction;
use pawa_core::{CodeAction, NoticeLevel, ViewCommand};
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Panel(msg) => app.on_panel(msg),
        AppEvent::Notice(level, text) => app.set_notice(level, text),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Any key dismisses the last notice
    app.notice = None;

    // Global keys that work in any mode
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => {
                app.should_quit = true;
                return;
            }
            KeyCode::Char('l') => {
                app.clear_history();
                return;
            }
            _ => {}
        }
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    let half_page = (app.max_scroll / 2).max(1);
    match key.code {
        // Quit
        KeyCode::Char('q') => app.should_quit = true,

        // Back to the input box
        KeyCode::Char('i') | KeyCode::Enter => app.input_mode = InputMode::Editing,

        // Scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_down(half_page)
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_up(half_page)
        }
        KeyCode::PageDown => app.scroll_down(half_page),
        KeyCode::PageUp => app.scroll_up(half_page),
        KeyCode::Char('G') | KeyCode::End => app.scroll_down(u16::MAX),

        // Code block selection
        KeyCode::Tab | KeyCode::Char('n') => app.select_next_block(),
        KeyCode::BackTab | KeyCode::Char('N') => app.select_prev_block(),

        // Code block actions
        KeyCode::Char('c') => match app.block_action(BlockAction::Copy) {
            Some(ViewCommand::Copy(code)) => {
                if copy_to_clipboard(&code) {
                    app.set_notice(NoticeLevel::Info, "Copied code block");
                } else {
                    app.set_notice(NoticeLevel::Warning, "No clipboard command found");
                }
            }
            _ => app.set_notice(NoticeLevel::Warning, "No code block to copy"),
        },
        KeyCode::Char('a') => {
            if app.block_action(BlockAction::Apply).is_none() {
                app.set_notice(NoticeLevel::Warning, "No code block to apply");
            }
        }

        // Editor actions on the file given with --file
        KeyCode::Char('e') => app.run_action(CodeAction::Explain, None),
        KeyCode::Char('r') => app.run_action(CodeAction::Refactor, None),
        KeyCode::Char('m') => app.run_action(CodeAction::Comment, None),
        KeyCode::Char('t') => app.run_action(CodeAction::Test, None),
        // The input box holds the bug description or the code request
        KeyCode::Char('f') => {
            let description = take_input(app);
            app.run_action(CodeAction::Fix, description);
        }
        KeyCode::Char('g') => match take_input(app) {
            Some(description) => app.run_action(CodeAction::Generate, Some(description)),
            None => app.set_notice(
                NoticeLevel::Warning,
                "Type what to generate in the input box first",
            ),
        },
        KeyCode::Char('C') => app.clear_history(),

        _ => {}
    }
}

fn take_input(app: &mut App) -> Option<String> {
    let text = app.input.trim().to_string();
    app.input.clear();
    app.cursor = 0;
    (!text.is_empty()).then_some(text)
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            app.submit();
        }
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

/// Pipe text into the first clipboard command that starts.
fn copy_to_clipboard(text: &str) -> bool {
    use std::io::Write;
    use std::process::{Command, Stdio};

    const COMMANDS: &[(&str, &[&str])] = &[
        ("pbcopy", &[]),
        ("wl-copy", &[]),
        ("xclip", &["-selection", "clipboard"]),
        ("clip.exe", &[]),
    ];

    for (program, args) in COMMANDS {
        if let Ok(mut child) = Command::new(program)
            .args(*args)
            .stdin(Stdio::piped())
            .spawn()
        {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(text.as_bytes());
            }
            let _ = child.wait();
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventKind;
    use pawa_core::InboundMessage;
    use tokio::sync::mpsc;

    fn press(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_event(app, press(KeyCode::Char(c))).unwrap();
        }
    }

    #[test]
    fn test_editing_keeps_utf8_boundaries() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(tx, "m");
        type_text(&mut app, "héllo");
        handle_event(&mut app, press(KeyCode::Left)).unwrap();
        handle_event(&mut app, press(KeyCode::Backspace)).unwrap();
        assert_eq!(app.input, "hélo");
        handle_event(&mut app, press(KeyCode::Home)).unwrap();
        handle_event(&mut app, press(KeyCode::Delete)).unwrap();
        assert_eq!(app.input, "élo");
    }

    #[test]
    fn test_enter_submits_and_generate_uses_input() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = App::new(tx, "m");
        type_text(&mut app, "hi");
        handle_event(&mut app, press(KeyCode::Enter)).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            InboundMessage::SendMessage { message: "hi".into() }
        );

        type_text(&mut app, "a sort function");
        handle_event(&mut app, press(KeyCode::Esc)).unwrap();
        handle_event(&mut app, press(KeyCode::Char('g'))).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            InboundMessage::RunAction {
                action: CodeAction::Generate,
                input: Some("a sort function".into()),
            }
        );
        assert!(app.input.is_empty());
    }

    #[test]
    fn test_ctrl_c_quits_from_any_mode() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(tx, "m");
        let mut key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        key.kind = KeyEventKind::Press;
        handle_event(&mut app, AppEvent::Key(key)).unwrap();
        assert!(app.should_quit);
    }
}
