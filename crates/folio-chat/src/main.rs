//! Chat with CORE from the terminal.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use folio_chat::core::Dispatcher;
use folio_chat::{ChatWidget, DispatchState, Role, Turn};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::select;
use tokio::signal;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let sessions = Arc::new(folio_chat::session_manager_from_env());
    let mut widget = ChatWidget::new(Dispatcher::new(sessions));
    widget.open();
    if let Some(greeting) = widget.transcript().last() {
        print_turn(greeting);
    }

    // One reader for the whole session, piped input may hold many lines
    // in its buffer.
    let mut lines = io::BufReader::new(io::stdin()).lines();
    run_prompt_loop(&mut widget, &mut lines).await;
}

/// Sends every line read from `lines` until it ends or Ctrl-C is pressed
/// at the prompt.
async fn run_prompt_loop<R>(widget: &mut ChatWidget, lines: &mut Lines<R>)
where
    R: AsyncBufRead + Unpin,
{
    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        // `next_line` is cancel safe, losing the race drops no input.
        let line = select! {
            line = next_line(lines) => line,
            _ = signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let Some(mut pending) = widget.submit(&line) else {
            continue;
        };

        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(progress_style.clone());
        progress_bar.set_message("⛓️ Thinking...");

        let outcome = loop {
            progress_bar.inc(1);

            let sleep = sleep(Duration::from_millis(100));
            select! {
                outcome = &mut pending => break outcome,
                _ = signal::ctrl_c() => {
                    pending.cancel();
                    break (&mut pending).await;
                }
                _ = sleep => {}
            }
        };

        // Finish the progress bar before printing anything else.
        progress_bar.finish_and_clear();
        widget.finish(outcome);

        if widget.state() == DispatchState::Idle {
            println!("{}", "(cancelled)".dimmed());
        } else if let Some(turn) = widget.transcript().last() {
            print_turn(turn);
        }
    }
}

fn print_turn(turn: &Turn) {
    match turn.role() {
        Role::Assistant if turn.is_error() => {
            println!(
                "{}⚠️  {}",
                BAR_CHAR.bright_red(),
                turn.text().bright_red()
            );
        }
        Role::Assistant => {
            println!(
                "{}🤖 {}",
                BAR_CHAR.bright_cyan(),
                turn.text().bright_white()
            );
        }
        // Already on screen as typed.
        Role::User => {}
    }
}

async fn next_line<R>(lines: &mut Lines<R>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    match lines.next_line().await {
        Ok(line) => line,
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
