#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

//! ** Skein **
//! Reference front-end for the Skein simulation core: loads a game
//! directory, runs the turn loop, and renders narration as plain text.
//! The core itself never touches the terminal; everything visual lives
//! here.

use skein_engine::{GameEngine, SKEIN_VERSION, TurnReport, Verbosity};

use anyhow::Result;
use colored::Colorize;
use env_logger::Env;
use log::info;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use textwrap::{fill, termwidth};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();
    info!("Starting Skein engine (version {SKEIN_VERSION})");

    let game_dir = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());
    let seed = std::env::args()
        .nth(2)
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(0);
    let mut engine = GameEngine::from_dir(&game_dir, seed)?;

    println!(
        "{}",
        format!("== {} ==", engine.state.metadata.title).bright_yellow().bold()
    );
    if !engine.state.metadata.description.is_empty() {
        println!("{}", fill(&engine.state.metadata.description, termwidth()));
    }
    println!("{}", "Type commands, or 'quit' to leave. 'save <file>' / 'load <file>' persist the world.".dimmed());

    // open with a look so the player knows where they are
    if let Some(look) = engine.parse("look") {
        let report = engine.process_turn(&look);
        render(&report);
    }

    let mut editor = DefaultEditor::new()?;
    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("{}", format!("input error: {err}").red());
                continue;
            },
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);

        // front-end commands stay outside the core
        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            break;
        }
        if let Some(rest) = input.strip_prefix("save ") {
            match engine.save_to(rest.trim()) {
                Ok(()) => println!("{}", format!("Saved to {}.", rest.trim()).green()),
                Err(err) => println!("{}", format!("Save failed: {err}").red()),
            }
            continue;
        }
        if let Some(rest) = input.strip_prefix("load ") {
            match skein_data::schema::load_game_state(rest.trim()) {
                Ok(state) => match GameEngine::new(state, seed) {
                    Ok(loaded) => {
                        engine = loaded;
                        println!("{}", format!("Loaded {}.", rest.trim()).green());
                    },
                    Err(err) => println!("{}", format!("Load failed: {err}").red()),
                },
                Err(err) => println!("{}", format!("Load failed: {err}").red()),
            }
            continue;
        }

        let Some(action) = engine.parse(input) else {
            println!("{}", "I don't understand that command.".italic());
            continue;
        };
        let report = engine.process_turn(&action);
        render(&report);
    }

    println!("Thanks for playing.");
    Ok(())
}

/// Render a turn report as wrapped plain text.
fn render(report: &TurnReport) {
    let narration = &report.narration;
    let text = fill(&narration.primary, termwidth());
    if narration.success {
        println!("{text}");
    } else {
        println!("{}", text.red());
    }
    if report.verbosity == Verbosity::Full {
        for beat in &narration.secondary_beats {
            println!("{}", fill(beat, termwidth()).dimmed());
        }
    }
    for beat in &report.phase_beats {
        println!("{}", fill(beat, termwidth()).cyan());
    }
}
