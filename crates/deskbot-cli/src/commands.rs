//! Subcommand implementations

use std::io::{self, BufRead, Read, Write};

use anyhow::{Context, Result};

use deskbot_core::guard;
use deskbot_core::vault::{StorageMode, ValidatorChain};
use deskbot_core::{DeskError, HelpDesk};

fn print_header(title: &str) {
    println!();
    println!("  \x1b[1;36mdeskbot\x1b[0m {}", title);
    println!("  ─────────────────────────────────────");
}

fn print_error(err: &DeskError) {
    println!("  \x1b[31m✗\x1b[0m {}", err.user_message());
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Interactive loop; ends on EOF or `/quit`
pub async fn chat(desk: &HelpDesk) -> Result<()> {
    print_header(&format!("({})", desk.model()));
    println!("  Ask a question, or /quit to leave.");
    println!();

    let stdin = io::stdin();
    loop {
        print!("\x1b[1m>\x1b[0m ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit" | "/exit", _) => break,
            ("/clear", _) => {
                desk.clear_history();
                println!("  History cleared.");
            }
            ("/history", _) => {
                for turn in desk.history() {
                    println!("  [{:?}] {}", turn.role, turn.text);
                }
            }
            ("/quota", _) => println!(
                "  {} of {} calls left in this window.",
                desk.remaining_calls(),
                desk.config().rate.max_calls
            ),
            ("/key", key) => {
                // Session keys live only as long as this loop
                let key = match key.trim() {
                    "" => prompt_line("  API key: ")?,
                    key => key.to_string(),
                };
                if key.is_empty() {
                    println!("  No key given.");
                    continue;
                }
                match desk.save_key(&key, StorageMode::Session).await {
                    Ok(()) => println!("  \x1b[32m✓\x1b[0m API key kept until you leave the chat."),
                    Err(e) => print_error(&e),
                }
            }
            ("/model", name) if !name.trim().is_empty() => {
                desk.set_model(name.trim());
                println!("  Model set to {}.", name.trim());
            }
            _ => match desk.send_message(line).await {
                Ok(answer) => println!("\n{}\n", answer),
                Err(e) => {
                    tracing::warn!(kind = %e.kind(), "Question failed: {}", e);
                    print_error(&e);
                }
            },
        }
    }
    Ok(())
}

pub async fn ask(desk: &HelpDesk, question: &str) -> Result<()> {
    match desk.send_message(question).await {
        Ok(answer) => {
            println!("{}", answer);
            Ok(())
        }
        Err(e) => {
            print_error(&e);
            Err(e.into())
        }
    }
}

pub async fn key_set(desk: &HelpDesk, key: Option<String>, mode: StorageMode) -> Result<()> {
    let key = match key {
        Some(key) => key,
        None => {
            print_header("API key setup");
            println!();
            prompt_line("  API key: ")?
        }
    };
    if key.is_empty() {
        anyhow::bail!("API key cannot be empty");
    }

    desk.save_key(&key, mode)
        .await
        .context("Failed to save API key")?;

    let strength = desk
        .validate_format(&key)
        .strength
        .map(|s| s.label())
        .unwrap_or("unknown");
    println!();
    println!("  \x1b[32m✓\x1b[0m API key saved ({}, {} strength)", mode, strength);
    println!();
    Ok(())
}

pub fn key_clear(desk: &HelpDesk) -> Result<()> {
    desk.clear_key()?;
    println!("  \x1b[32m✓\x1b[0m API key removed");
    Ok(())
}

pub fn key_status(desk: &HelpDesk) -> Result<()> {
    let status = desk.key_status()?;
    match (status.mode, status.expires_at) {
        (None, _) => println!("  No API key saved."),
        (Some(mode), Some(expiry)) => {
            let when = chrono::DateTime::from_timestamp_millis(expiry)
                .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| expiry.to_string());
            println!("  API key saved ({}), expires {}.", mode, when);
        }
        (Some(mode), None) => println!("  API key saved ({}).", mode),
    }
    Ok(())
}

pub async fn key_verify(desk: &HelpDesk, key: Option<&str>) -> Result<()> {
    let result = desk.verify_key(key).await?;
    if result.valid {
        println!("  \x1b[32m✓\x1b[0m The provider accepted the key.");
        return Ok(());
    }

    let failure = result
        .failure
        .map(|f| (f.code(), f.message()))
        .unwrap_or(("unknown", "The key could not be verified."));
    println!("  \x1b[31m✗\x1b[0m {} ({})", failure.1, failure.0);
    if let Some(detail) = result.detail {
        println!("    {}", detail);
    }
    anyhow::bail!("key verification failed: {}", failure.0)
}

pub fn key_check(desk: &HelpDesk, key: &str) -> Result<()> {
    let chain = ValidatorChain::standard(desk.config().desk.min_key_strength);
    let failures = chain.validate_all(key.trim());
    if failures.is_empty() {
        let check = desk.validate_format(key.trim());
        let strength = check.strength.map(|s| s.label()).unwrap_or("unknown");
        println!("  \x1b[32m✓\x1b[0m Format looks right ({} strength).", strength);
        return Ok(());
    }

    for failure in &failures {
        println!("  \x1b[31m✗\x1b[0m {}: {}", failure.check, failure.message);
    }
    anyhow::bail!("{} format check(s) failed", failures.len())
}

pub fn quota(desk: &HelpDesk, reset: bool) -> Result<()> {
    if reset {
        desk.reset_rate_limit();
        println!("  Call budget reset.");
    }
    let rate = &desk.config().rate;
    println!(
        "  {} of {} calls left (window {}s).",
        desk.remaining_calls(),
        rate.max_calls,
        rate.window_ms / 1000
    );
    Ok(())
}

pub fn scan(text: Option<String>) -> Result<()> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let analysis = guard::analyze(&text);
    let verdict = if analysis.safe {
        "\x1b[32msafe\x1b[0m"
    } else {
        "\x1b[31munsafe\x1b[0m"
    };
    println!("  {} (score {:.2})", verdict, analysis.score);
    for finding in &analysis.findings {
        println!("    {:+.2}  {}", finding.score_delta, finding.description);
    }
    if analysis.safe {
        println!();
        println!("{}", guard::sanitize(&text));
    }
    Ok(())
}
