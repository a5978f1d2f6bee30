//! Command handlers.

use anyhow::{anyhow, Context, Result};
use futures::stream::{self, StreamExt};

use tradedash_core::models::SymbolAnalysis;
use tradedash_core::settings::{SettingsField, SettingsForm, SettingsRecord};

use crate::app::App;

/// Maximum concurrent analysis requests.
/// Each analysis runs model inference on the backend; keep the load modest.
const MAX_CONCURRENT_ANALYSES: usize = 4;

fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).context("Failed to read password")
}

fn resolve_email(app: &App, email: Option<String>) -> Result<String> {
    email
        .or_else(|| app.config.last_email.clone())
        .ok_or_else(|| anyhow!("No email given. Pass --email"))
}

pub async fn sign_up(app: &mut App, email: String) -> Result<()> {
    let password = prompt_password("Choose a password: ")?;
    let confirm = prompt_password("Repeat password: ")?;
    if password != confirm {
        return Err(anyhow!("Passwords do not match"));
    }

    let response = app.store()?.sign_up(&email, &password).await?;
    app.remember_email(&email);

    match response.session {
        Some(session) => println!("Account created, signed in as {}", session.user.display_name()),
        None => println!("Account created. Check {} for a confirmation link, then run `tradedash login`", email),
    }
    Ok(())
}

pub async fn login(app: &mut App, email: Option<String>) -> Result<()> {
    let email = resolve_email(app, email)?;
    let password = prompt_password(&format!("Password for {}: ", email))?;

    let session = app.store()?.sign_in(&email, &password).await?;
    app.remember_email(&email);
    println!("Signed in as {}", session.user.display_name());
    Ok(())
}

pub async fn logout(app: &App) -> Result<()> {
    let store = app.store()?;
    if store.session().is_none() {
        println!("Not signed in");
        return Ok(());
    }
    store.sign_out().await?;
    println!("Signed out");
    Ok(())
}

pub fn whoami(app: &App) -> Result<()> {
    let state = app.store()?.state();
    match state.session {
        Some(session) => {
            println!("{} ({})", session.user.display_name(), session.user.id);
            if let Some(minutes) = session.minutes_until_expiry() {
                println!("Token expires in {} min", minutes);
            }
        }
        None => println!("Not signed in"),
    }
    Ok(())
}

pub async fn top_coins(app: &App, limit: u32) -> Result<()> {
    let coins = app
        .api
        .top_coins(limit)
        .await?
        .into_data()
        .ok_or_else(|| anyhow!("Backend returned no market data"))?;

    for (rank, coin) in coins.iter().enumerate() {
        let price = coin
            .number("price")
            .map(|p| format!("{:>14.4}", p))
            .unwrap_or_else(|| format!("{:>14}", "-"));
        let change = coin
            .number("price_change_percent")
            .or_else(|| coin.number("change"))
            .map(|c| format!("{:>+8.2}%", c))
            .unwrap_or_default();
        println!("{:>4}  {:<14}{}{}", rank + 1, coin.symbol, price, change);
    }
    Ok(())
}

fn print_analysis(analysis: &SymbolAnalysis) {
    let (to_support, to_resistance) = analysis.range_percent();
    println!("{} @ {:.4} ({:?} mode)", analysis.symbol, analysis.current_price, analysis.mode);
    println!("  Signal:      {}", analysis.final_signal);
    println!(
        "  LSTM:        {} ({:.0}% confidence)",
        analysis.lstm_signal.signal,
        analysis.lstm_signal.confidence * 100.0
    );
    println!("  AI decision: {} - {}", analysis.ai_decision.signal, analysis.ai_decision.reason);
    println!(
        "  Support:     {:.4} (-{:.2}%)  Resistance: {:.4} (+{:.2}%)",
        analysis.support_resistance.support,
        to_support,
        analysis.support_resistance.resistance,
        to_resistance
    );
}

pub async fn analyze(app: &App, symbols: Vec<String>) -> Result<()> {
    let api = &app.api;
    let results: Vec<_> = stream::iter(symbols)
        .map(|symbol| async move {
            let result = api.analyze_symbol(&symbol).await;
            (symbol, result)
        })
        .buffered(MAX_CONCURRENT_ANALYSES)
        .collect()
        .await;

    let mut failures = 0;
    for (symbol, result) in results {
        match result.map(|env| env.into_data()) {
            Ok(Some(analysis)) => print_analysis(&analysis),
            Ok(None) => {
                failures += 1;
                eprintln!("{}: backend returned no analysis", symbol);
            }
            Err(e) => {
                failures += 1;
                eprintln!("{}: {}", symbol, e);
            }
        }
    }

    if failures > 0 {
        return Err(anyhow!("{} analysis request(s) failed", failures));
    }
    Ok(())
}

fn print_settings(record: &SettingsRecord) {
    for field in SettingsField::ALL {
        println!("{:<20}{}", field.label(), record.display_value(field));
    }
    let mode = if record.is_live_capable() { "live" } else { "simulated" };
    println!("Analysis mode: {}", mode);
    if record.is_empty() {
        println!("No keys configured; analyses use pre-trained models in simulated mode.");
    }
}

pub async fn show_settings(app: &App) -> Result<()> {
    app.store()?;
    let form = SettingsForm::new(app.api.clone());
    form.load().await?;
    print_settings(&form.record());
    Ok(())
}

pub async fn update_settings(app: &App, changes: Vec<(SettingsField, String)>) -> Result<()> {
    if changes.is_empty() {
        return Err(anyhow!("Nothing to update. Pass at least one key option"));
    }
    app.store()?;

    let form = SettingsForm::new(app.api.clone());
    form.load().await?;
    for (field, value) in changes {
        form.set_field(field, value);
    }
    form.submit().await?;

    if form.status().success {
        println!("Settings updated successfully!");
    }
    print_settings(&form.record());
    Ok(())
}

pub async fn health(app: &App) -> Result<()> {
    let status = app.api.health().await?;
    println!("{}: {}", app.api.base_url(), status.status);
    if !status.is_healthy() {
        return Err(anyhow!("Backend reports {}", status.status));
    }
    Ok(())
}
