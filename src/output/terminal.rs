// Colored terminal output for verdicts, traces and the lexicon summary.
//
// main.rs delegates all human-readable printing here; JSON output is
// printed directly by the command handlers.

use colored::Colorize;

use crate::detect::result::{DetectionResult, StageReport};
use crate::lexicon::store::LexiconStore;
use crate::moderation::response::{ModerationOutcome, Resolution};
use crate::moderation::retry::AttemptStatus;
use crate::moderation::trace::ModerationTrace;

/// One-line verdict.
pub fn display_verdict(flagged: bool) {
    if flagged {
        println!("{}", "profanity detected".red().bold());
    } else {
        println!("{}", "clean".green());
    }
}

/// The moderated text plus a short summary of how it was decided.
pub fn display_outcome(outcome: &ModerationOutcome) {
    println!("{}", outcome.response.moderated_message);
    eprintln!(
        "  {} {}  {}",
        "resolution:".dimmed(),
        colorize_resolution(&outcome.resolution),
        if outcome.contains_profanity {
            "flagged".red().to_string()
        } else {
            "clean".green().to_string()
        }
    );
    for note in &outcome.response.notes {
        eprintln!("  {} {}", "note:".dimmed(), note);
    }
}

/// Every detector stage, what it searched and what it found.
pub fn display_stages(text: &str, result: &DetectionResult, stages: &[StageReport]) {
    println!(
        "\n{}",
        format!("=== Deterministic scan ({} chars) ===", text.chars().count()).bold()
    );
    println!();

    for report in stages {
        let marker = if report.fired() {
            "●".red().bold()
        } else {
            "○".dimmed()
        };
        println!(
            "  {} {:<24} {:>6}µs  {}",
            marker,
            report.stage.to_string(),
            report.elapsed_us,
            super::truncate_chars(&report.view, 60).dimmed()
        );
        for hit in &report.hits {
            let excerpt: String = text
                .chars()
                .skip(hit.span.start)
                .take(hit.span.len())
                .collect();
            println!(
                "      {} {:<14} [{}..{}] {:?}{}",
                "→".red(),
                hit.term,
                hit.span.start,
                hit.span.end,
                excerpt,
                hit.language
                    .as_deref()
                    .map(|l| format!(" ({l})"))
                    .unwrap_or_default()
            );
        }
    }

    println!();
    match result.stage {
        Some(stage) => println!(
            "  First match at {}: {}",
            stage.to_string().bold(),
            result.matched_terms.join(", ").red()
        ),
        None => println!("  {}", "No stage matched.".green()),
    }
}

/// The full stage-by-stage trace of a moderation call.
pub fn display_trace(text: &str, trace: &ModerationTrace) {
    display_stages(text, &trace.deterministic, &trace.stages);

    println!("\n{}", "=== Model ===".bold());
    println!("  Backend: {}", trace.model);
    if trace.short_circuited {
        println!("  {}", "Skipped: deterministic pre-check flagged".yellow());
    }
    for attempt in &trace.attempts {
        println!(
            "  Attempt {}: {} ({}ms){}",
            attempt.attempt,
            colorize_attempt(attempt.status),
            attempt.elapsed_ms,
            attempt
                .detail
                .as_deref()
                .map(|d| format!(" {}", super::truncate_chars(d, 80).dimmed()))
                .unwrap_or_default()
        );
    }
    if let Some(strategy) = trace.parse_strategy {
        println!("  Parsed via: {:?}", strategy);
    }
    if let Some(fidelity) = trace.fidelity {
        println!("  Echo fidelity: {:?}", fidelity);
    }

    println!("\n{}", "=== Decision ===".bold());
    println!("  Resolution: {}", colorize_resolution(&trace.resolution));
    println!(
        "  Override fired: {}",
        if trace.override_fired {
            "yes".red().bold().to_string()
        } else {
            "no".normal().to_string()
        }
    );
    print!("  Verdict: ");
    display_verdict(trace.verdict);
    println!("  Moderated: {}", trace.response.moderated_message);
    println!("  Total: {}ms", trace.total_ms);
}

/// Summary of the loaded lexicon.
pub fn display_lexicon(store: &LexiconStore) {
    let by_language = store.terms_by_language();
    let total: usize = by_language.values().map(Vec::len).sum();
    println!(
        "\n{}",
        format!("=== Lexicon ({} terms, {} languages) ===", total, by_language.len()).bold()
    );
    println!();

    for (language, terms) in &by_language {
        println!(
            "  {:<4} {:>3}  {}",
            language.bold(),
            terms.len(),
            super::truncate_chars(&terms.join(", "), 90).dimmed()
        );
    }

    println!("\n  Pattern families:");
    for pattern in store.patterns() {
        println!("    {:<10} {}", pattern.family, pattern.template.dimmed());
    }
    println!("\n  Fragments: {}", store.fragments().join(", "));
    println!("  Context exceptions: {}", store.exception_count());
}

fn colorize_resolution(resolution: &Resolution) -> colored::ColoredString {
    let label = resolution.to_string();
    match resolution {
        Resolution::Overridden => label.red().bold(),
        Resolution::Fallback(_) => label.yellow(),
        Resolution::ShortCircuit => label.bright_red(),
        Resolution::ModelTrusted => label.green(),
        Resolution::Empty => label.dimmed(),
    }
}

fn colorize_attempt(status: AttemptStatus) -> colored::ColoredString {
    let label = format!("{status:?}").to_lowercase();
    match status {
        AttemptStatus::Success => label.green(),
        AttemptStatus::RateLimited | AttemptStatus::Unavailable => label.red(),
        _ => label.yellow(),
    }
}
