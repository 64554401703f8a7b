//! Plain-text projection of the application state.

use std::fmt::Write;

use sampleagent_core::models::{PickupRecord, PickupStatus};
use sampleagent_core::seed::CHAT_STARTERS;
use sampleagent_core::utils::{format_phone, truncate_string};
use sampleagent_core::{App, DispatchOutcome, NoticeLevel, Section, TipsView, TrackingStep, ViewPart};

/// Width of the rule between blocks
const RULE_WIDTH: usize = 64;

/// Maximum characters of a tip body shown per line
const TIP_BODY_WIDTH: usize = 90;

fn rule() -> String {
    "─".repeat(RULE_WIDTH)
}

fn status_marker(status: PickupStatus) -> &'static str {
    match status {
        PickupStatus::Pending => "○",
        PickupStatus::Collected => "●",
        PickupStatus::InTransit => "→",
        PickupStatus::Delivered => "✓",
        PickupStatus::Cancelled => "✗",
    }
}

/// Print notices, then redraw the current section if anything in view changed.
pub fn print_outcome(app: &App, outcome: &DispatchOutcome) {
    for notice in &outcome.notices {
        let tag = match notice.level {
            NoticeLevel::Success => "[ok]",
            NoticeLevel::Error => "[error]",
            NoticeLevel::Warning => "[warn]",
            NoticeLevel::Info => "[info]",
        };
        println!("{} {}", tag, notice.message);
    }
    if let Some(rejected) = &outcome.rejected {
        println!("[error] {}", rejected);
    }

    let section = app.state().section();
    // Per-second elapsed ticks are not echoed; the time shows on the next redraw
    let visible: &[ViewPart] = match section {
        Section::Dashboard => &[ViewPart::Pickups, ViewPart::Counts],
        Section::Tracking => &[ViewPart::Tracking, ViewPart::Sensors],
        Section::Chat => &[ViewPart::Chat],
        Section::Tips => &[ViewPart::Tips],
        Section::Report => &[ViewPart::Report],
    };
    let changed = outcome.needs(ViewPart::Section)
        || outcome.needs(ViewPart::Connectivity)
        || visible.iter().any(|part| outcome.needs(*part));
    if changed {
        println!("{}", render(app));
    }
}

pub fn render(app: &App) -> String {
    let mut out = String::new();
    let state = app.state();
    let now = app.now();

    let connection = if state.is_online() { "Online" } else { "Offline" };
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(
        out,
        " {}  ·  {}  ·  {} UTC",
        state.section().title(),
        connection,
        now.format("%H:%M")
    );
    let _ = writeln!(out, "{}", rule());

    match state.section() {
        Section::Dashboard => render_dashboard(app, &mut out),
        Section::Tracking => render_tracking(app, &mut out),
        Section::Chat => render_chat(app, &mut out),
        Section::Tips => render_tips(app, &mut out),
        Section::Report => render_report(app, &mut out),
    }
    out
}

fn render_pickup(out: &mut String, pickup: &PickupRecord) {
    let _ = writeln!(
        out,
        " {} {:<6} {:<8} {:<28} {:<14} {}",
        status_marker(pickup.status),
        pickup.id,
        pickup.scheduled_time,
        truncate_string(&pickup.facility, 28),
        pickup.sample_type,
        pickup.priority
    );
    let phone = pickup
        .phone
        .as_deref()
        .map(format_phone)
        .unwrap_or_else(|| "N/A".to_string());
    let _ = writeln!(
        out,
        "            {} · {} · {}",
        pickup.address,
        pickup.contact_display(),
        phone
    );
}

fn render_dashboard(app: &App, out: &mut String) {
    let counts = app.state().counts();
    let _ = writeln!(
        out,
        " Pending {}   Collected {}   Total {}",
        counts.pending, counts.collected, counts.total
    );
    let _ = writeln!(out);
    for pickup in app.state().pickups() {
        render_pickup(out, pickup);
    }
}

fn render_tracking(app: &App, out: &mut String) {
    let state = app.state();
    let tracking = state.tracking();

    if let Some(active) = state.active_pickup() {
        let _ = writeln!(out, " Active sample {} · {}", active.id, active.facility);
        let _ = writeln!(out, " Requirements: {}", active.requirements.join(", "));
    }

    for step in [TrackingStep::Pending, TrackingStep::Collected, TrackingStep::InTransit] {
        let marker = if step <= tracking.step { "●" } else { "○" };
        let _ = writeln!(out, "  {} {}. {}", marker, step.number(), step.label());
    }
    let _ = writeln!(out, " Progress {}%", tracking.step.progress_percent());

    if let Some(elapsed) = app.elapsed_since_collection() {
        let _ = writeln!(out, " Time since collection {}", elapsed);
    }
    if app.transport_overdue() {
        let _ = writeln!(out, " ! Transport time limit exceeded");
    }

    if let Some(reading) = state.sensor() {
        let flag = match app.sensor_in_range() {
            Some(false) => "  (out of range)",
            _ => "",
        };
        let _ = writeln!(
            out,
            " Temperature {}{}   Humidity {}%",
            reading.temperature_display(),
            flag,
            reading.humidity_pct
        );
    }
}

fn render_chat(app: &App, out: &mut String) {
    let state = app.state();
    if state.chat().is_empty() && state.pending_turns().is_empty() {
        let _ = writeln!(out, " Ask the assistant anything about sample handling.");
        for (i, starter) in CHAT_STARTERS.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, starter);
        }
        return;
    }

    for turn in state.chat() {
        let _ = writeln!(out, " [{}] You: {}", turn.timestamp.format("%H:%M"), turn.user);
        let _ = writeln!(out, "         Assistant: {}", turn.reply);
    }
    for pending in state.pending_turns() {
        let _ = writeln!(out, " [{}] You: {}", pending.timestamp.format("%H:%M"), pending.user);
        let _ = writeln!(out, "         Thinking...");
    }
}

fn render_tips(app: &App, out: &mut String) {
    let state = app.state();
    match state.tips_view() {
        TipsView::Idle | TipsView::Loading => {
            let _ = writeln!(out, " Loading health tips...");
            return;
        }
        TipsView::Unavailable(reason) => {
            let _ = writeln!(out, " Unable to load health tips ({})", reason);
            let _ = writeln!(out, " Type 'tips refresh' to try again.");
            return;
        }
        TipsView::Ready => {}
    }

    if let Some(entry) = state.tips_entry() {
        let _ = writeln!(out, " Updated {}", entry.age_display(app.now()));
    }
    if let Some(category) = state.tips_filter() {
        let _ = writeln!(out, " Showing {} tips", category.title());
    }

    let tips = state.visible_tips();
    if tips.is_empty() {
        let _ = writeln!(out, " No tips in this category.");
    }
    for tip in tips {
        let critical = if tip.is_critical() { " [CRITICAL]" } else { "" };
        let _ = writeln!(out, " {} {}{}", tip.icon, tip.title, critical);
        let _ = writeln!(out, "    {}", truncate_string(&tip.body, TIP_BODY_WIDTH));
    }
}

fn render_report(app: &App, out: &mut String) {
    let draft = app.state().report_draft();
    let kind = draft
        .kind
        .map(|k| format!("{:?}", k))
        .unwrap_or_else(|| "-".to_string());
    let _ = writeln!(out, " {}", draft.priority_label());
    let _ = writeln!(out, " Type:        {}", kind);
    let _ = writeln!(out, " Priority:    {}", draft.priority);
    let _ = writeln!(out, " Location:    {}", draft.location);
    let _ = writeln!(out, " Description: {}", draft.description);

    let queued = app.state().offline_queue().len();
    if queued > 0 {
        let _ = writeln!(out, " {} report(s) waiting for a connection", queued);
    }
}
