//! Plain-text rendering of the session view for the terminal

use crate::view::{SessionView, Update};
use shared::{ParticipantView, PollSnapshot, Role};
use std::fmt::Write;

const BAR_WIDTH: usize = 20;

/// Draws a poll with its live results.
///
/// Presenters see which options are correct; respondents only see the
/// marker after the poll has ended.
pub fn render_poll(poll: &PollSnapshot, view: &SessionView) -> String {
    let mut out = String::new();
    let reveal = view.role == Role::Presenter || !poll.is_active();

    let status = if poll.is_active() {
        format!("{}s left", view.remaining_secs)
    } else {
        "ended".to_string()
    };
    let _ = writeln!(out, "== {} [{}] ==", poll.question, status);

    for (index, result) in poll.results.iter().enumerate() {
        let filled = (result.percentage / 100.0 * BAR_WIDTH as f64).round() as usize;
        let bar = format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled.min(BAR_WIDTH)));
        let marker = if reveal && poll.correct_answers.contains(&result.option) {
            " *"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "  {}. {:<24} {} {:>3} ({:>5.1}%){}",
            index + 1,
            result.option,
            bar,
            result.count,
            result.percentage,
            marker
        );
    }

    let _ = write!(out, "  {} response(s)", poll.total_responses());
    if view.role == Role::Respondent && poll.is_active() {
        if view.is_submitted {
            out.push_str(", your answer is in");
        } else {
            out.push_str(", answer with /answer <n>");
        }
    }
    out
}

pub fn render_participants(participants: &[ParticipantView]) -> String {
    if participants.is_empty() {
        return "Nobody has joined yet".to_string();
    }

    let mut out = format!("{} participant(s):", participants.len());
    for participant in participants {
        let _ = write!(
            out,
            "\n  {:>5}  {} ({})",
            participant.connection_id.to_string(),
            participant.name,
            participant.role
        );
    }
    out
}

pub fn render_history(polls: &[PollSnapshot]) -> String {
    if polls.is_empty() {
        return "No polls yet".to_string();
    }

    let mut out = String::from("Poll history:");
    for (index, poll) in polls.iter().enumerate() {
        let state = if poll.is_active() { "active" } else { "ended" };
        let _ = write!(
            out,
            "\n  {}. {} ({}, {} response(s))",
            index + 1,
            poll.question,
            state,
            poll.total_responses()
        );
        for result in &poll.results {
            let _ = write!(out, "\n       {:<24} {:>5.1}%", result.option, result.percentage);
        }
    }
    out
}

/// Text to print after an update, if any
pub fn render_update(update: &Update, view: &SessionView) -> Option<String> {
    let poll = view.current_poll.as_ref();
    match update {
        Update::Connected(id) => Some(format!("Connected as {}", id)),
        Update::Welcome(message) => Some(message.clone()),
        Update::Participants => {
            let respondents = view
                .participants
                .iter()
                .filter(|p| p.role == Role::Respondent)
                .count();
            Some(format!("{} respondent(s) in the room", respondents))
        }
        Update::NewPoll | Update::PollEnded => poll.map(|poll| render_poll(poll, view)),
        Update::PollUpdated => {
            if view.role == Role::Presenter || view.is_submitted {
                poll.map(|poll| render_poll(poll, view))
            } else {
                None
            }
        }
        Update::AllAnswered => Some("Every respondent has answered".to_string()),
        Update::CreationDenied(reason) => Some(format!("Poll not created: {}", reason)),
        Update::RegistrationRejected(reason) => Some(format!("Registration rejected: {}", reason)),
        Update::History => None,
        Update::Message(message) => Some(format!("<{}> {}", message.sender, message.text)),
        Update::Kicked(reason) => Some(format!("Kicked: {}", reason)),
        Update::Disconnected(reason) => Some(format!("Disconnected: {}", reason)),
        Update::Ignored => None,
    }
}
