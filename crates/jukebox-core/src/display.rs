//! Text formatting for command replies.
//!
//! Queue listings are capped by item count and by a character budget so a
//! single reply always fits the chat platform's message limit.

use jukebox_types::{PlaybackFlags, SessionSnapshot, TrackSummary};

/// Caps applied to a queue listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayLimits {
    pub max_items: usize,
    pub max_chars: usize,
}

impl Default for DisplayLimits {
    fn default() -> Self {
        Self {
            max_items: 10,
            max_chars: 1800,
        }
    }
}

/// Format seconds as `H:MM:SS`, omitting the hour field when it is zero.
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

fn track_line(track: &TrackSummary) -> String {
    format!(
        "{} [{}] (added by {})",
        track.title,
        format_duration(track.duration_secs),
        track.added_by
    )
}

pub fn now_playing_line(track: &TrackSummary) -> String {
    format!("Now playing: {}", track_line(track))
}

pub fn flags_line(flags: &PlaybackFlags) -> String {
    let on_off = |value: bool| if value { "on" } else { "off" };
    format!(
        "Repeat: {} | Loop: {} | Shuffle: {}",
        on_off(flags.repeat),
        on_off(flags.looping),
        on_off(flags.shuffle)
    )
}

/// Render the queue for a status reply.
///
/// Entries are numbered from 1 (index 0 is the playing track). When the list is
/// cut short an `...and N more...` marker reports how many were left out.
///
/// `max_chars` bounds the whole reply; the now-playing line, the totals and
/// the marker are always kept, so entries are dropped first.
pub fn format_queue(snapshot: &SessionSnapshot, limits: DisplayLimits) -> String {
    if snapshot.current.is_none() && snapshot.queue.is_empty() {
        return "The queue is empty.".to_string();
    }

    let header = snapshot
        .current
        .as_ref()
        .map(|current| format!("{}\n", now_playing_line(current)))
        .unwrap_or_default();
    let trailer = format!(
        "Total queued: {}\n{}",
        snapshot.queued_duration,
        flags_line(&snapshot.flags)
    );

    let mut body = String::new();
    if snapshot.queue.is_empty() {
        body.push_str("Nothing queued after this track.\n");
    } else {
        body.push_str("Up next:\n");
        let budget = limits
            .max_chars
            .saturating_sub(header.len() + trailer.len());
        let total = snapshot.queue.len();
        // Worst-case marker length, reserved so truncation never overflows.
        let marker_reserve = format!("...and {total} more...\n").len();
        let mut shown = 0usize;
        for (idx, track) in snapshot.queue.iter().enumerate() {
            if shown >= limits.max_items {
                break;
            }
            let line = format!("{}. {}\n", idx + 1, track_line(track));
            let remaining_after = total - shown - 1;
            let reserve = if remaining_after > 0 { marker_reserve } else { 0 };
            if body.len() + line.len() + reserve > budget {
                break;
            }
            body.push_str(&line);
            shown += 1;
        }
        if shown < total {
            body.push_str(&format!("...and {} more...\n", total - shown));
        }
    }

    format!("{header}{body}{trailer}")
}
