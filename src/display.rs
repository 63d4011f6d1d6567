use colored::{ColoredString, Colorize};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::pipeline::{RecognitionEvent, SlotMatch};
use crate::type_chart::TypeMultiplier;

/// Display width of the name column. Japanese names are two columns per character.
pub const NAME_WIDTH: usize = 16;

/// Truncates a string to a max display width. If truncation is needed, adds "..".
pub fn truncate_name(name: &str, max_display_width: usize) -> String {
    if UnicodeWidthStr::width(name) <= max_display_width {
        return name.to_string();
    }

    let mut result = String::new();
    let mut width = 0;

    for g in UnicodeSegmentation::graphemes(name, true) {
        let g_width = UnicodeWidthStr::width(g);
        if width + g_width > max_display_width.saturating_sub(2) {
            break;
        }
        result.push_str(g);
        width += g_width;
    }

    result.push_str("..");
    result
}

/// Pads a string on the right with spaces to match the target display width.
pub fn pad_str(s: &str, target_width: usize) -> String {
    let width = UnicodeWidthStr::width(s);
    if width >= target_width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(target_width - width))
    }
}

fn name_column(name: &str) -> String {
    pad_str(&truncate_name(name, NAME_WIDTH), NAME_WIDTH)
}

fn colored_distance(distance: u32, confident: bool) -> ColoredString {
    let text = format!("d={:>2}", distance);
    if distance == 0 {
        text.green()
    } else if confident {
        text.yellow()
    } else {
        text.red()
    }
}

/// `Ice x4 Dragon x2`, with quadruple weaknesses in red.
fn weakness_column(weaknesses: &[TypeMultiplier]) -> String {
    weaknesses
        .iter()
        .map(|w| {
            let text = format!("{} x{}", w.attack, w.multiplier);
            if w.multiplier >= 4.0 {
                text.red().to_string()
            } else {
                text.yellow().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn slot_line(slot: usize, matched: &SlotMatch) -> String {
    match (&matched.name, matched.distance) {
        (Some(name), Some(distance)) => format!(
            "  {} {} {}",
            slot + 1,
            name_column(name),
            colored_distance(distance, matched.confident)
        ),
        _ => format!("  {} {}", slot + 1, name_column("-").dimmed()),
    }
}

/// Lines printed for one event.
pub fn event_lines(event: &RecognitionEvent) -> Vec<String> {
    match event {
        RecognitionEvent::OpponentSighted {
            text,
            found,
            weaknesses,
        } => {
            let record = &found.record;
            let types = match &record.type2 {
                Some(type2) => format!("{}/{}", record.type1, type2),
                None => record.type1.clone(),
            };
            vec![format!(
                "{} {} {:<16} {:>3} {} {}",
                "opponent".bold(),
                name_column(&record.name),
                types,
                record.stats.total(),
                weakness_column(weaknesses),
                format!("(read {:?})", text).dimmed()
            )]
        }
        RecognitionEvent::MessageRead { text } => {
            vec![format!("{} {}", "message".bold(), text)]
        }
        RecognitionEvent::TeamRecognized { stamp, slots } => {
            let mut lines = vec![format!("{} {}", "team".bold(), stamp.dimmed())];
            lines.extend(slots.iter().enumerate().map(|(i, s)| slot_line(i, s)));
            lines
        }
    }
}

pub fn print_event(event: &RecognitionEvent) {
    for line in event_lines(event) {
        println!("{}", line);
    }
}
