//! Parsing of rclone transfer statistics.
//!
//! Multi-line stats look like
//! `Transferred:   	  1.234 GiB / 1.234 GiB, 100%, 10.5 MiB/s, ETA 0s`.
//! With `--stats-one-line` the label is dropped and the line may carry a log
//! prefix instead: `2024/01/08 05:00:01 INFO  :  42 MiB / 42 MiB, 100%, ...`.
//! `--progress` redraws with carriage returns and ANSI escapes, which are
//! stripped first. File-count lines (`Transferred: 3 / 3, 100%`) carry no
//! byte unit and are ignored.

/// Multiplier for an rclone size unit
fn unit_multiplier(unit: &str) -> Option<f64> {
    let multiplier = match unit {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some(multiplier)
}

/// Parse an amount like `1.5 GiB` or `512B` into bytes.
fn parse_amount(amount: &str) -> Option<u64> {
    let amount = amount.trim();
    let split = amount
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(amount.len());
    let (number, unit) = amount.split_at(split);

    let value: f64 = number.parse().ok()?;
    let multiplier = unit_multiplier(unit.trim())?;

    Some((value * multiplier).round() as u64)
}

/// The amount at the very end of `text`, e.g. `...NOTICE:   42.000 MiB`.
fn trailing_amount(text: &str) -> Option<u64> {
    let mut tokens = text.split_whitespace().rev();
    let last = tokens.next()?;
    if unit_multiplier(last).is_some() {
        let number = tokens.next()?;
        parse_amount(&format!("{}{}", number, last))
    } else {
        parse_amount(last)
    }
}

/// Remove CSI escape sequences (`ESC [ ... final`).
fn strip_ansi(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'[') {
            chars.next();
            for c in chars.by_ref() {
                if ('@'..='~').contains(&c) {
                    break;
                }
            }
        }
    }
    out
}

fn line_bytes(line: &str) -> Option<u64> {
    let line = strip_ansi(line);

    let (stats, labelled) = match line.split_once("Transferred:") {
        Some((_, rest)) => (rest, true),
        None => (line.as_str(), false),
    };

    let mut fields = stats.split(',');
    let progress = fields.next()?;

    // Unlabelled lines must look like stats: `<done> / <total>, NN%`
    if !labelled && !fields.next().is_some_and(|f| f.trim().ends_with('%')) {
        return None;
    }

    let (done, _total) = progress.rsplit_once('/')?;
    trailing_amount(done)
}

/// Bytes transferred according to rclone's output, from the last line that
/// carries a byte amount. `None` when no line does.
pub fn parse_transferred_bytes(output: &str) -> Option<u64> {
    output
        .split(['\n', '\r'])
        .filter_map(line_bytes)
        .last()
}
