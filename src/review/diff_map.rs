//! Best-effort mapping from diff-relative line indices to post-change file
//! line numbers.
//!
//! Model output for diff-mode reviews reports line numbers against the
//! model's own enumeration of the diff text: every non-header,
//! non-"no newline" line counts, in document order, whether it is an
//! addition, a deletion, or context. This module walks the diff with the
//! same convention and tracks the new-file line number declared by each
//! hunk header.

/// Map a 1-based diff-relative line index to the corresponding line number
/// in the post-change file.
///
/// Deletions have no post-change line, so the file line number in effect
/// at that point is returned as a best-effort value. If the index is never
/// reached (short or malformed diff), the index is returned unchanged.
/// This function never fails.
pub fn map_diff_line(diff_index: usize, diff: &str) -> usize {
    if diff_index == 0 {
        return diff_index;
    }

    let mut file_line = 0usize;
    let mut counted = 0usize;

    for line in diff.lines() {
        if line.starts_with("@@") {
            if let Some(start) = parse_new_start(line) {
                file_line = start.saturating_sub(1);
            }
            continue;
        }
        if line.starts_with("diff ")
            || line.starts_with("index ")
            || line.starts_with("--- ")
            || line.starts_with("+++ ")
            || line.starts_with('\\')
        {
            continue;
        }

        counted += 1;
        if !line.starts_with('-') {
            // Additions and context lines advance the new file.
            file_line += 1;
        }
        if counted == diff_index {
            return file_line;
        }
    }

    diff_index
}

/// Map a 1-based index into the raw diff text (headers included, as a
/// detector scanning the literal diff sees it) to the post-change file
/// line number. Header lines and unreachable indices fall back to the
/// index itself.
pub fn map_diff_text_line(raw_index: usize, diff: &str) -> usize {
    if raw_index == 0 {
        return raw_index;
    }

    let mut file_line = 0usize;
    for (i, line) in diff.lines().enumerate() {
        let is_header = line.starts_with("@@")
            || line.starts_with("diff ")
            || line.starts_with("index ")
            || line.starts_with("--- ")
            || line.starts_with("+++ ")
            || line.starts_with('\\');
        if line.starts_with("@@") {
            if let Some(start) = parse_new_start(line) {
                file_line = start.saturating_sub(1);
            }
        }
        if !is_header && !line.starts_with('-') {
            file_line += 1;
        }
        if i + 1 == raw_index {
            return if is_header { raw_index } else { file_line };
        }
    }

    raw_index
}

/// Extract the new-file start line from a hunk header like
/// `@@ -1,3 +10,4 @@`. Returns None for malformed headers.
fn parse_new_start(header: &str) -> Option<usize> {
    let plus = header.find('+')?;
    let rest = &header[plus + 1..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
