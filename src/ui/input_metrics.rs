use unicode_width::UnicodeWidthChar;

pub fn char_display_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(0)
}

pub fn display_width(text: &str) -> usize {
    text.chars().map(char_display_width).sum()
}

/// Hard-wraps `text` into rows no wider than `width` columns. Newlines
/// always start a new row and carriage returns are dropped.
pub fn wrap_to_width(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = Vec::new();
    let mut row = String::new();
    let mut used = 0usize;

    for ch in text.chars() {
        match ch {
            '\r' => {}
            '\n' => {
                rows.push(std::mem::take(&mut row));
                used = 0;
            }
            _ => {
                let ch_width = char_display_width(ch);
                if used > 0 && used + ch_width > width {
                    rows.push(std::mem::take(&mut row));
                    used = 0;
                }
                row.push(ch);
                used += ch_width;
            }
        }
    }
    rows.push(row);
    rows
}

/// Row and column of the cursor once `text` is wrapped to `width`. A cursor
/// sitting exactly at the right edge moves to the start of the next row.
pub fn cursor_row_col(text: &str, cursor_byte: usize, width: usize) -> (usize, usize) {
    let width = width.max(1);
    let end = clamp_to_char_boundary_left(text, cursor_byte);
    let (mut row, mut col) = (0usize, 0usize);

    for ch in text[..end].chars() {
        match ch {
            '\r' => {}
            '\n' => {
                row += 1;
                col = 0;
            }
            _ => {
                let ch_width = char_display_width(ch);
                if col > 0 && col + ch_width > width {
                    row += 1;
                    col = 0;
                }
                col += ch_width;
            }
        }
    }

    if col >= width {
        (row + 1, 0)
    } else {
        (row, col)
    }
}

/// Fits `text` on one row of `width` columns, ending with `...` when cut.
pub fn truncate_with_ellipsis(text: &str, width: usize) -> String {
    if display_width(text) <= width {
        return text.to_string();
    }
    if width < 4 {
        return take_columns(text, width);
    }
    let mut out = take_columns(text, width - 3);
    out.push_str("...");
    out
}

fn take_columns(text: &str, columns: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;
    for ch in text.chars() {
        let ch_width = char_display_width(ch);
        if used + ch_width > columns {
            break;
        }
        out.push(ch);
        used += ch_width;
    }
    out
}

pub fn clamp_to_char_boundary_left(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
