//! Embedded pseudo-CSV tokenizing.
//!
//! The feed payload is one string of comma-delimited rows separated by
//! newlines. Text fields containing commas are wrapped in single quotes, but
//! the surrounding JSON already uses quote characters freely, so the quotes
//! are only recognizable next to a delimiter. The cleanup substitutes those
//! positions with `#` and then tokenizes with `#` as the quote character,
//! matching the upstream producer's conventions exactly.

/// Splits a raw payload blob into tokenized rows.
///
/// Checksum rows (first field `c`) and blank lines are dropped.
pub fn tokenize_blob(blob: &str) -> Vec<Vec<String>> {
    let cleaned = blob
        .replace("',", "#,")
        .replace(",'", ",#")
        .replace("'\n", "#\n");

    let mut rows = Vec::new();
    for line in cleaned.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let row = tokenize_line(line);
        if row.first().is_some_and(|f| f == "c") {
            continue;
        }
        rows.push(row);
    }
    rows
}

/// Tokenizes one line: `,` delimits, `#` quotes, a quoted region keeps its
/// commas literally.
fn tokenize_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;

    for ch in line.chars() {
        match ch {
            '#' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(ch),
        }
    }
    fields.push(field);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_rows_split_on_commas_and_newlines() {
        let rows = tokenize_blob("1,Bite,82,0\n2,Claw,82,0");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ["1", "Bite", "82", "0"]);
        assert_eq!(rows[1], ["2", "Claw", "82", "0"]);
    }

    #[test]
    fn quoted_field_keeps_embedded_commas() {
        let rows = tokenize_blob("9,'Run, coward',69,2,'Flee, now'\n");
        assert_eq!(rows, [["9", "Run, coward", "69", "2", "Flee, now"]]);
    }

    #[test]
    fn quote_closing_at_end_of_line_is_recognized() {
        let rows = tokenize_blob("9,attack,'one, two'\n10,x,y");
        assert_eq!(rows[0], ["9", "attack", "one, two"]);
        assert_eq!(rows[1], ["10", "x", "y"]);
    }

    #[test]
    fn checksum_rows_and_blank_lines_are_dropped() {
        let rows = tokenize_blob("1,Bite,82,0\nc,4f2a\n\n2,Claw,82,0\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], "2");
    }
}
