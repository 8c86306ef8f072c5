/// Column separator used in log messages (box drawing light vertical, U+2502)
pub const COLUMN_DELIMITER: char = '│';

pub type LogRow = Vec<String>;

/// Split message text into log rows: one row per line, one column per
/// delimiter-separated field. A line without the delimiter is a single
/// untouched column.
pub fn parse_log_rows(text: &str) -> Vec<LogRow> {
    text.split('\n').map(parse_line).collect()
}

fn parse_line(line: &str) -> LogRow {
    if line.contains(COLUMN_DELIMITER) {
        line.split(COLUMN_DELIMITER)
            .map(|field| field.trim().to_string())
            .collect()
    } else {
        vec![line.to_string()]
    }
}
