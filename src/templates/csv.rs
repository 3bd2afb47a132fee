use indexmap::IndexMap;

/// A data line that was dropped because its field count did not match the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    /// 1-based line number within the trimmed input (the header is line 1).
    pub line_number: usize,
    pub expected: usize,
    pub found: usize,
}

#[derive(Debug, Clone)]
pub struct CsvRow {
    pub line_number: usize,
    fields: IndexMap<String, String>,
}

impl CsvRow {
    pub fn get(&self, column: &str) -> &str {
        self.fields.get(column).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<CsvRow>,
    pub skipped: Vec<SkippedRow>,
}

/// Splits one line into fields. Multi-line quoted fields are not supported;
/// callers split records on `\n` first.
pub fn parse_csv_line(line: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                result.push(current.trim().to_string());
                current.clear();
            }
            other => current.push(other),
        }
    }

    result.push(current.trim().to_string());
    result
}

pub fn parse_csv(content: &str) -> CsvTable {
    let mut lines = content.trim_start_matches('\u{feff}').trim().split('\n');
    let Some(header_line) = lines.next() else {
        return CsvTable::default();
    };

    let headers: Vec<String> = header_line
        .split(',')
        .map(|header| header.trim().to_string())
        .collect();
    let mut table = CsvTable {
        headers,
        rows: Vec::new(),
        skipped: Vec::new(),
    };

    for (index, line) in lines.enumerate() {
        let line_number = index + 2;
        let values = parse_csv_line(line);
        if values.len() != table.headers.len() {
            table.skipped.push(SkippedRow {
                line_number,
                expected: table.headers.len(),
                found: values.len(),
            });
            continue;
        }

        let fields = table
            .headers
            .iter()
            .cloned()
            .zip(values)
            .collect::<IndexMap<_, _>>();
        table.rows.push(CsvRow {
            line_number,
            fields,
        });
    }

    table
}

pub fn escape_csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn write_csv_line<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|field| escape_csv_field(field.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}
