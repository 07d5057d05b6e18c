//! Хелперы для A1/R1C1 нотации диапазонов.

/// Заголовок листа в виде, пригодном для диапазона: `'My Sheet'`.
pub fn quote_sheet(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// Диапазон строки заголовков: `'Title'!R1C1:R1C<n>`.
pub fn header_range(title: &str, columns: usize) -> String {
    format!("{}!R1C1:R1C{}", quote_sheet(title), columns.max(1))
}

/// Диапазон всего листа (для append'а строк и подсчёта).
pub fn sheet_range(title: &str) -> String {
    quote_sheet(title)
}

/// Заголовок листа из диапазона (`'A b'!A1:B2` → `A b`, `Sheet1` → `Sheet1`).
///
/// В quoted заголовке `!` и `''` допустимы, диапазон ищется после
/// закрывающей кавычки.
pub fn sheet_of(range: &str) -> String {
    if let Some(quoted) = range.strip_prefix('\'') {
        let mut title = String::new();
        let mut chars = quoted.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '\'' {
                title.push(c);
                continue;
            }
            if chars.peek() == Some(&'\'') {
                chars.next();
                title.push('\'');
                continue;
            }
            return title;
        }
        // Нет закрывающей кавычки: берём как есть.
        return range.to_string();
    }
    match range.find('!') {
        Some(idx) => range[..idx].to_string(),
        None => range.to_string(),
    }
}

/// Номер первой строки из `updatedRange` ответа append'а
/// (`Sheet1!A5:U5` → 5, `'Sheet1'!R7C1:R7C3` → 7).
pub fn first_row(range: &str) -> Option<u32> {
    let cells = &range[range.rfind('!')? + 1..];
    let start = cells.split(':').next()?;
    if let Some(rest) = start.strip_prefix('R') {
        if let Some(c_idx) = rest.find('C') {
            if let Ok(row) = rest[..c_idx].parse() {
                return Some(row);
            }
        }
    }
    let digits: String = start
        .chars()
        .skip_while(|c| c.is_ascii_alphabetic())
        .collect();
    digits.parse().ok()
}
