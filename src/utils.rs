use scraper::{ElementRef, Selector};
use std::fs;

/// Create an OSC8 file:// hyperlink for terminal output
pub fn osc8_file_link(path: &str, text: &str) -> String {
    let abs_path = fs::canonicalize(path)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| path.to_string());
    format!("\x1b]8;;file://{}\x1b\\{}\x1b]8;;\x1b\\", abs_path, text)
}

/// Compile a selector literal. Only used for fixed selectors written in this crate.
pub fn css(selector: &str) -> Selector {
    Selector::parse(selector).unwrap_or_else(|e| panic!("invalid selector {:?}: {}", selector, e))
}

/// Text of every descendant text node, each trimmed, concatenated
pub fn stripped_text(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect()
}

/// All descendant text joined, then trimmed once
pub fn trimmed_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Text content with runs of whitespace collapsed to single spaces
pub fn collapsed_text(element: ElementRef<'_>) -> String {
    let text: String = element.text().collect::<Vec<_>>().join(" ");

    let mut cleaned = String::new();
    let mut prev_was_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !prev_was_space && !cleaned.is_empty() {
                cleaned.push(' ');
                prev_was_space = true;
            }
        } else {
            cleaned.push(c);
            prev_was_space = false;
        }
    }
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_text_helpers() {
        let doc = Html::parse_fragment("<p> <strong>Career</strong>\n <em> 2TM </em></p>");
        let p = doc.select(&css("p")).next().unwrap();
        assert_eq!(stripped_text(p), "Career2TM");
        assert_eq!(trimmed_text(p), "Career\n  2TM");
        assert_eq!(collapsed_text(p), "Career 2TM");
    }
}
