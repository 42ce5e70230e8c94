//! Message text normalization.

/// A message prepared for matching.
///
/// `display` keeps the user's casing so extracted entities can be echoed
/// back verbatim; `folded` is the lowercase form rules are matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub display: String,
    pub folded: String,
}

impl Normalized {
    pub fn is_empty(&self) -> bool {
        self.display.is_empty()
    }
}

/// Trim, drop zero-width/control characters and collapse runs of whitespace
/// to a single space.
pub fn normalize(text: &str) -> Normalized {
    let cleaned: String = text
        .chars()
        .filter(|c| !is_invisible(*c))
        .collect();
    let display = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let folded = display.to_lowercase();
    Normalized { display, folded }
}

fn is_invisible(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}')
        || (c.is_control() && !c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_keeps_case() {
        let n = normalize("  My   TSC\tTTP-247\n ");
        assert_eq!(n.display, "My TSC TTP-247");
        assert_eq!(n.folded, "my tsc ttp-247");
    }

    #[test]
    fn strips_zero_width_characters() {
        let n = normalize("he\u{200B}llo\u{FEFF}");
        assert_eq!(n.display, "hello");
    }

    #[test]
    fn blank_input_is_empty() {
        assert!(normalize(" \n\t ").is_empty());
    }
}
