//! Full-text term splitting.

/// A term and its character offset within the text node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub text: String,
    pub offset: u32,
}

/// Splits text into lower-cased runs of alphanumeric characters.
pub struct Terms<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    position: u32,
}

impl<'a> Terms<'a> {
    pub fn new(text: &'a str) -> Self {
        Terms {
            chars: text.chars().peekable(),
            position: 0,
        }
    }
}

impl Iterator for Terms<'_> {
    type Item = Term;

    fn next(&mut self) -> Option<Term> {
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() {
                break;
            }
            self.chars.next();
            self.position += 1;
        }
        let offset = self.position;
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if !c.is_alphanumeric() {
                break;
            }
            text.extend(c.to_lowercase());
            self.chars.next();
            self.position += 1;
        }
        if text.is_empty() {
            None
        } else {
            Some(Term { text, offset })
        }
    }
}

#[inline]
pub fn terms(text: &str) -> Terms<'_> {
    Terms::new(text)
}
