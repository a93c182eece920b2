//! `N : f, g` report lines.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Callee names resolved at one source line.
#[derive(Debug, Clone)]
pub struct LineNames {
    pub number: usize,
    pub names: Vec<String>,
}

impl PartialEq for LineNames {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number && {
            let (mut names1, mut names2) = (self.names.clone(), other.names.clone());
            names1.sort();
            names2.sort();
            names1 == names2
        }
    }
}

impl Eq for LineNames {}

impl fmt::Display for LineNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.number, self.names.join(", "))
    }
}

impl LineNames {
    pub fn new(number: usize) -> Self {
        Self {
            number,
            names: vec![],
        }
    }

    pub fn add_name(&mut self, name: &str) {
        self.names.push(name.to_string());
    }

    /// In strict mode exactly one space must surround the colon and follow
    /// each comma.
    pub fn parse_from_str(s: &str, strict: bool) -> Result<Self, String> {
        let mut chars = s.chars();

        let mut line_number = String::new();
        let mut spaces_before_colon = 0;
        for c in chars.by_ref() {
            match c {
                c if c.is_ascii_digit() => line_number.push(c),
                ':' => break,
                ' ' => spaces_before_colon += 1,
                _ => return Err(format!("Unexpected char '{c}' in line-number")),
            }
        }
        if strict {
            if spaces_before_colon != 1 {
                return Err(format!(
                    "Got {spaces_before_colon} spaces before colon but expected 1"
                ));
            }
            chars
                .next()
                .filter(|c| *c == ' ')
                .ok_or_else(|| "Expect one space after colon".to_string())?;
        }
        let number = line_number.parse::<usize>().map_err(|e| e.to_string())?;
        let mut result = Self::new(number);

        let mut name = String::new();
        while let Some(c) = chars.next() {
            match c {
                c if c.is_alphanumeric() || c == '_' => name.push(c),
                ',' => {
                    if name.is_empty() {
                        return Err("Got comma but expect a function name".to_string());
                    }
                    result.add_name(&name);
                    name.clear();
                    if strict {
                        chars
                            .next()
                            .filter(|c| *c == ' ')
                            .ok_or_else(|| "Expect space after comma".to_string())?;
                    }
                }
                ' ' => {
                    if strict {
                        return Err("Too much spaces in function names".to_string());
                    }
                }
                _ => return Err(format!("Unexpected char '{c}' in function names")),
            }
        }
        if name.is_empty() {
            return Err("Unexpected End-Of-Line before a function name".to_string());
        }
        result.add_name(&name);
        Ok(result)
    }
}

impl FromStr for LineNames {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_from_str(s, false)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Line {index}: '{line}'\n{error}")]
pub struct ParseError {
    pub index: usize,
    pub line: String,
    pub error: String,
}

pub fn parse_lines(text: &str, strict: bool) -> Result<Vec<LineNames>, ParseError> {
    text.lines()
        .enumerate()
        .map(|(index, line)| {
            LineNames::parse_from_str(line, strict).map_err(|error| ParseError {
                index: index + 1,
                line: line.to_string(),
                error,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let mut names = LineNames::new(12);
        names.add_name("plus");
        names.add_name("minus");
        assert_eq!(names.to_string(), "12 : plus, minus");
    }

    #[test]
    fn test_order_insensitive_eq() {
        let a: LineNames = "3 : f, g".parse().unwrap();
        let b: LineNames = "3 : g, f".parse().unwrap();
        let c: LineNames = "4 : g, f".parse().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_lenient() {
        let names = LineNames::parse_from_str("10  :  f,g ,  h", false).unwrap();
        assert_eq!(names.number, 10);
        assert_eq!(names.names, vec!["f", "g", "h"]);
    }

    #[test]
    fn test_strict() {
        assert!(LineNames::parse_from_str("10 : f, g", true).is_ok());
        assert!(LineNames::parse_from_str("10: f, g", true).is_err());
        assert!(LineNames::parse_from_str("10 :f, g", true).is_err());
        assert!(LineNames::parse_from_str("10 : f,g", true).is_err());
        assert!(LineNames::parse_from_str("10 : f,  g", true).is_err());
    }

    #[test]
    fn test_malformed() {
        assert!(LineNames::parse_from_str("1x : f", false).is_err());
        assert!(LineNames::parse_from_str("1 : ", false).is_err());
        assert!(LineNames::parse_from_str("1 : f,,g", false).is_err());
        assert!(LineNames::parse_from_str("1 : f-g", false).is_err());
        assert!(LineNames::parse_from_str("1 : llvm.memcpy", false).is_err());
        assert!(LineNames::parse_from_str(" : f", false).is_err());
    }

    #[test]
    fn test_parse_lines() {
        let lines = parse_lines("1 : f\n2 : g, h\n", true).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].names, vec!["g", "h"]);

        let err = parse_lines("1 : f\n2 - g\n", false).unwrap_err();
        assert_eq!(err.index, 2);
        assert_eq!(err.line, "2 - g");
    }
}
