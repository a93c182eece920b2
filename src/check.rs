//! Line-by-line comparison of a report against an expected answer.

use itertools::{
    EitherOrBoth::{Both, Left, Right},
    Itertools,
};
use thiserror::Error;

use crate::line_names::LineNames;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("At line {number} get '{yours}' but expect '{answer}'")]
    WrongLine {
        number: usize,
        yours: LineNames,
        answer: LineNames,
    },
    #[error("At line {number} output is more than answer\nGet: '{yours}'")]
    MoreThanAnswer { number: usize, yours: LineNames },
    #[error("At line {number} output is less than answer\nExpect: '{answer}'")]
    LessThanAnswer { number: usize, answer: LineNames },
}

/// Process exit codes of the checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Correct = 0,
    WrongLine = 1,
    MoreThanAnswer = 2,
    LessThanAnswer = 3,
    InputFormatError = 4,
    AnswerFormatError = 5,
    Usage = 255,
}

impl CheckError {
    #[inline]
    pub fn code(&self) -> ExitCode {
        match self {
            Self::WrongLine { .. } => ExitCode::WrongLine,
            Self::MoreThanAnswer { .. } => ExitCode::MoreThanAnswer,
            Self::LessThanAnswer { .. } => ExitCode::LessThanAnswer,
        }
    }
}

/// Fails at the first line where `yours` and `answer` disagree.
pub fn check(yours: &[LineNames], answer: &[LineNames]) -> Result<(), CheckError> {
    for (i, entry) in yours.iter().zip_longest(answer).enumerate() {
        let number = i + 1;
        match entry {
            Both(yours, answer) => {
                if yours != answer {
                    return Err(CheckError::WrongLine {
                        number,
                        yours: yours.clone(),
                        answer: answer.clone(),
                    });
                }
            }
            Left(yours) => {
                return Err(CheckError::MoreThanAnswer {
                    number,
                    yours: yours.clone(),
                })
            }
            Right(answer) => {
                return Err(CheckError::LessThanAnswer {
                    number,
                    answer: answer.clone(),
                })
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_names::parse_lines;

    fn lines(text: &str) -> Vec<LineNames> {
        parse_lines(text, false).unwrap()
    }

    #[test]
    fn test_correct() {
        let yours = lines("10 : f, g\n22 : printf\n");
        let answer = lines("10 : g, f\n22 : printf\n");
        assert_eq!(check(&yours, &answer), Ok(()));
        assert_eq!(check(&[], &[]), Ok(()));
    }

    #[test]
    fn test_wrong_line() {
        let yours = lines("10 : f\n22 : printf\n");
        let answer = lines("10 : f, g\n22 : printf\n");
        let err = check(&yours, &answer).unwrap_err();
        assert_eq!(err.code(), ExitCode::WrongLine);
        assert_eq!(err.to_string(), "At line 1 get '10 : f' but expect '10 : f, g'");
    }

    #[test]
    fn test_length_mismatch() {
        let short = lines("10 : f\n");
        let long = lines("10 : f\n22 : g\n");
        let err = check(&long, &short).unwrap_err();
        assert_eq!(err.code(), ExitCode::MoreThanAnswer);
        assert!(matches!(err, CheckError::MoreThanAnswer { number: 2, .. }));

        let err = check(&short, &long).unwrap_err();
        assert_eq!(err.code(), ExitCode::LessThanAnswer);
        assert!(matches!(err, CheckError::LessThanAnswer { number: 2, .. }));
    }
}
