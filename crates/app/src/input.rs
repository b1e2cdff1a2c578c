use std::fmt;

use exam_core::model::{Answer, AnswerShape, Exam, IdError, QuestionId};

/// One line typed by the student during `take`.
#[derive(Debug, Clone, PartialEq)]
pub enum TakeCommand {
    Answer { question: QuestionId, value: Answer },
    Clear(QuestionId),
    Status,
    Submit,
    Help,
}

#[derive(Debug, PartialEq)]
pub enum InputError {
    Empty,
    Unknown(String),
    MissingQuestion,
    MissingValue,
    InvalidId(IdError),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::Empty => write!(f, "empty command"),
            InputError::Unknown(cmd) => write!(f, "unknown command: {cmd} (try `help`)"),
            InputError::MissingQuestion => write!(f, "missing question id"),
            InputError::MissingValue => write!(f, "missing answer value"),
            InputError::InvalidId(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for InputError {}

impl TakeCommand {
    /// Parse a driver line. Multi-choice values are split on commas; other
    /// kinds keep the rest of the line as a single value.
    pub fn parse(line: &str, exam: &Exam) -> Result<Self, InputError> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        match word {
            "" => Err(InputError::Empty),
            "status" => Ok(Self::Status),
            "submit" => Ok(Self::Submit),
            "help" | "?" => Ok(Self::Help),
            "clear" => Ok(Self::Clear(parse_question(rest)?)),
            "answer" => {
                let rest = rest.trim();
                let (raw_id, raw_value) = rest
                    .split_once(char::is_whitespace)
                    .ok_or(if rest.is_empty() {
                        InputError::MissingQuestion
                    } else {
                        InputError::MissingValue
                    })?;
                let question = parse_question(raw_id)?;
                let raw_value = raw_value.trim();
                if raw_value.is_empty() {
                    return Err(InputError::MissingValue);
                }
                let multiple = exam
                    .question(&question)
                    .is_some_and(|q| q.kind().expected_shape() == AnswerShape::Multiple);
                let value = if multiple {
                    Answer::multiple(
                        raw_value
                            .split(',')
                            .map(str::trim)
                            .filter(|v| !v.is_empty()),
                    )
                } else {
                    Answer::single(raw_value)
                };
                Ok(Self::Answer { question, value })
            }
            other => Err(InputError::Unknown(other.to_string())),
        }
    }
}

fn parse_question(raw: &str) -> Result<QuestionId, InputError> {
    if raw.trim().is_empty() {
        return Err(InputError::MissingQuestion);
    }
    QuestionId::new(raw).map_err(InputError::InvalidId)
}

pub fn print_take_help() {
    println!("Commands:");
    println!("  answer <question> <value>[,<value>...]");
    println!("  clear <question>");
    println!("  status");
    println!("  submit");
}
