//! Development-test scoring

use std::fmt;

use serde::Serialize;

use relex_core::Symbol;

/// How one decoded pair compares to its gold tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Correct,
    Spurious,
    Missed,
    WrongType,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Correct => "CORRECT",
            Self::Spurious => "SPURIOUS",
            Self::Missed => "MISSING",
            Self::WrongType => "WRONG TYPE",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DevTestCounts {
    pub correct: usize,
    pub missed: usize,
    pub spurious: usize,
    pub wrong_type: usize,
}

impl DevTestCounts {
    /// Score one pair; `None` when both sides are the none tag
    pub fn record(&mut self, gold: &Symbol, hypothesis: &Symbol, none: &Symbol) -> Option<Outcome> {
        if gold == none && hypothesis == none {
            return None;
        }
        let outcome = if gold == hypothesis {
            self.correct += 1;
            Outcome::Correct
        } else if gold == none {
            self.spurious += 1;
            Outcome::Spurious
        } else if hypothesis == none {
            self.missed += 1;
            Outcome::Missed
        } else {
            self.wrong_type += 1;
            Outcome::WrongType
        };
        Some(outcome)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.correct, self.missed + self.wrong_type + self.correct)
    }

    pub fn precision(&self) -> f64 {
        ratio(self.correct, self.spurious + self.wrong_type + self.correct)
    }

    pub fn f_measure(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl fmt::Display for DevTestCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CORRECT: {}", self.correct)?;
        writeln!(f, "MISSED: {}", self.missed)?;
        writeln!(f, "SPURIOUS: {}", self.spurious)?;
        writeln!(f, "WRONG TYPE: {}", self.wrong_type)?;
        writeln!(f)?;
        writeln!(f, "RECALL: {:.4}", self.recall())?;
        write!(f, "PRECISION: {:.4}", self.precision())
    }
}
