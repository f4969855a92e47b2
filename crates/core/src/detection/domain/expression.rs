use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Expression labels in their fixed enumeration order.
///
/// Declaration order doubles as the tie-break order for
/// [`ExpressionScores::dominant`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl Expression {
    pub const ALL: [Expression; 7] = [
        Expression::Neutral,
        Expression::Happy,
        Expression::Sad,
        Expression::Angry,
        Expression::Fearful,
        Expression::Disgusted,
        Expression::Surprised,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Happy => "happy",
            Expression::Sad => "sad",
            Expression::Angry => "angry",
            Expression::Fearful => "fearful",
            Expression::Disgusted => "disgusted",
            Expression::Surprised => "surprised",
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Expression label → confidence in [0, 1].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpressionScores {
    scores: BTreeMap<Expression, f64>,
}

impl ExpressionScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, expression: Expression, score: f64) -> Self {
        self.set(expression, score);
        self
    }

    pub fn set(&mut self, expression: Expression, score: f64) {
        self.scores.insert(expression, score);
    }

    pub fn get(&self, expression: Expression) -> Option<f64> {
        self.scores.get(&expression).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Label with the highest score; ties keep the earliest label in
    /// enumeration order. `None` when no scores are present.
    pub fn dominant(&self) -> Option<Expression> {
        let mut best: Option<(Expression, f64)> = None;
        // BTreeMap iterates in enumeration order.
        for (&expr, &score) in &self.scores {
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((expr, score)),
            }
        }
        best.map(|(expr, _)| expr)
    }
}

impl FromIterator<(Expression, f64)> for ExpressionScores {
    fn from_iter<T: IntoIterator<Item = (Expression, f64)>>(iter: T) -> Self {
        Self {
            scores: iter.into_iter().collect(),
        }
    }
}
