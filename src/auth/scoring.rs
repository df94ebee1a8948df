use std::iter::Sum;

/// Score delta produced by a single scoring rule.
///
/// Rules never touch a shared result: they return an `Assessment` and the
/// evaluator folds them (see [`Sum`]) in rule order, so issues and
/// recommendations keep the order in which rules were applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assessment {
    score: i32,
    issues: Vec<String>,
    recommendations: Vec<String>,
}

impl Assessment {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn points(points: i32) -> Self {
        Self {
            score: points,
            ..Self::default()
        }
    }

    pub fn issue(message: impl Into<String>) -> Self {
        Self::none().with_issue(message)
    }

    pub fn recommend(message: impl Into<String>) -> Self {
        Self::none().with_recommendation(message)
    }

    pub fn with_points(mut self, points: i32) -> Self {
        self.score += points;
        self
    }

    pub fn with_issue(mut self, message: impl Into<String>) -> Self {
        self.issues.push(message.into());
        self
    }

    pub fn with_recommendation(mut self, message: impl Into<String>) -> Self {
        self.recommendations.push(message.into());
        self
    }

    pub fn with_recommendations<I, S>(mut self, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recommendations
            .extend(messages.into_iter().map(Into::into));
        self
    }

    pub fn merge(mut self, other: Assessment) -> Self {
        self.score += other.score;
        self.issues.extend(other.issues);
        self.recommendations.extend(other.recommendations);
        self
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn issues(&self) -> &[String] {
        &self.issues
    }

    pub fn recommendations(&self) -> &[String] {
        &self.recommendations
    }

    pub(crate) fn into_parts(self) -> (i32, Vec<String>, Vec<String>) {
        (self.score, self.issues, self.recommendations)
    }
}

impl Sum for Assessment {
    fn sum<I: Iterator<Item = Assessment>>(iter: I) -> Self {
        iter.fold(Assessment::none(), Assessment::merge)
    }
}
