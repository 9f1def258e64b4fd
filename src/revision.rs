use serde::{Deserialize, Serialize};

/// How a revision loop ended. Exhaustion is not an error; the last round is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionStatus {
    Accepted,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RevisionState {
    Drafting,
    Critiquing,
    Retrying,
    Accepted,
    Exhausted,
}

/// One generate-then-critique cycle. `round` is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Round<F> {
    pub round: usize,
    pub content: String,
    pub feedback: F,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevisionOutcome<F> {
    pub status: RevisionStatus,
    pub content: String,
    pub feedback: F,
    pub rounds: usize,
    /// Every round in order, including the final one.
    pub history: Vec<Round<F>>,
}

/// Bounded draft/critique loop shared by outline generation and chapter drafting.
#[derive(Debug, Clone)]
pub struct RevisionController {
    name: &'static str,
    max_rounds: usize,
}

impl RevisionController {
    pub fn new(name: &'static str, max_rounds: usize) -> Self {
        Self {
            name,
            max_rounds: max_rounds.max(1),
        }
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Runs `generate` then `critique` until `accept` passes or the bound is hit.
    /// `generate` receives the previous round, if any.
    pub fn revise<F, G, C, A>(
        &self,
        mut generate: G,
        mut critique: C,
        accept: A,
    ) -> anyhow::Result<RevisionOutcome<F>>
    where
        F: Clone,
        G: FnMut(Option<&Round<F>>) -> anyhow::Result<String>,
        C: FnMut(&str, usize) -> anyhow::Result<F>,
        A: Fn(&F) -> bool,
    {
        let mut history: Vec<Round<F>> = Vec::with_capacity(self.max_rounds);
        let mut draft = String::new();
        let mut state = RevisionState::Drafting;

        loop {
            match state {
                RevisionState::Drafting => {
                    let round = history.len() + 1;
                    tracing::debug!(loop_name = self.name, round, "drafting");
                    draft = generate(history.last())?;
                    state = RevisionState::Critiquing;
                }
                RevisionState::Critiquing => {
                    let round = history.len() + 1;
                    let feedback = critique(&draft, round)?;
                    let accepted = accept(&feedback);
                    history.push(Round {
                        round,
                        content: std::mem::take(&mut draft),
                        feedback,
                    });
                    state = if accepted {
                        RevisionState::Accepted
                    } else if round >= self.max_rounds {
                        RevisionState::Exhausted
                    } else {
                        RevisionState::Retrying
                    };
                }
                RevisionState::Retrying => {
                    tracing::info!(
                        loop_name = self.name,
                        round = history.len(),
                        max_rounds = self.max_rounds,
                        "not accepted; retrying"
                    );
                    state = RevisionState::Drafting;
                }
                RevisionState::Accepted | RevisionState::Exhausted => break,
            }
        }

        let status = if state == RevisionState::Accepted {
            tracing::info!(loop_name = self.name, rounds = history.len(), "accepted");
            RevisionStatus::Accepted
        } else {
            tracing::warn!(
                loop_name = self.name,
                rounds = history.len(),
                "revision bound reached; using the last version"
            );
            RevisionStatus::Exhausted
        };

        let Some(last) = history.last().cloned() else {
            anyhow::bail!("{} revision loop finished without a round", self.name);
        };
        Ok(RevisionOutcome {
            status,
            content: last.content,
            feedback: last.feedback,
            rounds: history.len(),
            history,
        })
    }
}

/// Accepts feedback containing any configured quality marker, ignoring case.
#[derive(Debug, Clone)]
pub struct QualityGate {
    markers: Vec<String>,
}

impl QualityGate {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|marker| marker.as_ref().trim().to_lowercase())
                .filter(|marker| !marker.is_empty())
                .collect(),
        }
    }

    pub fn accepts(&self, feedback: &str) -> bool {
        let feedback = feedback.to_lowercase();
        self.markers.iter().any(|marker| feedback.contains(marker))
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(["excellent", "outstanding"])
    }
}
