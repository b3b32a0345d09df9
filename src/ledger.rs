//! Intervention ledger
//!
//! Append-only record of alert → response → session → outcome, with a
//! fixed-window outcome state machine. An intervention starts `Pending` and
//! resolves exactly once: to `Relapse` when a relapse is logged within the
//! outcome window after its creation, or to `Success` once that window
//! elapses with no relapse. Resolved outcomes are never reversed.
//!
//! The ledger is read back during the next training run: resolved outcomes
//! whose prediction disagreed with reality become sample-weight boosts (see
//! `balance`).

use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Hours after creation during which a logged relapse is attributed to an
/// intervention, and after which a quiet intervention counts as a success.
pub const DEFAULT_OUTCOME_WINDOW_HOURS: i64 = 48;

/// Minimum completed uses before a tool's success rate is reported.
pub const MIN_TOOL_USES: u32 = 2;

/// Evening hours (inclusive) used for the evening-relapse share.
const EVENING_START_HOUR: u32 = 18;

/// How the user reacted to an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Struggling,
    Fine,
    Dismissed,
    /// Session opened without an alert prompting it
    SelfInitiated,
}

/// Terminal state of an intervention's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Pending,
    Success,
    Relapse,
}

/// The prediction that triggered an alert, captured at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionSnapshot {
    pub risk_score: u8,
    pub confidence: f64,
    pub used_ml: bool,
}

/// The user's recorded reaction to an alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterventionResponse {
    pub kind: ResponseKind,
    pub at: DateTime<Utc>,
}

/// A self-help session opened from an intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Tool identifier (breathing exercise, journaling prompt, ...)
    pub tool: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<f64>,
}

/// Outcome of an intervention after its window resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionOutcome {
    pub status: OutcomeStatus,
    pub determined_at: Option<DateTime<Utc>>,
    /// Identifier of the relapse record that resolved this intervention
    pub relapse_id: Option<String>,
    pub hours_until_relapse: Option<f64>,
}

impl Default for InterventionOutcome {
    fn default() -> Self {
        Self {
            status: OutcomeStatus::Pending,
            determined_at: None,
            relapse_id: None,
            hours_until_relapse: None,
        }
    }
}

/// One tracked intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub prediction: Option<PredictionSnapshot>,
    pub response: Option<InterventionResponse>,
    pub session: Option<SessionRecord>,
    pub outcome: InterventionOutcome,
}

/// Flattened view of one intervention for the training feedback step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackRecord {
    pub created_at: DateTime<Utc>,
    pub predicted_risk: Option<u8>,
    pub outcome: OutcomeStatus,
}

/// Per-tool usage statistics over completed sessions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolStats {
    pub uses: u32,
    pub successes: u32,
    pub success_rate: f64,
}

/// Outcome tally for one response cohort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeTally {
    pub total: u32,
    pub successes: u32,
    pub success_rate: f64,
}

/// Responded-vs-ignored outcome comparison over resolved interventions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseComparison {
    pub responded: OutcomeTally,
    pub ignored: OutcomeTally,
}

/// The append-only intervention ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionLedger {
    interventions: Vec<Intervention>,
    #[serde(default = "default_window")]
    outcome_window_hours: i64,
}

fn default_window() -> i64 {
    DEFAULT_OUTCOME_WINDOW_HOURS
}

impl Default for InterventionLedger {
    fn default() -> Self {
        Self::new(DEFAULT_OUTCOME_WINDOW_HOURS)
    }
}

impl InterventionLedger {
    pub fn new(outcome_window_hours: i64) -> Self {
        Self {
            interventions: Vec::new(),
            outcome_window_hours,
        }
    }

    /// Append a new pending intervention and return its id.
    pub fn create(
        &mut self,
        at: DateTime<Utc>,
        prediction: Option<PredictionSnapshot>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.interventions.push(Intervention {
            id,
            created_at: at,
            prediction,
            response: None,
            session: None,
            outcome: InterventionOutcome::default(),
        });
        log::debug!("intervention {id} created");
        id
    }

    /// Record the user's reaction to an alert. The first response wins;
    /// recording a second one is rejected.
    pub fn record_response(
        &mut self,
        id: Uuid,
        kind: ResponseKind,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let intervention = self.get_mut(id)?;
        if intervention.response.is_some() {
            return Err(EngineError::Ledger(format!(
                "intervention {id} already has a response"
            )));
        }
        intervention.response = Some(InterventionResponse { kind, at });
        Ok(())
    }

    /// Record that a self-help session was opened.
    pub fn start_session(
        &mut self,
        id: Uuid,
        tool: &str,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let intervention = self.get_mut(id)?;
        if intervention.session.is_some() {
            return Err(EngineError::Ledger(format!(
                "intervention {id} already has a session"
            )));
        }
        intervention.session = Some(SessionRecord {
            tool: tool.to_string(),
            started_at: at,
            completed_at: None,
            duration_minutes: None,
        });
        Ok(())
    }

    /// Record that the open session finished.
    pub fn complete_session(
        &mut self,
        id: Uuid,
        duration_minutes: f64,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let intervention = self.get_mut(id)?;
        let Some(session) = intervention.session.as_mut() else {
            return Err(EngineError::Ledger(format!(
                "intervention {id} has no session to complete"
            )));
        };
        if session.completed_at.is_some() {
            return Err(EngineError::Ledger(format!(
                "intervention {id} session already completed"
            )));
        }
        session.completed_at = Some(at);
        session.duration_minutes = Some(duration_minutes);
        Ok(())
    }

    /// A relapse was logged: resolve every pending intervention created
    /// within the prior outcome window to `Relapse`. Returns how many were
    /// resolved.
    pub fn on_relapse(&mut self, at: DateTime<Utc>, relapse_id: Option<&str>) -> usize {
        let window = self.outcome_window_hours;
        let mut resolved = 0;
        for intervention in &mut self.interventions {
            if intervention.outcome.status != OutcomeStatus::Pending {
                continue;
            }
            let elapsed = at - intervention.created_at;
            let hours = elapsed.num_seconds() as f64 / 3600.0;
            if hours < 0.0 || hours > window as f64 {
                continue;
            }
            intervention.outcome = InterventionOutcome {
                status: OutcomeStatus::Relapse,
                determined_at: Some(at),
                relapse_id: relapse_id.map(str::to_string),
                hours_until_relapse: Some(hours),
            };
            resolved += 1;
            log::info!(
                "intervention {} resolved to relapse after {hours:.1}h",
                intervention.id
            );
        }
        resolved
    }

    /// Resolve every pending intervention whose outcome window has elapsed
    /// with no relapse to `Success`. Invoked opportunistically, typically
    /// on load. Returns how many were resolved.
    pub fn check_successful_interventions(&mut self, now: DateTime<Utc>) -> usize {
        let window = self.outcome_window_hours;
        let mut resolved = 0;
        for intervention in &mut self.interventions {
            if intervention.outcome.status != OutcomeStatus::Pending {
                continue;
            }
            let hours = (now - intervention.created_at).num_seconds() as f64 / 3600.0;
            if hours <= window as f64 {
                continue;
            }
            intervention.outcome = InterventionOutcome {
                status: OutcomeStatus::Success,
                determined_at: Some(now),
                relapse_id: None,
                hours_until_relapse: None,
            };
            resolved += 1;
            log::debug!("intervention {} resolved to success", intervention.id);
        }
        resolved
    }

    /// Flattened view feeding the training feedback step.
    pub fn feedback_records(&self) -> Vec<FeedbackRecord> {
        self.interventions
            .iter()
            .map(|i| FeedbackRecord {
                created_at: i.created_at,
                predicted_risk: i.prediction.map(|p| p.risk_score),
                outcome: i.outcome.status,
            })
            .collect()
    }

    /// Success rate per tool over resolved interventions with a completed
    /// session. Tools with fewer than [`MIN_TOOL_USES`] completed uses are
    /// withheld.
    pub fn tool_success_rates(&self) -> BTreeMap<String, ToolStats> {
        let mut tallies: BTreeMap<String, (u32, u32)> = BTreeMap::new();
        for intervention in &self.interventions {
            let Some(session) = &intervention.session else {
                continue;
            };
            if session.completed_at.is_none() {
                continue;
            }
            let success = match intervention.outcome.status {
                OutcomeStatus::Success => true,
                OutcomeStatus::Relapse => false,
                OutcomeStatus::Pending => continue,
            };
            let entry = tallies.entry(session.tool.clone()).or_insert((0, 0));
            entry.0 += 1;
            if success {
                entry.1 += 1;
            }
        }

        tallies
            .into_iter()
            .filter(|(_, (uses, _))| *uses >= MIN_TOOL_USES)
            .map(|(tool, (uses, successes))| {
                (
                    tool,
                    ToolStats {
                        uses,
                        successes,
                        success_rate: f64::from(successes) / f64::from(uses),
                    },
                )
            })
            .collect()
    }

    /// Compare outcomes between interventions the user engaged with and
    /// ones they ignored or dismissed, over resolved interventions.
    pub fn response_comparison(&self) -> ResponseComparison {
        let mut responded = OutcomeTally::default();
        let mut ignored = OutcomeTally::default();

        for intervention in &self.interventions {
            let success = match intervention.outcome.status {
                OutcomeStatus::Success => true,
                OutcomeStatus::Relapse => false,
                OutcomeStatus::Pending => continue,
            };
            let engaged = matches!(
                intervention.response.map(|r| r.kind),
                Some(ResponseKind::Struggling)
                    | Some(ResponseKind::Fine)
                    | Some(ResponseKind::SelfInitiated)
            );
            let tally = if engaged { &mut responded } else { &mut ignored };
            tally.total += 1;
            if success {
                tally.successes += 1;
            }
        }

        for tally in [&mut responded, &mut ignored] {
            if tally.total > 0 {
                tally.success_rate = f64::from(tally.successes) / f64::from(tally.total);
            }
        }

        ResponseComparison { responded, ignored }
    }

    /// Share of resolved relapse outcomes determined in the evening.
    pub fn evening_relapse_pct(&self) -> Option<f64> {
        let relapse_hours: Vec<u32> = self
            .interventions
            .iter()
            .filter(|i| i.outcome.status == OutcomeStatus::Relapse)
            .filter_map(|i| i.outcome.determined_at)
            .map(|at| at.hour())
            .collect();
        if relapse_hours.is_empty() {
            return None;
        }
        let evening = relapse_hours
            .iter()
            .filter(|h| **h >= EVENING_START_HOUR)
            .count();
        Some(evening as f64 / relapse_hours.len() as f64)
    }

    /// Most recent outcome resolution, if any.
    pub fn latest_resolution(&self) -> Option<DateTime<Utc>> {
        self.interventions
            .iter()
            .filter_map(|i| i.outcome.determined_at)
            .max()
    }

    pub fn get(&self, id: Uuid) -> Option<&Intervention> {
        self.interventions.iter().find(|i| i.id == id)
    }

    pub fn interventions(&self) -> &[Intervention] {
        &self.interventions
    }

    pub fn len(&self) -> usize {
        self.interventions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interventions.is_empty()
    }

    fn get_mut(&mut self, id: Uuid) -> Result<&mut Intervention, EngineError> {
        self.interventions
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(EngineError::UnknownIntervention(id))
    }
}
