//! Semantic reranking on top of similarity retrieval.
//!
//! The judge asks a chat model to pick the few candidates that best match the
//! requested vibe. Whatever the model returns is sanitized before it reaches the
//! orchestrator: unknown ids are dropped, duplicates removed, and ranks renumbered
//! to `1..n`. Unparseable output falls back to the first candidates in similarity
//! order; a failed or timed-out call becomes [`JudgeDegraded`].

use std::{collections::HashSet, fmt::Write as _, sync::Arc, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    error::AppError,
    models::RerankVerdict,
    services::{hydrator::ScoredMedia, llm::ChatCompletion},
};

/// Upper bound on verdicts taken from one judge call
pub const MAX_VERDICTS: usize = 3;

const JUDGE_TEMPERATURE: f32 = 0.3;

const SYSTEM_PROMPT: &str = "You curate recommendations by feeling rather than genre. \
Given a vibe request and a list of candidates with their vibe profiles, pick the ones \
whose mood, pacing and look best match what the user is chasing.

Reply with JSON only, in this shape:
{\"rankings\": [{\"media_id\": \"...\", \"rank\": 1, \"explanation\": \"...\"}]}

Use only media ids from the candidate list. Ranks start at 1 and must not repeat. \
Each explanation should say why that candidate matches the requested vibe.";

/// What came back from the underlying capability, before sanitizing
#[derive(Debug)]
pub enum JudgeOutcome {
    Ranked(Vec<RerankVerdict>),
    ParseFailure { raw: String },
    CapabilityError(AppError),
}

/// The judge could not be used; callers fall back to similarity order
#[derive(Debug, Error)]
pub enum JudgeDegraded {
    #[error("judge call failed: {0}")]
    Capability(String),
}

/// Sanitized verdicts ready for assembly
#[derive(Debug, Clone, PartialEq)]
pub struct Verdicts {
    pub verdicts: Vec<RerankVerdict>,
    /// Set when the verdicts are the default set used for unparseable output
    pub degraded: bool,
}

#[derive(Deserialize)]
struct JudgeResponse {
    rankings: Vec<RawVerdict>,
}

#[derive(Deserialize)]
struct RawVerdict {
    media_id: String,
    #[serde(default)]
    rank: Option<i64>,
    #[serde(default)]
    explanation: String,
}

#[derive(Clone)]
pub struct Judge {
    llm: Arc<dyn ChatCompletion>,
    timeout: Duration,
}

impl Judge {
    pub fn new(llm: Arc<dyn ChatCompletion>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub fn name(&self) -> String {
        self.llm.name()
    }

    /// Calls the capability once and classifies the raw result
    pub async fn judge(&self, query: &str, candidates: &[ScoredMedia]) -> JudgeOutcome {
        if candidates.is_empty() {
            return JudgeOutcome::Ranked(Vec::new());
        }

        let prompt = build_prompt(query, candidates);
        let response = tokio::time::timeout(
            self.timeout,
            self.llm.complete(SYSTEM_PROMPT, &prompt, JUDGE_TEMPERATURE),
        )
        .await;

        match response {
            Ok(Ok(raw)) => match parse_rankings(&raw) {
                Some(verdicts) => JudgeOutcome::Ranked(verdicts),
                None => JudgeOutcome::ParseFailure { raw },
            },
            Ok(Err(e)) => JudgeOutcome::CapabilityError(e),
            Err(_) => JudgeOutcome::CapabilityError(AppError::ExternalApi(format!(
                "judge timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    /// Judges `candidates` and returns at most [`MAX_VERDICTS`] clean verdicts
    pub async fn rerank(
        &self,
        query: &str,
        candidates: &[ScoredMedia],
    ) -> Result<Verdicts, JudgeDegraded> {
        match self.judge(query, candidates).await {
            JudgeOutcome::Ranked(raw) => Ok(Verdicts {
                verdicts: sanitize_verdicts(raw, candidates, MAX_VERDICTS),
                degraded: false,
            }),
            JudgeOutcome::ParseFailure { raw } => {
                tracing::warn!(
                    judge = %self.llm.name(),
                    response_len = raw.len(),
                    "Judge output was not valid JSON, using default verdicts"
                );
                Ok(Verdicts {
                    verdicts: default_verdicts(candidates, MAX_VERDICTS),
                    degraded: true,
                })
            }
            JudgeOutcome::CapabilityError(e) => Err(JudgeDegraded::Capability(e.to_string())),
        }
    }
}

fn build_prompt(query: &str, candidates: &[ScoredMedia]) -> String {
    let mut list = String::new();
    for (i, candidate) in candidates.iter().enumerate() {
        let media = &candidate.media;
        let year = media.year.map(|y| format!(" ({})", y)).unwrap_or_default();
        let _ = writeln!(
            list,
            "{}. [{}] {}{} - Vibe: {}",
            i + 1,
            media.id,
            media.title,
            year,
            media.vibe_profile
        );
    }

    format!(
        "Vibe request: \"{}\"\n\nCandidates:\n{}\nReturn the best matches, at most {}.",
        query,
        list,
        MAX_VERDICTS.min(candidates.len())
    )
}

/// Extracts the outermost `{...}` span, tolerating markdown fences or prose around it
fn parse_rankings(raw: &str) -> Option<Vec<RerankVerdict>> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }

    let response: JudgeResponse = serde_json::from_str(&raw[start..=end]).ok()?;
    let mut raw_verdicts: Vec<(usize, RawVerdict)> =
        response.rankings.into_iter().enumerate().collect();
    raw_verdicts.sort_by_key(|(position, v)| (v.rank.unwrap_or(i64::MAX), *position));

    Some(
        raw_verdicts
            .into_iter()
            .enumerate()
            .map(|(i, (_, v))| RerankVerdict {
                media_id: v.media_id,
                rank: i + 1,
                explanation: v.explanation,
            })
            .collect(),
    )
}

/// Drops unknown and repeated ids, keeps the judge's order, truncates, renumbers
pub fn sanitize_verdicts(
    verdicts: Vec<RerankVerdict>,
    candidates: &[ScoredMedia],
    max_verdicts: usize,
) -> Vec<RerankVerdict> {
    let known: HashSet<&str> = candidates.iter().map(|c| c.media.id.as_str()).collect();
    let mut seen = HashSet::new();

    let mut ordered = verdicts;
    ordered.sort_by_key(|v| v.rank);

    let mut clean: Vec<RerankVerdict> = Vec::with_capacity(max_verdicts);
    for verdict in ordered {
        if clean.len() == max_verdicts {
            break;
        }
        if !known.contains(verdict.media_id.as_str()) {
            tracing::debug!(media_id = %verdict.media_id, "Dropping verdict for unknown id");
            continue;
        }
        if !seen.insert(verdict.media_id.clone()) {
            continue;
        }
        clean.push(verdict);
    }

    for (i, verdict) in clean.iter_mut().enumerate() {
        verdict.rank = i + 1;
    }
    clean
}

/// First candidates in similarity order, explained by their own profile text
pub fn default_verdicts(candidates: &[ScoredMedia], max_verdicts: usize) -> Vec<RerankVerdict> {
    candidates
        .iter()
        .take(max_verdicts)
        .enumerate()
        .map(|(i, c)| RerankVerdict {
            media_id: c.media.id.clone(),
            rank: i + 1,
            explanation: format!("Matches your vibe based on: {}", c.media.vibe_profile),
        })
        .collect()
}
