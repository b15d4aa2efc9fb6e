//! Boundary defense: the gate every destructive region removal passes.
//!
//! Candidates are tried in order (cached hint, then fresh service
//! detection). Each one must pass position validation (Phase A) and content
//! verification (Phase B). When none survives, an AI-independent detector
//! re-derives the boundary (Phase C), and its result must pass A and B too.
//! When that also fails the region is left alone.

pub mod policy;

pub use policy::Rejection;

use crate::config::DefensePolicy;
use crate::detect::{self, Detection, Evidence};
use crate::model::{BoundaryInfo, DetectionSource, LineRange, RegionKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// AI-independent boundary detection used by Phase C.
pub trait HeuristicDetector: Send + Sync {
    /// Detects a single region.
    fn detect(&self, kind: RegionKind, lines: &[&str], policy: &DefensePolicy) -> Detection;

    /// Detects every block of a multi-block region (auxiliary lists, notes).
    fn detect_all(&self, kind: RegionKind, lines: &[&str], policy: &DefensePolicy) -> Vec<BoundaryInfo> {
        self.detect(kind, lines, policy).boundary.into_iter().collect()
    }
}

/// Content verification used by Phase B.
pub trait ContentVerifier: Send + Sync {
    fn verify(&self, kind: RegionKind, lines: &[&str]) -> Evidence;
}

/// Regex and position based detectors from [`crate::detect`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternHeuristics;

impl HeuristicDetector for PatternHeuristics {
    fn detect(&self, kind: RegionKind, lines: &[&str], policy: &DefensePolicy) -> Detection {
        detect::detect_region(kind, lines, policy)
    }

    fn detect_all(&self, kind: RegionKind, lines: &[&str], policy: &DefensePolicy) -> Vec<BoundaryInfo> {
        match kind {
            RegionKind::AuxiliaryLists => detect::detect_auxiliary_lists(lines, policy)
                .iter()
                .map(|list| list.boundary())
                .collect(),
            RegionKind::Notes => detect::detect_notes_sections(lines, policy),
            _ => self.detect(kind, lines, policy).boundary.into_iter().collect(),
        }
    }
}

/// Header and entry marker checks from [`crate::detect::evidence`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerVerifier;

impl ContentVerifier for MarkerVerifier {
    fn verify(&self, kind: RegionKind, lines: &[&str]) -> Evidence {
        detect::verify(kind, lines)
    }
}

/// The defense phase that produced a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefensePhase {
    /// Phase A: position, size, and confidence.
    Validation,
    /// Phase B: region-appropriate markers.
    Verification,
}

/// A boundary proposed by some detection source.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub boundary: BoundaryInfo,
    pub source: DetectionSource,
}

impl Candidate {
    pub fn new(boundary: BoundaryInfo, source: DetectionSource) -> Self {
        Self { boundary, source }
    }
}

/// A boundary that passed Phases A and B.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedBoundary {
    pub range: LineRange,
    pub source: DetectionSource,
    pub confidence: f64,
    pub evidence: Evidence,
}

/// A rejected candidate and why.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedBoundary {
    pub source: DetectionSource,
    pub phase: DefensePhase,
    pub rejection: Rejection,
}

/// Result of running the full protocol for one region.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DefenseOutcome {
    /// Accepted ranges, sorted and non-overlapping. Empty means no-op.
    pub accepted: Vec<AcceptedBoundary>,
    pub rejected: Vec<RejectedBoundary>,
    /// Set when Phase C ran.
    pub fallback_used: bool,
}

impl DefenseOutcome {
    pub fn is_noop(&self) -> bool {
        self.accepted.is_empty()
    }

    /// The single accepted range of a single-block region.
    pub fn first(&self) -> Option<&AcceptedBoundary> {
        self.accepted.first()
    }
}

/// The three-phase boundary defense.
#[derive(Clone)]
pub struct BoundaryDefense {
    policy: DefensePolicy,
    heuristics: Arc<dyn HeuristicDetector>,
    verifier: Arc<dyn ContentVerifier>,
}

impl std::fmt::Debug for BoundaryDefense {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundaryDefense")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for BoundaryDefense {
    fn default() -> Self {
        Self::new(DefensePolicy::default())
    }
}

impl BoundaryDefense {
    /// Creates a defense with the built-in heuristics and verifier.
    pub fn new(policy: DefensePolicy) -> Self {
        Self {
            policy,
            heuristics: Arc::new(PatternHeuristics),
            verifier: Arc::new(MarkerVerifier),
        }
    }

    pub fn with_heuristics(mut self, heuristics: Arc<dyn HeuristicDetector>) -> Self {
        self.heuristics = heuristics;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn ContentVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_policy(mut self, policy: DefensePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &DefensePolicy {
        &self.policy
    }

    /// Phase A: resolves the boundary and checks confidence, position, and size.
    pub fn validate(
        &self,
        kind: RegionKind,
        boundary: &BoundaryInfo,
        total_lines: usize,
    ) -> Result<LineRange, Rejection> {
        let range = boundary
            .resolve(kind, total_lines)
            .ok_or(Rejection::Unresolvable)?;
        self.policy.check_confidence(boundary.confidence)?;
        self.policy.check_position(kind, range, total_lines)?;
        Ok(range)
    }

    /// Phase B: checks the addressed lines for region markers.
    pub fn verify(
        &self,
        kind: RegionKind,
        range: LineRange,
        lines: &[&str],
    ) -> Result<Evidence, Rejection> {
        let evidence = self.verifier.verify(kind, &lines[range.as_indices()]);
        if evidence.found {
            Ok(evidence)
        } else {
            Err(Rejection::MissingEvidence(evidence.explanation))
        }
    }

    /// Phases A and B for one candidate.
    pub fn check(
        &self,
        kind: RegionKind,
        candidate: &Candidate,
        lines: &[&str],
    ) -> Result<AcceptedBoundary, RejectedBoundary> {
        let reject = |phase, rejection| RejectedBoundary {
            source: candidate.source,
            phase,
            rejection,
        };
        let range = self
            .validate(kind, &candidate.boundary, lines.len())
            .map_err(|r| reject(DefensePhase::Validation, r))?;
        let evidence = self
            .verify(kind, range, lines)
            .map_err(|r| reject(DefensePhase::Verification, r))?;
        Ok(AcceptedBoundary {
            range,
            source: candidate.source,
            confidence: candidate.boundary.confidence,
            evidence,
        })
    }

    /// Runs the protocol for a single-block region.
    ///
    /// `candidates` must already be in priority order. The first accepted
    /// candidate wins; Phase C runs only when all are rejected or none exist.
    pub fn resolve(&self, kind: RegionKind, candidates: &[Candidate], lines: &[&str]) -> DefenseOutcome {
        let mut outcome = DefenseOutcome::default();

        for candidate in candidates {
            match self.check(kind, candidate, lines) {
                Ok(accepted) => {
                    info!(region = %kind, range = %accepted.range, source = ?accepted.source, "Boundary accepted");
                    outcome.accepted.push(accepted);
                    return outcome;
                }
                Err(rejected) => {
                    warn!(
                        region = %kind,
                        source = ?rejected.source,
                        phase = ?rejected.phase,
                        "Boundary rejected: {}",
                        rejected.rejection
                    );
                    outcome.rejected.push(rejected);
                }
            }
        }

        outcome.fallback_used = true;
        let detection = self.heuristics.detect(kind, lines, &self.policy);
        debug!(region = %kind, detected = detection.detected, "Heuristic fallback: {}", detection.explanation);
        if let Some(boundary) = detection.boundary {
            let candidate = Candidate::new(boundary, DetectionSource::Heuristic);
            match self.check(kind, &candidate, lines) {
                Ok(accepted) => {
                    info!(region = %kind, range = %accepted.range, "Heuristic boundary accepted");
                    outcome.accepted.push(accepted);
                }
                Err(rejected) => outcome.rejected.push(rejected),
            }
        }

        if outcome.is_noop() {
            info!(region = %kind, "No safe boundary; content left unchanged");
        }
        outcome
    }

    /// Runs the protocol for a multi-block region.
    ///
    /// Every candidate is checked independently. Phase C runs when no
    /// candidate is accepted. Overlapping accepted ranges keep the earlier,
    /// higher-priority one.
    pub fn resolve_all(&self, kind: RegionKind, candidates: &[Candidate], lines: &[&str]) -> DefenseOutcome {
        let mut outcome = DefenseOutcome::default();

        for candidate in candidates {
            match self.check(kind, candidate, lines) {
                Ok(accepted) => push_disjoint(&mut outcome.accepted, accepted),
                Err(rejected) => {
                    warn!(region = %kind, source = ?rejected.source, "Block rejected: {}", rejected.rejection);
                    outcome.rejected.push(rejected);
                }
            }
        }

        if outcome.accepted.is_empty() {
            outcome.fallback_used = true;
            for boundary in self.heuristics.detect_all(kind, lines, &self.policy) {
                let candidate = Candidate::new(boundary, DetectionSource::Heuristic);
                match self.check(kind, &candidate, lines) {
                    Ok(accepted) => push_disjoint(&mut outcome.accepted, accepted),
                    Err(rejected) => outcome.rejected.push(rejected),
                }
            }
        }

        outcome.accepted.sort_by_key(|a| a.range.start);
        info!(region = %kind, blocks = outcome.accepted.len(), fallback = outcome.fallback_used, "Multi-block defense finished");
        outcome
    }
}

fn push_disjoint(accepted: &mut Vec<AcceptedBoundary>, candidate: AcceptedBoundary) {
    if accepted.iter().all(|a| !a.range.overlaps(&candidate.range)) {
        accepted.push(candidate);
    }
}
