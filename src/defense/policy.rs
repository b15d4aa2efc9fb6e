//! Position policy: where each region kind may legitimately sit.

use crate::config::DefensePolicy;
use crate::model::{LineRange, RegionKind};
use std::fmt;

/// Tolerance for fraction-to-line conversion.
const EPSILON: f64 = 1e-9;

/// Why a boundary was not accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Missing or out-of-bounds line numbers.
    Unresolvable,
    /// Region ends later than the policy allows.
    EndsTooLate { end: usize, max_end: usize },
    /// Region starts earlier than the policy allows.
    StartsTooEarly { start: usize, min_start: usize },
    /// Region covers more lines than the policy allows.
    SpanTooLarge { lines: usize, max_lines: usize },
    /// Service confidence below the configured minimum.
    LowConfidence { confidence: f64, minimum: f64 },
    /// The range lacks region-appropriate markers.
    MissingEvidence(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Unresolvable => write!(f, "boundary has no usable line range"),
            Rejection::EndsTooLate { end, max_end } => {
                write!(f, "ends at line {} but must end by line {}", end, max_end)
            }
            Rejection::StartsTooEarly { start, min_start } => {
                write!(f, "starts at line {} but must start at or after line {}", start, min_start)
            }
            Rejection::SpanTooLarge { lines, max_lines } => {
                write!(f, "spans {} lines but may span at most {}", lines, max_lines)
            }
            Rejection::LowConfidence { confidence, minimum } => {
                write!(f, "confidence {:.2} below minimum {:.2}", confidence, minimum)
            }
            Rejection::MissingEvidence(reason) => write!(f, "content check failed: {}", reason),
        }
    }
}

impl DefensePolicy {
    /// Last line a region of `kind` may end on, if the kind has such a limit.
    pub fn max_end_line(&self, kind: RegionKind, total_lines: usize) -> Option<usize> {
        let fraction = match kind {
            RegionKind::FrontMatter => self.front_matter_max_end,
            RegionKind::TableOfContents => self.toc_max_end,
            RegionKind::AuxiliaryLists => self.aux_lists_max_end,
            _ => return None,
        };
        Some((total_lines as f64 * fraction + EPSILON).floor() as usize)
    }

    /// First line a region of `kind` may start on, if the kind has such a limit.
    pub fn min_start_line(&self, kind: RegionKind, total_lines: usize) -> Option<usize> {
        let fraction = match kind {
            RegionKind::Index => self.index_min_start,
            RegionKind::BackMatter => self.back_matter_min_start,
            _ => return None,
        };
        Some((total_lines as f64 * fraction - EPSILON).ceil().max(0.0) as usize + 1)
    }

    /// Largest span a single region of `kind` may cover, if limited.
    pub fn max_span_lines(&self, kind: RegionKind, total_lines: usize) -> Option<usize> {
        let fraction = match kind {
            RegionKind::AuxiliaryLists => self.aux_lists_max_span,
            RegionKind::Notes => self.notes_max_span,
            _ => return None,
        };
        Some((total_lines as f64 * fraction + EPSILON).floor() as usize)
    }

    /// Position and size validation for a resolved range.
    pub fn check_position(
        &self,
        kind: RegionKind,
        range: LineRange,
        total_lines: usize,
    ) -> Result<(), Rejection> {
        if range.start == 0 || range.end > total_lines {
            return Err(Rejection::Unresolvable);
        }
        if let Some(max_end) = self.max_end_line(kind, total_lines) {
            if range.end > max_end {
                return Err(Rejection::EndsTooLate {
                    end: range.end,
                    max_end,
                });
            }
        }
        if let Some(min_start) = self.min_start_line(kind, total_lines) {
            if range.start < min_start {
                return Err(Rejection::StartsTooEarly {
                    start: range.start,
                    min_start,
                });
            }
        }
        if let Some(max_lines) = self.max_span_lines(kind, total_lines) {
            if range.len() > max_lines {
                return Err(Rejection::SpanTooLarge {
                    lines: range.len(),
                    max_lines,
                });
            }
        }
        Ok(())
    }

    /// Rejects service boundaries below the confidence floor.
    pub fn check_confidence(&self, confidence: f64) -> Result<(), Rejection> {
        if confidence < self.min_confidence {
            Err(Rejection::LowConfidence {
                confidence,
                minimum: self.min_confidence,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_limits() {
        let policy = DefensePolicy::default();
        assert_eq!(policy.max_end_line(RegionKind::FrontMatter, 1000), Some(300));
        assert_eq!(policy.max_end_line(RegionKind::TableOfContents, 10), Some(2));
        assert_eq!(policy.min_start_line(RegionKind::BackMatter, 1000), Some(501));
        assert_eq!(policy.min_start_line(RegionKind::Index, 10), Some(8));
        assert_eq!(policy.max_span_lines(RegionKind::AuxiliaryLists, 1000), Some(150));
        assert_eq!(policy.max_end_line(RegionKind::Index, 1000), None);
    }

    #[test]
    fn test_back_matter_near_start_is_rejected() {
        let policy = DefensePolicy::default();
        let result = policy.check_position(RegionKind::BackMatter, LineRange::new(4, 1000), 1000);
        assert_eq!(
            result,
            Err(Rejection::StartsTooEarly {
                start: 4,
                min_start: 501
            })
        );
    }

    #[test]
    fn test_front_matter_window() {
        let policy = DefensePolicy::default();
        assert!(policy
            .check_position(RegionKind::FrontMatter, LineRange::new(1, 300), 1000)
            .is_ok());
        assert!(policy
            .check_position(RegionKind::FrontMatter, LineRange::new(1, 301), 1000)
            .is_err());
    }

    #[test]
    fn test_aux_span_limit() {
        let policy = DefensePolicy::default();
        let result = policy.check_position(RegionKind::AuxiliaryLists, LineRange::new(10, 200), 1000);
        assert!(matches!(result, Err(Rejection::SpanTooLarge { .. })));
    }

    #[test]
    fn test_confidence_floor() {
        let policy = DefensePolicy::default();
        assert!(policy.check_confidence(0.49).is_err());
        assert!(policy.check_confidence(0.5).is_ok());
    }

    #[test]
    fn test_custom_thresholds() {
        let policy = DefensePolicy {
            back_matter_min_start: 0.9,
            ..DefensePolicy::default()
        };
        assert!(policy
            .check_position(RegionKind::BackMatter, LineRange::new(700, 900), 900)
            .is_err());
    }
}
