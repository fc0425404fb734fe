//! Score fusion engine
//!
//! Combines the ML baseline with whatever connector signals survived the
//! fan-out into one final (risk, confidence, threat type, severity). The fold
//! is pure and order-independent: each signal class contributes via max(), and
//! its confidence boost applies at most once no matter how many signals of
//! that class arrived.

use serde::{Deserialize, Serialize};

/// Abuse-confidence percentage above which the record is labelled a known
/// malicious IP and forced to critical severity.
const ABUSE_OVERRIDE_THRESHOLD: f64 = 75.0;

const DETECTION_RATIO_CONFIDENCE_BOOST: f64 = 20.0;
const ABUSE_CONFIDENCE_BOOST: f64 = 15.0;

/// Severity tier derived from the fused risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// Severity as a pure function of risk score
    pub fn from_risk(risk: i32) -> Self {
        match risk {
            r if r >= 80 => Severity::Critical,
            r if r >= 60 => Severity::High,
            r if r >= 40 => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

/// A scoring signal extracted from one connector's response
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Malware-scan detection ratio: positives out of total engines
    DetectionRatio { positives: u32, total: u32 },
    /// Abuse-registry confidence percentage (0-100)
    AbuseConfidence { percentage: f64 },
}

/// Baseline assessment from the ML scorer (or its degraded fallback)
#[derive(Debug, Clone)]
pub struct MlBaseline {
    pub risk_score: f64,
    pub confidence_score: f64,
    pub threat_type: String,
}

impl MlBaseline {
    /// Fixed fallback used when the scoring backend is unreachable
    pub fn degraded() -> Self {
        Self {
            risk_score: 50.0,
            confidence_score: 0.0,
            threat_type: "ml_service_error".to_string(),
        }
    }
}

/// Final fused assessment
#[derive(Debug, Clone, PartialEq)]
pub struct FusedAssessment {
    pub risk_score: i32,
    pub confidence_score: i32,
    pub threat_type: String,
    pub severity: Severity,
}

/// Fuse the ML baseline with the available connector signals.
///
/// Any single high-confidence external signal can escalate risk past the ML
/// baseline (max-fusion, recall-biased); confidence only ever increases with
/// corroborating evidence. Absence of a signal is uninformative.
pub fn fuse(baseline: &MlBaseline, signals: &[Signal]) -> FusedAssessment {
    let mut risk = baseline.risk_score;
    let mut confidence = baseline.confidence_score;
    let mut threat_type = baseline.threat_type.clone();

    // Highest detection ratio across malware-scan signals; boost applied once.
    let max_ratio = signals
        .iter()
        .filter_map(|s| match s {
            Signal::DetectionRatio { positives, total } if *total > 0 => {
                Some(100.0 * f64::from(*positives) / f64::from(*total))
            }
            _ => None,
        })
        .fold(None::<f64>, |acc, v| Some(acc.map_or(v, |a| a.max(v))));

    if let Some(ratio) = max_ratio {
        risk = risk.max(ratio);
        confidence = (confidence + DETECTION_RATIO_CONFIDENCE_BOOST).min(100.0);
    }

    // Highest abuse-confidence percentage; boost applied once.
    let max_abuse = signals
        .iter()
        .filter_map(|s| match s {
            Signal::AbuseConfidence { percentage } => Some(*percentage),
            _ => None,
        })
        .fold(None::<f64>, |acc, v| Some(acc.map_or(v, |a| a.max(v))));

    let mut forced_critical = false;
    if let Some(abuse) = max_abuse {
        risk = risk.max(abuse);
        confidence = (confidence + ABUSE_CONFIDENCE_BOOST).min(100.0);
        if abuse > ABUSE_OVERRIDE_THRESHOLD {
            // Severity is forced even when the fused risk stays below the
            // numeric critical threshold; the risk value itself is not raised.
            threat_type = "known_malicious_ip".to_string();
            forced_critical = true;
        }
    }

    let risk_score = risk.clamp(0.0, 100.0).round() as i32;
    let confidence_score = confidence.clamp(0.0, 100.0).round() as i32;

    let severity = if forced_critical {
        Severity::Critical
    } else {
        Severity::from_risk(risk_score)
    };

    FusedAssessment {
        risk_score,
        confidence_score,
        threat_type,
        severity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(risk: f64, confidence: f64) -> MlBaseline {
        MlBaseline {
            risk_score: risk,
            confidence_score: confidence,
            threat_type: "anomaly".to_string(),
        }
    }

    #[test]
    fn no_signals_passes_baseline_through() {
        let out = fuse(&baseline(50.0, 40.0), &[]);
        assert_eq!(out.risk_score, 50);
        assert_eq!(out.confidence_score, 40);
        assert_eq!(out.threat_type, "anomaly");
        assert_eq!(out.severity, Severity::Medium);
    }

    #[test]
    fn high_abuse_confidence_overrides_type_and_severity() {
        let out = fuse(
            &baseline(50.0, 40.0),
            &[Signal::AbuseConfidence { percentage: 90.0 }],
        );
        assert_eq!(out.risk_score, 90);
        assert_eq!(out.confidence_score, 55);
        assert_eq!(out.threat_type, "known_malicious_ip");
        assert_eq!(out.severity, Severity::Critical);
    }

    #[test]
    fn moderate_abuse_confidence_derives_severity() {
        let out = fuse(
            &baseline(50.0, 40.0),
            &[Signal::AbuseConfidence { percentage: 60.0 }],
        );
        assert_eq!(out.risk_score, 60);
        assert_eq!(out.confidence_score, 55);
        assert_eq!(out.threat_type, "anomaly");
        assert_eq!(out.severity, Severity::High);
    }

    #[test]
    fn override_can_leave_risk_below_critical_threshold() {
        // abuse 76 forces critical while the fused risk stays 76
        let out = fuse(
            &baseline(10.0, 40.0),
            &[Signal::AbuseConfidence { percentage: 76.0 }],
        );
        assert_eq!(out.risk_score, 76);
        assert_eq!(out.severity, Severity::Critical);
        assert_eq!(out.threat_type, "known_malicious_ip");
    }

    #[test]
    fn detection_ratio_escalates_risk() {
        let out = fuse(
            &baseline(20.0, 30.0),
            &[Signal::DetectionRatio {
                positives: 45,
                total: 50,
            }],
        );
        assert_eq!(out.risk_score, 90);
        assert_eq!(out.confidence_score, 50);
        assert_eq!(out.severity, Severity::Critical);
    }

    #[test]
    fn degraded_baseline_alone_yields_medium() {
        let out = fuse(&MlBaseline::degraded(), &[]);
        assert_eq!(out.risk_score, 50);
        assert_eq!(out.confidence_score, 0);
        assert_eq!(out.threat_type, "ml_service_error");
        assert_eq!(out.severity, Severity::Medium);
    }

    #[test]
    fn fusion_is_order_independent() {
        let a = Signal::DetectionRatio {
            positives: 30,
            total: 60,
        };
        let b = Signal::AbuseConfidence { percentage: 82.0 };
        let fwd = fuse(&baseline(45.0, 50.0), &[a.clone(), b.clone()]);
        let rev = fuse(&baseline(45.0, 50.0), &[b, a]);
        assert_eq!(fwd, rev);
        assert_eq!(fwd.risk_score, 82);
        assert_eq!(fwd.confidence_score, 85);
        assert_eq!(fwd.severity, Severity::Critical);
    }

    #[test]
    fn adding_a_signal_never_decreases_risk() {
        let base = fuse(&baseline(70.0, 50.0), &[]);
        let with_ratio = fuse(
            &baseline(70.0, 50.0),
            &[Signal::DetectionRatio {
                positives: 1,
                total: 70,
            }],
        );
        let with_abuse = fuse(
            &baseline(70.0, 50.0),
            &[Signal::AbuseConfidence { percentage: 5.0 }],
        );
        assert!(with_ratio.risk_score >= base.risk_score);
        assert!(with_abuse.risk_score >= base.risk_score);
    }

    #[test]
    fn duplicate_signals_boost_confidence_once() {
        let out = fuse(
            &baseline(10.0, 40.0),
            &[
                Signal::DetectionRatio {
                    positives: 5,
                    total: 50,
                },
                Signal::DetectionRatio {
                    positives: 10,
                    total: 50,
                },
            ],
        );
        assert_eq!(out.risk_score, 20);
        assert_eq!(out.confidence_score, 60);
    }

    #[test]
    fn scores_are_clamped() {
        let out = fuse(
            &baseline(150.0, 95.0),
            &[Signal::AbuseConfidence { percentage: 90.0 }],
        );
        assert_eq!(out.risk_score, 100);
        assert_eq!(out.confidence_score, 100);
    }

    #[test]
    fn zero_engine_ratio_is_ignored() {
        let out = fuse(
            &baseline(30.0, 30.0),
            &[Signal::DetectionRatio {
                positives: 0,
                total: 0,
            }],
        );
        assert_eq!(out.risk_score, 30);
        assert_eq!(out.confidence_score, 30);
    }

    #[test]
    fn severity_thresholds() {
        assert_eq!(Severity::from_risk(0), Severity::Low);
        assert_eq!(Severity::from_risk(39), Severity::Low);
        assert_eq!(Severity::from_risk(40), Severity::Medium);
        assert_eq!(Severity::from_risk(59), Severity::Medium);
        assert_eq!(Severity::from_risk(60), Severity::High);
        assert_eq!(Severity::from_risk(79), Severity::High);
        assert_eq!(Severity::from_risk(80), Severity::Critical);
        assert_eq!(Severity::from_risk(100), Severity::Critical);
    }
}
