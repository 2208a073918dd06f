use chrono::{Duration, NaiveDate};

use crate::model::{UrgencyLevel, UrgencyStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrgencyProfile {
    pub response_days: i64,
    pub urgency_level: UrgencyLevel,
    pub description: &'static str,
}

const DEFAULT_PROFILE: UrgencyProfile = UrgencyProfile {
    response_days: 30,
    urgency_level: UrgencyLevel::Medium,
    description: "Standard IRS correspondence",
};

/// Statutory response window for a normalized letter type.
pub fn profile_for(letter_type: &str) -> UrgencyProfile {
    match letter_type {
        "CP2000" => UrgencyProfile {
            response_days: 30,
            urgency_level: UrgencyLevel::High,
            description: "Proposed changes to tax return - 30 day response required",
        },
        "CP3219" | "CP3219A" => UrgencyProfile {
            response_days: 90,
            urgency_level: UrgencyLevel::Critical,
            description: "Statutory Notice of Deficiency - 90 days to petition Tax Court",
        },
        "CP504" => UrgencyProfile {
            response_days: 10,
            urgency_level: UrgencyLevel::Critical,
            description: "Intent to Levy - Immediate action required",
        },
        // Extracted codes are normalized from LT<n> to LTR<n>.
        "LTR11" | "LT11" => UrgencyProfile {
            response_days: 30,
            urgency_level: UrgencyLevel::High,
            description: "Notice and Demand for Payment",
        },
        "LTR1058" | "LT1058" => UrgencyProfile {
            response_days: 30,
            urgency_level: UrgencyLevel::Critical,
            description: "Final Notice - Intent to Levy and Notice of Right to Hearing",
        },
        _ => DEFAULT_PROFILE,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrgencyAssessment {
    pub level: UrgencyLevel,
    pub status: UrgencyStatus,
    pub due_date: NaiveDate,
    pub days_remaining: i64,
    pub response_days: i64,
    pub description: &'static str,
}

pub fn assess(notice_date: NaiveDate, letter_type: &str, today: NaiveDate) -> UrgencyAssessment {
    let profile = profile_for(letter_type);
    let due_date = notice_date + Duration::days(profile.response_days);
    let days_remaining = (due_date - today).num_days();

    let (status, level) = if days_remaining < 0 {
        (UrgencyStatus::Overdue, UrgencyLevel::Critical)
    } else if days_remaining <= 7 {
        (UrgencyStatus::Immediate, UrgencyLevel::Critical)
    } else if days_remaining <= 14 {
        (UrgencyStatus::Urgent, UrgencyLevel::High)
    } else {
        (UrgencyStatus::Pending, profile.urgency_level)
    };

    UrgencyAssessment {
        level,
        status,
        due_date,
        days_remaining,
        response_days: profile.response_days,
        description: profile.description,
    }
}
