use crate::models::{PatientPriorityProfile, PriorityBand};

const BASE_SCORE: u32 = 100;
const ELDERLY_AGE: u32 = 65;
const CHILD_AGE: u32 = 6;

const VERY_HIGH_THRESHOLD: u32 = 1000;
const HIGH_THRESHOLD: u32 = 400;

/// Scores a patient's circumstances and maps the score onto a queue band.
pub struct PriorityCalculator;

impl PriorityCalculator {
    pub fn score(profile: &PatientPriorityProfile) -> u32 {
        let mut score = BASE_SCORE;

        if let Some(age) = profile.age {
            if age >= ELDERLY_AGE {
                score += 200 + age * 2;
            } else if age < CHILD_AGE {
                score += 300 + (CHILD_AGE - age) * 10;
            }
        }
        if let Some(weeks) = profile.pregnancy_weeks {
            score += 400 + weeks * 5;
        }
        if profile.is_disabled {
            score += 500;
        }

        score
    }

    pub fn band(profile: &PatientPriorityProfile) -> PriorityBand {
        match Self::score(profile) {
            s if s >= VERY_HIGH_THRESHOLD => PriorityBand::VeryHigh,
            s if s >= HIGH_THRESHOLD => PriorityBand::High,
            _ => PriorityBand::Normal,
        }
    }

    /// `Normal` when no profile is supplied.
    pub fn band_for(profile: Option<&PatientPriorityProfile>) -> PriorityBand {
        profile.map(Self::band).unwrap_or_default()
    }
}
