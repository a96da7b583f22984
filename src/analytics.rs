//! School-wide counts and the attendance trend
//!
//! There is no attendance engine: the rate is a fixed baseline and the trend
//! is generated noise around it.

use crate::models::{tables, LectureStatus};
use crate::util::round1;
use crate::SchoolHub;
use chrono::{Duration, NaiveDate};
use log::{debug, warn};
use rand::Rng;
use schoolhub_postgrest::PostgrestError;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Attendance rate shown while no real calculation exists
pub const BASELINE_ATTENDANCE_RATE: f64 = 94.2;

const TREND_BASE: f64 = 94.0;
const TREND_SPREAD: f64 = 5.0;
const TREND_FLOOR: f64 = 80.0;
const TREND_CEILING: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Overview {
    pub total_students: u64,
    pub total_teachers: u64,
    pub total_classes: u64,
    pub total_subjects: u64,
    pub total_lectures: u64,
    pub completed_lectures: u64,
    pub scheduled_lectures: u64,
    pub total_announcements: u64,
    pub attendance_rate: f64,
}

#[derive(Debug, Deserialize)]
struct LectureStatusRow {
    status: LectureStatus,
}

async fn count(hub: &SchoolHub, table: &str) -> Result<u64, PostgrestError> {
    let counted = hub
        .from(table)?
        .select("id")
        .execute_with_count::<serde_json::Value>()
        .await?;
    Ok(counted.count.unwrap_or(counted.rows.len() as u64))
}

async fn lecture_statuses(hub: &SchoolHub) -> Result<Vec<LectureStatus>, PostgrestError> {
    let rows = hub
        .from(tables::LECTURES)?
        .select("id, status")
        .execute::<LectureStatusRow>()
        .await?;
    Ok(rows.into_iter().map(|row| row.status).collect())
}

fn or_zero<T: Default>(what: &str, result: Result<T, PostgrestError>) -> T {
    result.unwrap_or_else(|e| {
        warn!("Counting {} failed, using zero: {}", what, e);
        T::default()
    })
}

/// Runs the six counts concurrently; a failed count reads as zero.
pub async fn load_overview(hub: &SchoolHub) -> Overview {
    let (students, teachers, classes, subjects, lectures, announcements) = tokio::join!(
        count(hub, tables::STUDENTS),
        count(hub, tables::TEACHERS),
        count(hub, tables::CLASSES),
        count(hub, tables::SUBJECTS),
        lecture_statuses(hub),
        count(hub, tables::ANNOUNCEMENTS),
    );

    let lectures = or_zero(tables::LECTURES, lectures);
    let with_status =
        |status: LectureStatus| lectures.iter().filter(|s| **s == status).count() as u64;

    let overview = Overview {
        total_students: or_zero(tables::STUDENTS, students),
        total_teachers: or_zero(tables::TEACHERS, teachers),
        total_classes: or_zero(tables::CLASSES, classes),
        total_subjects: or_zero(tables::SUBJECTS, subjects),
        total_lectures: lectures.len() as u64,
        completed_lectures: with_status(LectureStatus::Completed),
        scheduled_lectures: with_status(LectureStatus::Scheduled),
        total_announcements: or_zero(tables::ANNOUNCEMENTS, announcements),
        attendance_rate: BASELINE_ATTENDANCE_RATE,
    };
    debug!("Overview: {:?}", overview);
    overview
}

/// Trend length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrendPeriod {
    #[default]
    Week,
    Month,
    Quarter,
}

impl TrendPeriod {
    pub fn days(self) -> u32 {
        match self {
            TrendPeriod::Week => 7,
            TrendPeriod::Month => 30,
            TrendPeriod::Quarter => 90,
        }
    }
}

impl FromStr for TrendPeriod {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "7" | "7days" | "week" => Ok(TrendPeriod::Week),
            "30" | "30days" | "month" => Ok(TrendPeriod::Month),
            "90" | "90days" | "quarter" => Ok(TrendPeriod::Quarter),
            other => Err(crate::error::Error::invalid_input(format!(
                "unknown trend period '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub rate: f64,
}

/// One point per day ending at `today`, oldest first.
pub fn attendance_trend<R: Rng>(
    period: TrendPeriod,
    today: NaiveDate,
    rng: &mut R,
) -> Vec<TrendPoint> {
    (0..period.days())
        .rev()
        .map(|days_ago| {
            let variation = rng.gen_range(-TREND_SPREAD..=TREND_SPREAD);
            TrendPoint {
                date: today - Duration::days(i64::from(days_ago)),
                rate: round1((TREND_BASE + variation).clamp(TREND_FLOOR, TREND_CEILING)),
            }
        })
        .collect()
}

/// Coarse grading of an attendance rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceBand {
    Good,
    Fair,
    Poor,
}

impl AttendanceBand {
    pub fn from_rate(rate: f64) -> Self {
        if rate >= 95.0 {
            AttendanceBand::Good
        } else if rate >= 90.0 {
            AttendanceBand::Fair
        } else {
            AttendanceBand::Poor
        }
    }
}

impl fmt::Display for AttendanceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceBand::Good => write!(f, "good"),
            AttendanceBand::Fair => write!(f, "fair"),
            AttendanceBand::Poor => write!(f, "poor"),
        }
    }
}
